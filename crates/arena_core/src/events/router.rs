//! Code-keyed event subscription and dispatch.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::EventError;
use crate::events::NetEvent;
use crate::types::{EntityId, EventCode, PlayerId};
use crate::wire::WireBuffer;

/// Where a subscription applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    /// Any event with the code, unless an entity-scoped handler claims it.
    Room,
    /// Events with the code addressed to one entity.
    Entity(EntityId),
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventScope::Room => write!(f, "room scope"),
            EventScope::Entity(id) => write!(f, "{id} scope"),
        }
    }
}

/// Type-erased handler stored by the router.
///
/// Most code registers closures through [`TypedEventHandler`] rather than
/// implementing this directly.
pub trait EventHandler<C>: Send + Sync {
    /// Decodes a fresh event from `buffer` and handles it.
    fn handle(
        &self,
        ctx: &mut C,
        sender: Option<PlayerId>,
        buffer: &mut WireBuffer,
    ) -> Result<(), EventError>;

    /// Human-readable name for logs.
    fn handler_name(&self) -> &str;
}

/// Bridges a closure taking a concrete event type to [`EventHandler`].
pub struct TypedEventHandler<T, F> {
    handler: F,
    name: String,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, F> TypedEventHandler<T, F> {
    pub fn new(name: String, handler: F) -> Self {
        Self {
            handler,
            name,
            _phantom: PhantomData,
        }
    }
}

impl<C, T, F> EventHandler<C> for TypedEventHandler<T, F>
where
    T: NetEvent,
    F: Fn(&mut C, Option<PlayerId>, T) -> Result<(), EventError> + Send + Sync,
{
    fn handle(
        &self,
        ctx: &mut C,
        sender: Option<PlayerId>,
        buffer: &mut WireBuffer,
    ) -> Result<(), EventError> {
        let event = T::read(buffer)?;
        (self.handler)(ctx, sender, event)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Context types that carry their own router.
///
/// Handlers need `&mut C` while the router lives inside `C`; dispatch clones
/// the resolved handler out first so the borrow of the router ends before the
/// handler runs.
pub trait RouterHost: Sized {
    fn router(&self) -> &EventRouter<Self>;
}

/// Subscription table mapping `(scope, code)` to a handler.
pub struct EventRouter<C> {
    handlers: HashMap<(EventScope, EventCode), Arc<dyn EventHandler<C>>>,
}

impl<C> EventRouter<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler`. A code may appear once per scope.
    pub fn subscribe(
        &mut self,
        scope: EventScope,
        code: EventCode,
        handler: Arc<dyn EventHandler<C>>,
    ) -> Result<(), EventError> {
        if self.handlers.contains_key(&(scope, code)) {
            return Err(EventError::DuplicateSubscription {
                code,
                scope: scope.to_string(),
            });
        }
        debug!(code, %scope, handler = handler.handler_name(), "📝 Registered event handler");
        self.handlers.insert((scope, code), handler);
        Ok(())
    }

    pub fn unsubscribe(&mut self, scope: EventScope, code: EventCode) -> bool {
        self.handlers.remove(&(scope, code)).is_some()
    }

    /// Drops every subscription scoped to `entity`.
    pub fn clear_entity(&mut self, entity: EntityId) -> usize {
        let before = self.handlers.len();
        self.handlers
            .retain(|(scope, _), _| *scope != EventScope::Entity(entity));
        before - self.handlers.len()
    }

    /// The most specific handler for `code`: entity scope first, then room.
    pub fn resolve(
        &self,
        code: EventCode,
        entity: Option<EntityId>,
    ) -> Option<Arc<dyn EventHandler<C>>> {
        entity
            .and_then(|id| self.handlers.get(&(EventScope::Entity(id), code)))
            .or_else(|| self.handlers.get(&(EventScope::Room, code)))
            .cloned()
    }

    pub fn is_subscribed(&self, scope: EventScope, code: EventCode) -> bool {
        self.handlers.contains_key(&(scope, code))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: RouterHost> EventRouter<C> {
    /// Resolves and runs the handler for `code`.
    ///
    /// Returns `Ok(false)` when nothing is subscribed; the event is dropped
    /// with a warning.
    pub fn dispatch(
        code: EventCode,
        entity: Option<EntityId>,
        ctx: &mut C,
        player: Option<PlayerId>,
        buffer: &mut WireBuffer,
    ) -> Result<bool, EventError> {
        let Some(handler) = ctx.router().resolve(code, entity) else {
            warn!(code, entity = ?entity, "⚠️ No handler for event code, dropping");
            return Ok(false);
        };
        handler.handle(ctx, player, buffer)?;
        Ok(true)
    }
}

impl<C> Default for EventRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}
