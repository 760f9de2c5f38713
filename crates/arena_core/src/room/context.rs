//! Plugin-facing view of a room.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::concurrency::{HandleAllocator, Repeat, TaskFn, TaskHandle};
use crate::error::EventError;
use crate::events::{EventRouter, EventScope, NetEvent, RouterHost, TypedEventHandler};
use crate::player::Player;
use crate::replication::{Entity, EntityCache};
use crate::types::{EntityId, EntityType, EventCode, PeerId, PlayerId, RoomId};
use crate::wire::protocol::{encode_entity_created, encode_event, encode_state_update};
use crate::wire::{ServerMessage, WireCodec};

/// Who an outbound event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// Every player in the room.
    Room,
    Player(PlayerId),
    /// Players subscribed to the entity.
    Subscribers(EntityId),
}

struct Outbound {
    target: EventTarget,
    reliable: bool,
    bytes: Vec<u8>,
}

pub(crate) enum Lifecycle {
    Created(EntityId),
    Destroyed(Entity),
}

pub(crate) struct PendingTask {
    pub handle: TaskHandle,
    pub interval: Duration,
    pub repeat: Repeat,
    pub task: TaskFn<RoomContext>,
}

/// Everything a plugin can see and change inside its room.
///
/// Side effects that cross the room boundary (network output, scheduling,
/// entity lifecycle hooks) are queued here and applied by the room once the
/// current hook returns.
pub struct RoomContext {
    room_id: RoomId,
    map: String,
    min_players: usize,
    max_players: usize,
    players: Vec<Player>,
    entities: EntityCache,
    router: EventRouter<RoomContext>,
    outbox: Vec<Outbound>,
    destroyed: Vec<EntityId>,
    new_tasks: Vec<PendingTask>,
    cancelled: Vec<TaskHandle>,
    lifecycle: VecDeque<Lifecycle>,
    tick: u64,
    handles: HandleAllocator,
}

impl RoomContext {
    pub(crate) fn new(
        room_id: RoomId,
        map: String,
        min_players: usize,
        max_players: usize,
        handles: HandleAllocator,
    ) -> Self {
        Self {
            room_id,
            map,
            min_players,
            max_players,
            players: Vec::new(),
            entities: EntityCache::new(),
            router: EventRouter::new(),
            outbox: Vec::new(),
            destroyed: Vec::new(),
            new_tasks: Vec::new(),
            cancelled: Vec::new(),
            lifecycle: VecDeque::new(),
            tick: 0,
            handles,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn map(&self) -> &str {
        &self.map
    }

    /// Completed simulation steps.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// True while fewer than `min_players` are present.
    pub fn is_waiting(&self) -> bool {
        self.players.len() < self.min_players
    }

    // Players

    /// Players in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id() == id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains_player(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    // Entities

    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Mutable access for state changes and subscriber management.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Creates an entity. Clients learn about it at the end of the tick;
    /// `on_entity_created` runs after the current hook returns.
    pub fn create_entity(&mut self, type_tag: EntityType, owner: Option<PlayerId>) -> EntityId {
        let id = self.entities.create(type_tag, owner);
        if let Some(player) = owner.and_then(|owner| self.player_mut(owner)) {
            player.owned_mut().insert(id);
        }
        self.lifecycle.push_back(Lifecycle::Created(id));
        id
    }

    /// Destroys an entity and drops its entity-scoped subscriptions.
    /// Returns `false` if it was already gone.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(id) else {
            return false;
        };
        self.router.clear_entity(id);
        if let Some(player) = entity.owner().and_then(|owner| self.player_mut(owner)) {
            player.owned_mut().remove(&id);
        }
        if entity.is_announced() {
            self.destroyed.push(id);
        }
        self.lifecycle.push_back(Lifecycle::Destroyed(entity));
        true
    }

    // Events

    /// Subscribes a room-scoped handler for `code`.
    pub fn subscribe<T, F>(&mut self, code: EventCode, handler: F) -> Result<(), EventError>
    where
        T: NetEvent,
        F: Fn(&mut RoomContext, Option<PlayerId>, T) -> Result<(), EventError>
            + Send
            + Sync
            + 'static,
    {
        let name = format!("room:{}:{}", code, T::type_name());
        self.router.subscribe(
            EventScope::Room,
            code,
            Arc::new(TypedEventHandler::new(name, handler)),
        )
    }

    /// Subscribes a handler for `code` addressed to `entity`. The
    /// subscription ends when the entity is destroyed.
    pub fn subscribe_entity<T, F>(
        &mut self,
        entity: EntityId,
        code: EventCode,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: NetEvent,
        F: Fn(&mut RoomContext, Option<PlayerId>, T) -> Result<(), EventError>
            + Send
            + Sync
            + 'static,
    {
        if !self.entities.contains(entity) {
            return Err(EventError::Handler(format!("{entity} does not exist")));
        }
        let name = format!("{}:{}:{}", entity, code, T::type_name());
        self.router.subscribe(
            EventScope::Entity(entity),
            code,
            Arc::new(TypedEventHandler::new(name, handler)),
        )
    }

    pub fn unsubscribe(&mut self, scope: EventScope, code: EventCode) -> bool {
        self.router.unsubscribe(scope, code)
    }

    /// Queues an event on the reliable channel.
    pub fn send_event<T: NetEvent>(&mut self, target: EventTarget, code: EventCode, event: &T) {
        self.queue_event(target, code, event, true);
    }

    /// Queues an event on the unreliable channel.
    pub fn send_event_unreliable<T: NetEvent>(
        &mut self,
        target: EventTarget,
        code: EventCode,
        event: &T,
    ) {
        self.queue_event(target, code, event, false);
    }

    // Scheduling

    /// Runs `task` every `interval` of simulated time, starting with the
    /// next scheduler pass.
    pub fn schedule<F>(&mut self, interval: Duration, repeat: Repeat, task: F) -> TaskHandle
    where
        F: FnMut(&mut RoomContext) + Send + 'static,
    {
        let handle = self.handles.allocate();
        self.new_tasks.push(PendingTask {
            handle,
            interval,
            repeat,
            task: Box::new(task),
        });
        handle
    }

    /// Cancels a scheduled task no later than the next scheduler pass.
    pub fn cancel(&mut self, handle: TaskHandle) {
        self.cancelled.push(handle);
    }

    // Room-internal plumbing

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id() == id)
    }

    pub(crate) fn player_by_peer(&self, peer: PeerId) -> Option<&Player> {
        self.players.iter().find(|player| player.peer() == peer)
    }

    pub(crate) fn add_player(&mut self, player: Player) {
        self.players.push(player);
    }

    pub(crate) fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|player| player.id() == id)?;
        let player = self.players.remove(index);
        self.entities.unsubscribe_all(&id);
        Some(player)
    }

    pub(crate) fn take_players(&mut self) -> Vec<Player> {
        std::mem::take(&mut self.players)
    }

    pub(crate) fn release_owned(&mut self, id: PlayerId) -> Vec<EntityId> {
        self.entities.release_owned(id)
    }

    pub(crate) fn next_lifecycle(&mut self) -> Option<Lifecycle> {
        self.lifecycle.pop_front()
    }

    pub(crate) fn take_new_tasks(&mut self) -> Vec<PendingTask> {
        std::mem::take(&mut self.new_tasks)
    }

    pub(crate) fn take_cancelled(&mut self) -> Vec<TaskHandle> {
        std::mem::take(&mut self.cancelled)
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Sends destructions, announces new entities, sends state diffs, then
    /// queued events, and flushes every player's channels. Destructions go
    /// first so a recycled id is never destroyed after its re-announcement.
    pub(crate) fn flush(&mut self) {
        let Self {
            players,
            entities,
            outbox,
            destroyed,
            ..
        } = self;

        for id in destroyed.drain(..) {
            let bytes = ServerMessage::EntityDestroyed { entity_id: id }.encode();
            broadcast(players, &bytes, true);
        }

        for entity in entities.iter_mut() {
            if !entity.is_announced() {
                let bytes = encode_entity_created(entity);
                entity.mark_announced();
                broadcast(players, &bytes, true);
            } else if let Some(bytes) = encode_state_update(entity) {
                broadcast(players, &bytes, true);
            }
        }

        for outbound in outbox.drain(..) {
            match outbound.target {
                EventTarget::Room => broadcast(players, &outbound.bytes, outbound.reliable),
                EventTarget::Player(id) => {
                    if let Some(player) = players.iter().find(|player| player.id() == id) {
                        deliver(player, &outbound.bytes, outbound.reliable);
                    }
                }
                EventTarget::Subscribers(entity) => {
                    let Some(entity) = entities.get(entity) else {
                        continue;
                    };
                    for player in players.iter().filter(|p| entity.is_subscribed(&p.id())) {
                        deliver(player, &outbound.bytes, outbound.reliable);
                    }
                }
            }
        }

        for player in players.iter() {
            let connection = player.connection();
            if let Err(e) = connection
                .reliable()
                .flush()
                .and_then(|_| connection.unreliable().flush())
            {
                debug!(player = %player.id(), error = %e, "Channel flush failed");
            }
        }
    }

    fn queue_event<T: NetEvent>(
        &mut self,
        target: EventTarget,
        code: EventCode,
        event: &T,
        reliable: bool,
    ) {
        self.outbox.push(Outbound {
            target,
            reliable,
            bytes: encode_event(code, &event.to_bytes()),
        });
    }
}

impl RouterHost for RoomContext {
    fn router(&self) -> &EventRouter<Self> {
        &self.router
    }
}

fn broadcast(players: &[Player], bytes: &[u8], reliable: bool) {
    for player in players {
        deliver(player, bytes, reliable);
    }
}

fn deliver(player: &Player, bytes: &[u8], reliable: bool) {
    if let Err(e) = player.send(bytes, reliable) {
        debug!(player = %player.id(), error = %e, "Send failed");
    }
}
