use std::collections::HashSet;

use crate::replication::State;
use crate::types::{EntityId, EntityType, PlayerId};

/// A server-authoritative replicated object.
///
/// `owner` is `None` for room-owned entities. `subscribers` is the target set
/// for entity-scoped events sent with `EventTarget::Subscribers`.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    type_tag: EntityType,
    owner: Option<PlayerId>,
    state: State,
    subscribers: HashSet<PlayerId>,
    announced: bool,
}

impl Entity {
    pub(crate) fn new(id: EntityId, type_tag: EntityType, owner: Option<PlayerId>) -> Self {
        Self {
            id,
            type_tag,
            owner,
            state: State::new(),
            subscribers: HashSet::new(),
            announced: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn type_tag(&self) -> EntityType {
        self.type_tag
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<PlayerId>) {
        self.owner = owner;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn subscribe(&mut self, player: PlayerId) -> bool {
        self.subscribers.insert(player)
    }

    pub fn unsubscribe(&mut self, player: &PlayerId) -> bool {
        self.subscribers.remove(player)
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &PlayerId> {
        self.subscribers.iter()
    }

    pub fn is_subscribed(&self, player: &PlayerId) -> bool {
        self.subscribers.contains(player)
    }

    /// Whether clients have been told about this entity yet.
    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub(crate) fn mark_announced(&mut self) {
        self.announced = true;
    }
}
