//! Room-scoped entity table with id recycling.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::replication::Entity;
use crate::types::{EntityId, EntityType, PlayerId};

/// Authoritative entity table for one room.
///
/// Ids are handed out lowest-free-first: a destroyed entity's id goes back to
/// the pool and is the next one reused. Iteration is in id order so flushes
/// are deterministic.
#[derive(Debug, Default)]
pub struct EntityCache {
    entities: BTreeMap<EntityId, Entity>,
    free_ids: BTreeSet<u32>,
    next_id: u32,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id and registers a new entity.
    pub fn create(&mut self, type_tag: EntityType, owner: Option<PlayerId>) -> EntityId {
        let id = EntityId(self.allocate());
        self.entities.insert(id, Entity::new(id, type_tag, owner));
        debug!(entity = %id, type_tag, owner = ?owner, "entity created");
        id
    }

    /// Evicts an entity and recycles its id. Removing an id that is not
    /// present returns `None` and changes nothing.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.free_ids.insert(id.0);
        debug!(entity = %id, "entity removed");
        Some(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Ids of every entity owned by `player`, in id order.
    pub fn owned_by(&self, player: PlayerId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.owner() == Some(player))
            .map(Entity::id)
            .collect()
    }

    /// Hands every entity owned by `player` to the room.
    pub fn release_owned(&mut self, player: PlayerId) -> Vec<EntityId> {
        let mut released = Vec::new();
        for entity in self.entities.values_mut() {
            if entity.owner() == Some(player) {
                entity.set_owner(None);
                released.push(entity.id());
            }
        }
        released
    }

    /// Drops `player` from every entity's subscriber set.
    pub fn unsubscribe_all(&mut self, player: &PlayerId) {
        for entity in self.entities.values_mut() {
            entity.unsubscribe(player);
        }
    }

    fn allocate(&mut self) -> u32 {
        if let Some(id) = self.free_ids.pop_first() {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
