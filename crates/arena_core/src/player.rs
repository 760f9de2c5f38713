use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::TransportError;
use crate::transport::Connection;
use crate::types::{EntityId, PeerId, PlayerId};

/// An authorized participant.
///
/// The `PlayerId` is stable for the session; the peer id and connection are
/// replaced on reconnect.
#[derive(Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    loaded: bool,
    connection: Arc<dyn Connection>,
    owned: BTreeSet<EntityId>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        Self {
            id,
            name: name.into(),
            loaded: false,
            connection,
            owned: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn peer(&self) -> PeerId {
        self.connection.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set once the client reports it has loaded the map.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn owned_entities(&self) -> &BTreeSet<EntityId> {
        &self.owned
    }

    pub fn send(&self, bytes: &[u8], reliable: bool) -> Result<(), TransportError> {
        if reliable {
            self.connection.reliable().send(bytes)
        } else {
            self.connection.unreliable().send(bytes)
        }
    }

    pub(crate) fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub(crate) fn rebind(&mut self, connection: Arc<dyn Connection>) {
        self.connection = connection;
    }

    pub(crate) fn owned_mut(&mut self) -> &mut BTreeSet<EntityId> {
        &mut self.owned
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("peer", &self.peer())
            .field("name", &self.name)
            .field("loaded", &self.loaded)
            .field("owned", &self.owned)
            .finish()
    }
}
