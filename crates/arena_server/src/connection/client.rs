//! Client session representation.
//!
//! A session exists for every connected peer, from `on_connected` until the
//! transport reports it gone, whether or not it ever authorized.

use std::sync::Arc;
use std::time::Instant;

use arena_core::{Connection, PeerId, PlayerId};

/// Where a session stands in the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Connected, no `Authorize` received yet.
    Anonymous,
    /// An authorization future is in flight.
    Pending,
    Authorized { player_id: PlayerId, name: String },
}

/// Represents an individual client connection to the server.
pub struct ClientSession {
    connection: Arc<dyn Connection>,
    auth: AuthState,
    connected_at: Instant,
}

impl ClientSession {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            auth: AuthState::Anonymous,
            connected_at: Instant::now(),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.connection.id()
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn set_auth(&mut self, auth: AuthState) {
        self.auth = auth;
    }

    /// The authorized identity, if any.
    pub fn player(&self) -> Option<(PlayerId, &str)> {
        match &self.auth {
            AuthState::Authorized { player_id, name } => Some((*player_id, name.as_str())),
            _ => None,
        }
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Sends on the reliable channel and flushes it.
    pub fn send(&self, bytes: &[u8]) {
        let reliable = self.connection.reliable();
        if let Err(e) = reliable.send(bytes).and_then(|_| reliable.flush()) {
            tracing::debug!(peer = %self.peer(), error = %e, "Session send failed");
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("peer", &self.peer())
            .field("auth", &self.auth)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}
