//! Session table keyed by transport peer.

use std::collections::HashMap;

use arena_core::{PeerId, PlayerId};

use super::client::ClientSession;

/// Every connected peer's session. Owned by the server state and only
/// touched on the tick thread.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<PeerId, ClientSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session, replacing any stale one on the same peer id.
    pub fn insert(&mut self, session: ClientSession) -> Option<ClientSession> {
        self.sessions.insert(session.peer(), session)
    }

    pub fn remove(&mut self, peer: PeerId) -> Option<ClientSession> {
        self.sessions.remove(&peer)
    }

    pub fn get(&self, peer: PeerId) -> Option<&ClientSession> {
        self.sessions.get(&peer)
    }

    pub fn get_mut(&mut self, peer: PeerId) -> Option<&mut ClientSession> {
        self.sessions.get_mut(&peer)
    }

    /// Peer currently authorized as `player`.
    pub fn peer_of(&self, player: PlayerId) -> Option<PeerId> {
        self.sessions
            .values()
            .find(|session| session.player().map(|(id, _)| id) == Some(player))
            .map(ClientSession::peer)
    }

    pub fn authorized_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.player().is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session, handing them back for shutdown.
    pub fn drain(&mut self) -> Vec<ClientSession> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AuthState;
    use arena_core::{Channel, Connection, TransportError};
    use std::sync::Arc;

    struct Sink;

    impl Channel for Sink {
        fn send(&self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct Peer(PeerId, Sink);

    impl Connection for Peer {
        fn id(&self) -> PeerId {
            self.0
        }
        fn reliable(&self) -> &dyn Channel {
            &self.1
        }
        fn unreliable(&self) -> &dyn Channel {
            &self.1
        }
        fn close(&self) {}
    }

    fn session(peer: u64) -> ClientSession {
        ClientSession::new(Arc::new(Peer(PeerId(peer), Sink)))
    }

    #[test]
    fn test_lookup_by_player() {
        let mut table = SessionTable::new();
        table.insert(session(1));
        table.insert(session(2));

        let player = PlayerId::new();
        table.get_mut(PeerId(2)).unwrap().set_auth(AuthState::Authorized {
            player_id: player,
            name: "bob".to_string(),
        });

        assert_eq!(table.peer_of(player), Some(PeerId(2)));
        assert_eq!(table.authorized_count(), 1);
        assert_eq!(table.len(), 2);

        table.remove(PeerId(2));
        assert_eq!(table.peer_of(player), None);
    }
}
