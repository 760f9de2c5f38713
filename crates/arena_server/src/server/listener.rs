//! Bridge from transport callbacks to the tick thread.

use std::sync::Arc;

use arena_core::{Connection, Dispatcher, GameRoom, PeerId, PeerRoutes, TransportListener};

use super::core::ServerState;

/// Receives transport callbacks on I/O threads and queues them for the tick
/// thread. Peers attached to a room go straight to that room's dispatcher;
/// everything else goes through the lobby.
pub struct ServerListener {
    routes: PeerRoutes<GameRoom>,
    lobby: Dispatcher<ServerState>,
}

impl ServerListener {
    pub fn new(routes: PeerRoutes<GameRoom>, lobby: Dispatcher<ServerState>) -> Self {
        Self { routes, lobby }
    }

    /// A routed peer is released by its room, behind whatever it sent
    /// before the connection dropped.
    fn departed(&self, peer: PeerId, timed_out: bool) {
        let routed = match self.routes.route(peer) {
            Some(room) => {
                room.dispatch(move |room: &mut GameRoom| {
                    room.disconnect(peer);
                });
                true
            }
            None => false,
        };
        self.lobby.dispatch(move |state: &mut ServerState| {
            state.peer_disconnected(peer, timed_out, routed)
        });
    }
}

impl TransportListener for ServerListener {
    fn on_connected(&self, connection: Arc<dyn Connection>) {
        self.lobby
            .dispatch(move |state: &mut ServerState| state.peer_connected(connection));
    }

    fn on_disconnected(&self, peer: PeerId) {
        self.departed(peer, false);
    }

    fn on_timeout(&self, peer: PeerId) {
        self.departed(peer, true);
    }

    fn on_data(&self, connection: &Arc<dyn Connection>, bytes: &[u8]) {
        let peer = connection.id();
        let bytes = bytes.to_vec();
        match self.routes.route(peer) {
            Some(room) => room.dispatch(move |room: &mut GameRoom| room.receive(peer, &bytes)),
            None => self
                .lobby
                .dispatch(move |state: &mut ServerState| state.lobby_receive(peer, bytes)),
        }
    }
}
