//! Lobby message handling.
//!
//! Everything here runs on the tick thread, either drained from the lobby
//! dispatcher or resumed by the executor once an authorization completes.

use std::sync::Arc;

use arena_core::{
    AuthDecision, ClientMessage, Connection, Departure, DepartureReason, PeerId, Player,
    PlayerId, RejectReason, RoomError, ServerMessage,
};
use tracing::{debug, info, warn};

use super::core::ServerState;
use crate::connection::{AuthState, ClientSession};

impl ServerState {
    /// A transport accepted a new peer.
    pub(crate) fn peer_connected(&mut self, connection: Arc<dyn Connection>) {
        let peer = connection.id();
        if self.sessions.len() >= self.config.max_connections {
            warn!(%peer, "⚠️ Session limit reached, closing connection");
            connection.close();
            return;
        }
        if self.sessions.insert(ClientSession::new(connection)).is_some() {
            warn!(%peer, "Replaced a stale session with the same peer id");
        }
        debug!(%peer, sessions = self.sessions.len(), "Session opened");
    }

    /// A transport lost a peer. When the peer was `routed`, its room was
    /// handed the departure and releases the player after draining what the
    /// peer sent last. Otherwise the peer may have been attached after the
    /// disconnect was queued, so it is released here.
    pub(crate) fn peer_disconnected(&mut self, peer: PeerId, timed_out: bool, routed: bool) {
        let session = self.sessions.remove(peer);
        if !routed {
            if let Some(player) = self.manager.disconnect(peer) {
                debug!(%peer, %player, "Released player from room");
            }
        }
        if let Some(session) = session {
            let uptime = session.connected_at().elapsed();
            if timed_out {
                info!(%peer, ?uptime, "⏱️ Session timed out");
            } else {
                info!(%peer, ?uptime, "👋 Session closed");
            }
        }
    }

    /// Bytes from a peer that had no room route when they arrived.
    pub(crate) fn lobby_receive(&mut self, peer: PeerId, bytes: Vec<u8>) {
        // Attached after the bytes were queued; hand them to the room.
        if self.manager.receive(peer, &bytes) {
            return;
        }

        let message = match ClientMessage::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, error = %e, "⚠️ Dropping malformed lobby message");
                return;
            }
        };

        match message {
            ClientMessage::Authorize { credentials } => self.begin_authorization(peer, credentials),
            ClientMessage::Join { .. } | ClientMessage::JoinOrCreate { .. } => {
                self.join_room(peer, message)
            }
            ClientMessage::Leave { .. } | ClientMessage::Loaded | ClientMessage::Event { .. } => {
                warn!(%peer, "⚠️ Ignoring room message from peer not in a room");
            }
        }
    }

    fn begin_authorization(&mut self, peer: PeerId, credentials: Vec<u8>) {
        let Some(session) = self.sessions.get_mut(peer) else {
            debug!(%peer, "Authorize from unknown peer");
            return;
        };
        if *session.auth() != AuthState::Anonymous {
            warn!(%peer, "⚠️ Ignoring repeated authorize");
            return;
        }
        session.set_auth(AuthState::Pending);

        let authorizer = self.authorizer.clone();
        self.executor.submit(
            async move { authorizer.authorize(peer, credentials).await },
            move |state: &mut ServerState, decision| state.authorization_finished(peer, decision),
        );
    }

    fn authorization_finished(&mut self, peer: PeerId, decision: AuthDecision) {
        if self.sessions.get(peer).is_none() {
            debug!(%peer, "Peer left before authorization finished");
            return;
        }

        let (player_id, name) = match decision.into_result() {
            Ok(identity) => identity,
            Err(rejected) => {
                if let Some(session) = self.sessions.remove(peer) {
                    session.send(
                        &ServerMessage::AuthRejected {
                            reason: rejected.reason,
                        }
                        .encode(),
                    );
                    session.connection().close();
                }
                info!(%peer, reason = rejected.reason, "🚫 Authorization rejected");
                return;
            }
        };

        let previous = self
            .sessions
            .peer_of(player_id)
            .filter(|&other| other != peer);

        let Some(session) = self.sessions.get_mut(peer) else {
            return;
        };
        session.set_auth(AuthState::Authorized {
            player_id,
            name: name.clone(),
        });
        session.send(
            &ServerMessage::Authorized {
                player_id,
                name: name.clone(),
            }
            .encode(),
        );
        let connection = session.connection().clone();
        info!(%peer, player = %player_id, %name, "🔐 Player authorized");

        if self.manager.room_of(player_id).is_some() {
            match self.manager.rebind(player_id, connection) {
                Ok(room_id) => info!(player = %player_id, room = %room_id, "🔄 Rebound player to room"),
                Err(e) => warn!(player = %player_id, error = %e, "⚠️ Rebind failed"),
            }
        }

        if let Some(old_peer) = previous {
            if let Some(old) = self.sessions.remove(old_peer) {
                info!(player = %player_id, %old_peer, "Closing superseded session");
                old.connection().close();
            }
        }
    }

    fn join_room(&mut self, peer: PeerId, message: ClientMessage) {
        let Some(session) = self.sessions.get(peer) else {
            debug!(%peer, "Join from unknown peer");
            return;
        };
        let Some((player_id, name)) = session.player() else {
            session.send(&reject(RejectReason::NotAuthorized));
            return;
        };
        let player = Player::new(player_id, name, session.connection().clone());

        let result = match message {
            ClientMessage::Join { room_id, payload } => {
                self.manager.join(player, room_id, &payload)
            }
            ClientMessage::JoinOrCreate {
                map,
                min_players,
                max_players,
                payload,
            } => {
                let (min, max) = if max_players == 0 {
                    (
                        self.config.default_min_players,
                        self.config.default_max_players,
                    )
                } else {
                    (min_players as usize, max_players as usize)
                };
                self.manager.join_or_create(player, &map, min, max, &payload)
            }
            _ => return,
        };

        if let Err(e) = result {
            debug!(%peer, player = %player_id, error = %e, "Join refused");
            if let Some(session) = self.sessions.get(peer) {
                session.send(&reject(reject_reason(&e)));
            }
        }
    }

    /// A player left a room for good or bad. Sessions stay open so the
    /// client can join another room.
    pub(crate) fn room_departed(&mut self, departure: Departure) {
        let Departure {
            room_id,
            player_id,
            peer,
            reason,
        } = departure;
        match reason {
            DepartureReason::Left => debug!(%peer, player = %player_id, room = %room_id, "Player left room"),
            DepartureReason::Disconnected => {
                debug!(%peer, player = %player_id, room = %room_id, "Disconnected player released")
            }
            DepartureReason::RoomClosed => {
                info!(%peer, player = %player_id, room = %room_id, "Room closed under player")
            }
        }
    }

    /// Peer currently authorized as `player`.
    pub fn peer_of(&self, player: PlayerId) -> Option<PeerId> {
        self.sessions.peer_of(player)
    }
}

fn reject(reason: RejectReason) -> Vec<u8> {
    ServerMessage::JoinRejected { reason }.encode()
}

fn reject_reason(error: &RoomError) -> RejectReason {
    match error {
        RoomError::RoomFull { .. } => RejectReason::RoomFull,
        RoomError::RoomNotFound(_) => RejectReason::RoomNotFound,
        RoomError::AlreadyInRoom(_) => RejectReason::AlreadyInRoom,
        _ => RejectReason::NotRunning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{PluginError, RoomId};

    #[test]
    fn test_reject_reasons() {
        assert_eq!(
            reject_reason(&RoomError::RoomFull {
                room_id: RoomId::new(),
                max: 2
            }),
            RejectReason::RoomFull
        );
        assert_eq!(
            reject_reason(&RoomError::RoomNotFound(RoomId::new())),
            RejectReason::RoomNotFound
        );
        assert_eq!(
            reject_reason(&RoomError::AlreadyInRoom(PlayerId::new())),
            RejectReason::AlreadyInRoom
        );
        assert_eq!(
            reject_reason(&RoomError::InvalidBounds { min: 3, max: 1 }),
            RejectReason::NotRunning
        );
        assert_eq!(
            reject_reason(&RoomError::Plugin(PluginError::InitializationFailed(
                "no map".into()
            ))),
            RejectReason::NotRunning
        );
    }
}
