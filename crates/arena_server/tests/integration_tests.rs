//! End-to-end tests for the room server over the loopback transport.
//!
//! Each test drives the tick loop by hand with `step`, yielding to the
//! runtime in between so authorization futures get to complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    AuthDecision, Authorizer, ClientMessage, PeerId, PlayerId, PluginError, PluginFactory,
    RejectReason, RoomContext, RoomPlugin, ServerMessage, WireCodec,
};
use arena_server::demo::{self, CHAT, MOVE};
use arena_server::{LoopbackClient, LoopbackTransport, RoomServer, ServerConfig};
use async_trait::async_trait;
use tokio::runtime::Handle;

/// Accepts known names with a stable player id; rejects everything else.
struct NamedAuthorizer {
    known: HashMap<String, PlayerId>,
}

impl NamedAuthorizer {
    fn new(names: &[&str]) -> Self {
        Self {
            known: names
                .iter()
                .map(|name| (name.to_string(), PlayerId::new()))
                .collect(),
        }
    }
}

#[async_trait]
impl Authorizer for NamedAuthorizer {
    async fn authorize(&self, _peer: PeerId, credentials: Vec<u8>) -> AuthDecision {
        let name = String::from_utf8_lossy(&credentials).to_string();
        match self.known.get(&name) {
            Some(&player_id) => AuthDecision::Accept { player_id, name },
            None => AuthDecision::Reject { reason: 42 },
        }
    }
}

struct Harness {
    server: RoomServer,
    transport: LoopbackTransport,
}

impl Harness {
    fn new(config: ServerConfig) -> Self {
        Self::with_factory(config, demo::relay_factory())
    }

    fn with_factory(config: ServerConfig, factory: Arc<dyn PluginFactory>) -> Self {
        let transport = LoopbackTransport::new();
        let mut server = RoomServer::new(
            config,
            Box::new(transport.clone()),
            factory,
            Arc::new(NamedAuthorizer::new(&["alice", "bob", "carol"])),
            Handle::current(),
        );
        server.start().unwrap();
        Self { server, transport }
    }

    fn tick(&mut self) {
        let step = self.server.config().tick_interval();
        self.server.step(step).unwrap();
    }

    /// Ticks until no authorization is in flight.
    async fn settle(&mut self) {
        for _ in 0..200 {
            self.tick();
            if self.server.state().pending_authorizations() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("authorizations never completed");
    }

    async fn connect(&mut self) -> LoopbackClient {
        let client = self.transport.connect().unwrap();
        self.settle().await;
        client
    }

    async fn login(&mut self, name: &str) -> LoopbackClient {
        let client = self.connect().await;
        client
            .send(&ClientMessage::Authorize {
                credentials: name.as_bytes().to_vec(),
            })
            .unwrap();
        self.settle().await;
        client
    }

    async fn enter(&mut self, name: &str, map: &str, max_players: u32) -> LoopbackClient {
        let client = self.login(name).await;
        client
            .send(&ClientMessage::JoinOrCreate {
                map: map.to_string(),
                min_players: 1,
                max_players,
                payload: Vec::new(),
            })
            .unwrap();
        self.settle().await;
        client
    }
}

/// Game whose join hook panics.
struct CursedGame;

impl RoomPlugin for CursedGame {
    fn on_player_joined(
        &mut self,
        _ctx: &mut RoomContext,
        _player: PlayerId,
        _payload: &[u8],
    ) -> Result<(), PluginError> {
        panic!("cursed map");
    }
}

/// Relay game everywhere except the "cursed" map.
fn cursed_factory() -> Arc<dyn PluginFactory> {
    Arc::new(|map: &str| -> Result<Box<dyn RoomPlugin>, PluginError> {
        match map {
            "cursed" => Ok(Box::new(CursedGame)),
            _ => Ok(Box::new(demo::RelayGame)),
        }
    })
}

fn chat_lines(messages: Vec<ServerMessage>) -> Vec<String> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            ServerMessage::Event { code, payload } if code == CHAT => {
                String::from_bytes(&payload).ok()
            }
            _ => None,
        })
        .collect()
}

fn joined_room(messages: &[ServerMessage]) -> Option<(arena_core::RoomId, String)> {
    messages.iter().find_map(|message| match message {
        ServerMessage::RoomJoined { room_id, map } => Some((*room_id, map.clone())),
        _ => None,
    })
}

fn rejection(messages: &[ServerMessage]) -> Option<RejectReason> {
    messages.iter().find_map(|message| match message {
        ServerMessage::JoinRejected { reason } => Some(*reason),
        _ => None,
    })
}

#[tokio::test]
async fn test_authorize_then_join_or_create() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;

    let messages = alice.received();
    assert!(matches!(
        &messages[0],
        ServerMessage::Authorized { name, .. } if name == "alice"
    ));
    let (room_id, map) = joined_room(&messages).expect("RoomJoined");
    assert_eq!(map, "dust");
    assert!(messages
        .iter()
        .any(|message| matches!(message, ServerMessage::Snapshot { .. })));

    let rooms = harness.server.manager().rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, room_id);
    assert_eq!(rooms[0].players, 1);
    assert_eq!(harness.server.state().sessions().authorized_count(), 1);
}

#[tokio::test]
async fn test_rejected_authorization_closes_connection() {
    let mut harness = Harness::new(ServerConfig::default());
    let mallory = harness.login("mallory").await;

    assert_eq!(
        mallory.received(),
        vec![ServerMessage::AuthRejected { reason: 42 }]
    );
    assert!(mallory.is_closed());
    assert!(harness.server.state().sessions().is_empty());
}

#[tokio::test]
async fn test_join_requires_authorization() {
    let mut harness = Harness::new(ServerConfig::default());
    let client = harness.connect().await;
    client
        .send(&ClientMessage::JoinOrCreate {
            map: "dust".to_string(),
            min_players: 1,
            max_players: 2,
            payload: Vec::new(),
        })
        .unwrap();
    harness.settle().await;

    assert_eq!(
        rejection(&client.received()),
        Some(RejectReason::NotAuthorized)
    );
    assert_eq!(harness.server.manager().room_count(), 0);
}

#[tokio::test]
async fn test_full_and_missing_rooms_are_rejected() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "duel", 1).await;
    let (room_id, _) = joined_room(&alice.received()).expect("RoomJoined");

    let bob = harness.login("bob").await;
    bob.received();
    bob.send(&ClientMessage::Join {
        room_id,
        payload: Vec::new(),
    })
    .unwrap();
    harness.settle().await;
    assert_eq!(rejection(&bob.received()), Some(RejectReason::RoomFull));

    bob.send(&ClientMessage::Join {
        room_id: arena_core::RoomId::new(),
        payload: Vec::new(),
    })
    .unwrap();
    harness.settle().await;
    assert_eq!(rejection(&bob.received()), Some(RejectReason::RoomNotFound));
    assert_eq!(harness.server.manager().rooms()[0].players, 1);
}

#[tokio::test]
async fn test_zero_max_players_uses_server_defaults() {
    let config = ServerConfig {
        default_max_players: 2,
        ..ServerConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.enter("alice", "dust", 0).await;

    let rooms = harness.server.manager().rooms();
    assert_eq!(rooms[0].max_players, 2);
}

#[tokio::test]
async fn test_chat_is_relayed_to_the_room() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;
    let bob = harness.enter("bob", "dust", 4).await;
    assert_eq!(harness.server.manager().room_count(), 1);
    alice.received();
    bob.received();

    alice
        .send(&ClientMessage::Event {
            code: CHAT,
            entity: None,
            payload: "hello".to_string().to_bytes(),
        })
        .unwrap();
    harness.tick();

    assert_eq!(chat_lines(bob.received()), vec!["alice: hello".to_string()]);
}

#[tokio::test]
async fn test_last_message_before_disconnect_is_delivered() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;
    let bob = harness.enter("bob", "dust", 4).await;
    bob.received();

    alice
        .send(&ClientMessage::Event {
            code: CHAT,
            entity: None,
            payload: "bye".to_string().to_bytes(),
        })
        .unwrap();
    alice.disconnect();
    harness.tick();

    assert_eq!(chat_lines(bob.received()), vec!["alice: bye".to_string()]);
    let rooms = harness.server.manager().rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].players, 1);
    assert_eq!(harness.server.state().sessions().len(), 1);
}

#[tokio::test]
async fn test_panicking_join_hook_spares_the_server() {
    let mut harness = Harness::with_factory(ServerConfig::default(), cursed_factory());
    let bob = harness.enter("bob", "dust", 4).await;
    let alice = harness.enter("alice", "cursed", 4).await;

    assert_eq!(
        rejection(&alice.received()),
        Some(RejectReason::NotRunning)
    );
    assert!(!alice.is_closed());
    let alice_player = harness.server.manager().player_on(alice.peer());
    assert_eq!(alice_player, None);

    harness.tick();
    let rooms = harness.server.manager().rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].map, "dust");

    // The lobby still serves the player that hit the broken room.
    alice
        .send(&ClientMessage::JoinOrCreate {
            map: "dust".to_string(),
            min_players: 1,
            max_players: 4,
            payload: Vec::new(),
        })
        .unwrap();
    harness.settle().await;
    assert!(joined_room(&alice.received()).is_some());
    bob.received();

    alice
        .send(&ClientMessage::Event {
            code: CHAT,
            entity: None,
            payload: "still here".to_string().to_bytes(),
        })
        .unwrap();
    harness.tick();
    assert_eq!(
        chat_lines(bob.received()),
        vec!["alice: still here".to_string()]
    );
}

#[tokio::test]
async fn test_move_replicates_avatar_state() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;
    let bob = harness.enter("bob", "dust", 4).await;
    alice.received();
    bob.received();

    alice
        .send(&ClientMessage::Event {
            code: MOVE,
            entity: None,
            payload: demo::Move { x: 3.5, y: -2.25 }.to_bytes(),
        })
        .unwrap();
    harness.tick();

    let updates: Vec<_> = bob
        .received()
        .into_iter()
        .filter_map(|message| match message {
            ServerMessage::StateUpdate { properties, .. } => Some(properties),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    let x = updates[0]
        .iter()
        .find(|(name, _)| name == "x")
        .map(|(_, value)| f32::from_bytes(value).unwrap());
    assert_eq!(x, Some(3.5));
}

#[tokio::test]
async fn test_disconnect_releases_player_and_reaps_room() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;
    assert_eq!(harness.server.manager().room_count(), 1);

    alice.disconnect();
    harness.settle().await;
    harness.tick();

    assert_eq!(harness.server.manager().room_count(), 0);
    assert!(harness.server.state().sessions().is_empty());
}

#[tokio::test]
async fn test_timeout_behaves_like_disconnect() {
    let config = ServerConfig {
        destroy_when_empty: false,
        ..ServerConfig::default()
    };
    let mut harness = Harness::new(config);
    let alice = harness.enter("alice", "dust", 4).await;
    let bob = harness.enter("bob", "dust", 4).await;
    bob.received();

    alice.time_out();
    harness.settle().await;

    let rooms = harness.server.manager().rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].players, 1);
    assert!(bob
        .received()
        .iter()
        .any(|message| matches!(message, ServerMessage::EntityDestroyed { .. })));
}

#[tokio::test]
async fn test_second_login_takes_over_the_seat() {
    let mut harness = Harness::new(ServerConfig::default());
    let first = harness.enter("alice", "dust", 4).await;
    let (room_id, _) = joined_room(&first.received()).expect("RoomJoined");

    let second = harness.login("alice").await;
    let messages = second.received();
    assert!(matches!(messages[0], ServerMessage::Authorized { .. }));
    assert_eq!(joined_room(&messages).map(|(id, _)| id), Some(room_id));

    assert!(first.is_closed());
    assert_eq!(harness.server.manager().rooms()[0].players, 1);
    assert_eq!(harness.server.state().sessions().len(), 1);
    assert!(harness.server.manager().player_on(second.peer()).is_some());
    assert!(harness.server.manager().player_on(first.peer()).is_none());
}

#[tokio::test]
async fn test_connection_limit_closes_extra_peers() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let mut harness = Harness::new(config);
    let first = harness.connect().await;
    let second = harness.connect().await;

    assert!(!first.is_closed());
    assert!(second.is_closed());
    assert_eq!(harness.server.state().sessions().len(), 1);
}

#[tokio::test]
async fn test_malformed_lobby_message_is_dropped() {
    let mut harness = Harness::new(ServerConfig::default());
    let client = harness.connect().await;
    client.send_bytes(&[0xff, 0xff, 0xff]).unwrap();
    harness.settle().await;

    assert!(!client.is_closed());
    assert!(client.received().is_empty());
    assert_eq!(harness.server.state().sessions().len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_sessions_and_rooms() {
    let mut harness = Harness::new(ServerConfig::default());
    let alice = harness.enter("alice", "dust", 4).await;
    alice.received();

    harness.server.shutdown().unwrap();

    assert!(alice.is_closed());
    assert!(alice
        .received()
        .iter()
        .any(|message| matches!(message, ServerMessage::RoomLeft)));
    assert_eq!(harness.server.manager().room_count(), 0);
    assert!(!harness.server.is_running());
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() {
    let mut harness = Harness::new(ServerConfig::default());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tx.send(()).unwrap();

    harness
        .server
        .run(async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    assert!(!harness.server.is_running());
}
