//! End-to-end room behavior through the public API: matchmaking, capacity,
//! event delivery, replication output and timing.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use arena_core::*;

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<Vec<u8>>>>);

struct RecordingChannel(Log);

impl Channel for RecordingChannel {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.0 .0.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

struct RecordingConnection {
    peer: PeerId,
    log: Log,
    reliable: RecordingChannel,
    unreliable: RecordingChannel,
}

impl RecordingConnection {
    fn new(peer: u64) -> Arc<Self> {
        let log = Log::default();
        Arc::new(Self {
            peer: PeerId(peer),
            reliable: RecordingChannel(log.clone()),
            unreliable: RecordingChannel(log.clone()),
            log,
        })
    }

    fn received(&self) -> Vec<ServerMessage> {
        self.log
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| ServerMessage::decode(bytes).unwrap())
            .collect()
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> PeerId {
        self.peer
    }
    fn reliable(&self) -> &dyn Channel {
        &self.reliable
    }
    fn unreliable(&self) -> &dyn Channel {
        &self.unreliable
    }
    fn close(&self) {}
}

const GREETING: EventCode = 123;
const DAMAGE: EventCode = 7;
const AVATAR: EntityType = 1;

/// Records greetings, spawns an avatar per player and applies damage events
/// to it.
struct ArenaGame {
    greetings: Arc<Mutex<Vec<String>>>,
}

impl RoomPlugin for ArenaGame {
    fn name(&self) -> &str {
        "arena_game"
    }

    fn on_start(&mut self, ctx: &mut RoomContext) -> Result<(), PluginError> {
        let greetings = self.greetings.clone();
        ctx.subscribe(GREETING, move |_ctx: &mut RoomContext, _sender, text: String| {
            greetings.lock().unwrap().push(text);
            Ok(())
        })?;
        ctx.subscribe(DAMAGE, |ctx: &mut RoomContext, sender, amount: u32| {
            let Some(sender) = sender else {
                return Ok(());
            };
            let Some(&avatar) = ctx
                .player(sender)
                .and_then(|player| player.owned_entities().iter().next())
            else {
                return Ok(());
            };
            if let Some(entity) = ctx.entity_mut(avatar) {
                let hp = entity.state().get::<u32>("hp").and_then(Result::ok).unwrap_or(0);
                entity.state_mut().set("hp", &hp.saturating_sub(amount));
            }
            Ok(())
        })?;
        Ok(())
    }

    fn on_player_joined(
        &mut self,
        ctx: &mut RoomContext,
        player: PlayerId,
        _payload: &[u8],
    ) -> Result<(), PluginError> {
        let avatar = ctx.create_entity(AVATAR, Some(player));
        if let Some(entity) = ctx.entity_mut(avatar) {
            entity.state_mut().set("hp", &100u32);
        }
        Ok(())
    }
}

fn manager(greetings: Arc<Mutex<Vec<String>>>) -> RoomManager {
    let factory: Arc<dyn PluginFactory> = Arc::new(
        move |_map: &str| -> Result<Box<dyn RoomPlugin>, PluginError> {
            Ok(Box::new(ArenaGame {
                greetings: greetings.clone(),
            }))
        },
    );
    RoomManager::new(factory, RoomSettings::default())
}

fn player(connection: &Arc<RecordingConnection>, name: &str) -> Player {
    Player::new(PlayerId::new(), name, connection.clone())
}

fn send(manager: &RoomManager, peer: PeerId, message: ClientMessage) {
    let bytes = message.encode();
    manager
        .routes()
        .route(peer)
        .expect("peer is routed to a room")
        .dispatch(move |room: &mut GameRoom| room.receive(peer, &bytes));
}

fn one_tick() -> Duration {
    RoomSettings::default().step()
}

#[test]
fn scenario_a_first_player_creates_room() {
    let mut manager = manager(Arc::default());
    let conn = RecordingConnection::new(1);
    let p1 = player(&conn, "p1");
    let p1_id = p1.id();

    let room_id = manager.join_or_create(p1, "arena", 1, 4, &[]).unwrap();

    assert_eq!(manager.room_count(), 1);
    let room = manager.room(room_id).unwrap();
    assert!(room.is_running());
    assert!(room.contains_player(p1_id));
    assert_eq!(room.player_count(), 1);
    assert_eq!(manager.room_of(p1_id), Some(room_id));
    assert!(matches!(
        conn.received().first(),
        Some(ServerMessage::RoomJoined { room_id: id, map }) if *id == room_id && map == "arena"
    ));
}

#[test]
fn scenario_b_fifth_player_is_rejected() {
    let mut manager = manager(Arc::default());
    let room_id = manager
        .join_or_create(player(&RecordingConnection::new(1), "p1"), "arena", 1, 4, &[])
        .unwrap();

    for peer in 2..=4 {
        let conn = RecordingConnection::new(peer);
        manager.join(player(&conn, "p"), room_id, &[]).unwrap();
    }

    let fifth = RecordingConnection::new(5);
    let result = manager.join(player(&fifth, "p5"), room_id, &[]);

    assert!(matches!(result, Err(RoomError::RoomFull { max: 4, .. })));
    assert_eq!(manager.room(room_id).unwrap().player_count(), 4);
    assert!(!manager.routes().contains(PeerId(5)));
}

#[test]
fn scenario_c_handler_receives_event_once() {
    let greetings = Arc::new(Mutex::new(Vec::new()));
    let mut manager = manager(greetings.clone());
    let conn = RecordingConnection::new(1);
    manager
        .join_or_create(player(&conn, "p1"), "arena", 1, 4, &[])
        .unwrap();

    send(
        &manager,
        PeerId(1),
        ClientMessage::Event {
            code: GREETING,
            entity: None,
            payload: "hi".to_string().to_bytes(),
        },
    );
    manager.update(one_tick());
    manager.update(one_tick());

    assert_eq!(*greetings.lock().unwrap(), vec!["hi".to_string()]);
}

#[test]
fn scenario_d_float_compression_precision() {
    let compressor = FloatCompressor::new(0.0, 100.0, 1);
    assert_eq!(compressor.bits(), 10);
    let restored = compressor.decompress(compressor.compress(50.03));
    assert!((restored - 50.0).abs() <= 0.05);
}

#[test]
fn scenario_e_scheduler_fires_three_times() {
    let mut scheduler: Scheduler<u32> = Scheduler::new();
    let handle = scheduler.add(Duration::from_millis(100), Repeat::Times(3), |count| {
        *count += 1;
    });

    let mut fired = 0u32;
    for _ in 0..8 {
        scheduler.tick(Duration::from_millis(40), &mut fired);
    }
    assert_eq!(fired, 3);
    assert_eq!(scheduler.is_done(handle), Some(true));

    for _ in 0..8 {
        scheduler.tick(Duration::from_millis(40), &mut fired);
    }
    assert_eq!(fired, 3);
}

#[test]
fn test_replication_reaches_clients() {
    let mut manager = manager(Arc::default());
    let first = RecordingConnection::new(1);
    let room_id = manager
        .join_or_create(player(&first, "p1"), "arena", 1, 4, &[])
        .unwrap();
    manager.update(one_tick());

    let created: Vec<_> = first
        .received()
        .into_iter()
        .filter_map(|message| match message {
            ServerMessage::EntityCreated { entity } => Some(entity),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].type_tag, AVATAR);
    assert_eq!(created[0].properties[0].0, "hp");
    assert_eq!(created[0].properties[0].1, 100u32.to_bytes());

    // A late joiner learns about the existing avatar from its snapshot.
    let second = RecordingConnection::new(2);
    manager.join(player(&second, "p2"), room_id, &[]).unwrap();
    match &second.received()[1] {
        ServerMessage::Snapshot { entities } => {
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].id, created[0].id);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    send(
        &manager,
        PeerId(1),
        ClientMessage::Event {
            code: DAMAGE,
            entity: None,
            payload: 30u32.to_bytes(),
        },
    );
    manager.update(one_tick());

    let update = first.received().into_iter().find_map(|message| match message {
        ServerMessage::StateUpdate {
            entity_id,
            properties,
        } => Some((entity_id, properties)),
        _ => None,
    });
    let (entity_id, properties) = update.expect("state update after damage");
    assert_eq!(entity_id, created[0].id);
    assert_eq!(properties, vec![("hp".to_string(), 70u32.to_bytes())]);
}

#[test]
fn test_disconnect_destroys_owned_entities() {
    let mut manager = manager(Arc::default());
    let first = RecordingConnection::new(1);
    let second = RecordingConnection::new(2);
    let room_id = manager
        .join_or_create(player(&first, "p1"), "arena", 1, 4, &[])
        .unwrap();
    manager.join(player(&second, "p2"), room_id, &[]).unwrap();
    manager.update(one_tick());
    assert_eq!(manager.room(room_id).unwrap().context().entities().len(), 2);

    manager.disconnect(PeerId(1));
    manager.update(one_tick());

    assert_eq!(manager.room(room_id).unwrap().context().entities().len(), 1);
    assert!(second
        .received()
        .iter()
        .any(|message| matches!(message, ServerMessage::EntityDestroyed { .. })));
    assert!(!manager.routes().contains(PeerId(1)));
}

#[test]
fn test_capacity_never_exceeded() {
    let mut manager = manager(Arc::default());
    let room_id = manager
        .join_or_create(player(&RecordingConnection::new(0), "p0"), "arena", 1, 3, &[])
        .unwrap();
    for peer in 1..20 {
        let _ = manager.join(player(&RecordingConnection::new(peer), "p"), room_id, &[]);
        assert!(manager.room(room_id).unwrap().player_count() <= 3);
    }
}

#[test]
fn test_entity_ids_unique_and_remove_idempotent() {
    let mut cache = EntityCache::new();
    let ids: Vec<_> = (0..10).map(|_| cache.create(AVATAR, None)).collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    assert!(cache.remove(ids[3]).is_some());
    assert!(cache.remove(ids[3]).is_none());
    assert_eq!(cache.len(), 9);

    let reused = cache.create(AVATAR, None);
    assert_eq!(reused, ids[3]);
    let live: Vec<_> = cache.iter().map(Entity::id).collect();
    let mut deduped = live.clone();
    deduped.dedup();
    assert_eq!(live, deduped);
}

#[test]
fn test_dispatcher_fifo_per_producer() {
    const PRODUCERS: usize = 6;
    const PER_PRODUCER: usize = 1_000;

    let dispatcher: Dispatcher<Vec<(usize, usize)>> = Dispatcher::new();
    let workers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    dispatcher.dispatch(move |log: &mut Vec<(usize, usize)>| {
                        log.push((producer, seq))
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut log = Vec::new();
    assert_eq!(dispatcher.drain(&mut log), PRODUCERS * PER_PRODUCER);

    let mut next = [0usize; PRODUCERS];
    for (producer, seq) in log {
        assert_eq!(seq, next[producer]);
        next[producer] += 1;
    }
}

#[test]
fn test_compressors_round_trip() {
    let ints = IntCompressor::new(-500, 500);
    for value in -500..=500 {
        assert_eq!(ints.decompress(ints.compress(value)), value);
    }

    let floats = FloatCompressor::new(-10.0, 10.0, 2);
    let half_step = floats.max_error() + 1e-6;
    for step in 0..=2000 {
        let value = -10.0 + step as f32 * 0.01;
        assert!((floats.decompress(floats.compress(value)) - value).abs() <= half_step);
    }
}
