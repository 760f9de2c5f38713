use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn, Span};

use crate::concurrency::{Dispatcher, Scheduler};
use crate::error::{PluginError, RoomError};
use crate::events::EventRouter;
use crate::plugin::{DeparturePolicy, RoomPlugin};
use crate::player::Player;
use crate::room::context::{Lifecycle, RoomContext};
use crate::room::{Departure, DepartureReason, RoomSettings, RoomSummary};
use crate::transport::Connection;
use crate::types::{PeerId, PlayerId, RoomId};
use crate::wire::protocol::encode_snapshot;
use crate::wire::{ClientMessage, RejectReason, ServerMessage, WireBuffer};

/// Lifecycle of a room. `Waiting` is not a state of its own: a running room
/// is waiting while it holds fewer than its minimum players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Created,
    Running,
    Stopped,
}

/// One authoritative simulation instance.
pub struct GameRoom {
    id: RoomId,
    state: RoomState,
    faulted: bool,
    ctx: RoomContext,
    plugin: Box<dyn RoomPlugin>,
    scheduler: Scheduler<RoomContext>,
    dispatcher: Dispatcher<GameRoom>,
    accumulator: Duration,
    step: Duration,
    max_catch_up_ticks: u32,
    departures: Vec<Departure>,
    span: Span,
}

impl GameRoom {
    /// Builds a room in the `Created` state. `span` is entered around every
    /// operation so all room logging carries its fields.
    pub fn new(
        id: RoomId,
        map: impl Into<String>,
        min_players: usize,
        max_players: usize,
        plugin: Box<dyn RoomPlugin>,
        settings: &RoomSettings,
        span: Span,
    ) -> Result<Self, RoomError> {
        if max_players == 0 || min_players > max_players {
            return Err(RoomError::InvalidBounds {
                min: min_players,
                max: max_players,
            });
        }

        let scheduler = Scheduler::new();
        let ctx = RoomContext::new(
            id,
            map.into(),
            min_players,
            max_players,
            scheduler.allocator(),
        );

        Ok(Self {
            id,
            state: RoomState::Created,
            faulted: false,
            ctx,
            plugin,
            scheduler,
            dispatcher: Dispatcher::new(),
            accumulator: Duration::ZERO,
            step: settings.step(),
            max_catch_up_ticks: settings.max_catch_up_ticks.max(1),
            departures: Vec::new(),
            span,
        })
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn map(&self) -> &str {
        self.ctx.map()
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RoomState::Running
    }

    /// Running with fewer than the minimum number of players.
    pub fn is_waiting(&self) -> bool {
        self.is_running() && self.ctx.is_waiting()
    }

    /// Stopped because a hook failed to start or the tick panicked.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn player_count(&self) -> usize {
        self.ctx.player_count()
    }

    pub fn min_players(&self) -> usize {
        self.ctx.min_players()
    }

    pub fn max_players(&self) -> usize {
        self.ctx.max_players()
    }

    pub fn is_full(&self) -> bool {
        self.ctx.player_count() >= self.ctx.max_players()
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.player_count() == 0
    }

    pub fn contains_player(&self, player: PlayerId) -> bool {
        self.ctx.contains_player(player)
    }

    pub fn context(&self) -> &RoomContext {
        &self.ctx
    }

    /// Handle for queuing work onto this room's next tick.
    pub fn dispatcher(&self) -> Dispatcher<GameRoom> {
        self.dispatcher.clone()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            map: self.ctx.map().to_string(),
            state: self.state,
            players: self.ctx.player_count(),
            min_players: self.ctx.min_players(),
            max_players: self.ctx.max_players(),
            entities: self.ctx.entities().len(),
            tick: self.ctx.tick_count(),
        }
    }

    /// Departures recorded since the last call.
    pub fn take_departures(&mut self) -> Vec<Departure> {
        std::mem::take(&mut self.departures)
    }

    /// `Created -> Running`. Runs the start hook once; a failing hook faults
    /// the room.
    pub fn start(&mut self) -> Result<(), RoomError> {
        if self.state != RoomState::Created {
            return Ok(());
        }
        let _guard = self.span.clone().entered();

        self.state = RoomState::Running;
        if let Err(e) = self.plugin.on_start(&mut self.ctx) {
            self.fault(&format!("start hook failed: {e}"));
            return Err(RoomError::Plugin(e));
        }
        self.settle();
        info!(plugin = self.plugin.name(), "🚀 Room started");
        Ok(())
    }

    /// Adds `player` to the room.
    ///
    /// The player is sent `RoomJoined` and a snapshot of every entity clients
    /// already know about, then the join hook runs.
    pub fn joined(&mut self, player: Player, payload: &[u8]) -> Result<(), RoomError> {
        if !self.is_running() {
            return Err(RoomError::NotRunning(self.id));
        }
        if self.ctx.contains_player(player.id()) {
            return Err(RoomError::AlreadyInRoom(player.id()));
        }
        if self.is_full() {
            return Err(RoomError::RoomFull {
                room_id: self.id,
                max: self.ctx.max_players(),
            });
        }
        let _guard = self.span.clone().entered();

        self.send_welcome(&player);
        let player_id = player.id();
        info!(player = %player_id, name = player.name(), peer = %player.peer(), "👋 Player joined");
        self.ctx.add_player(player);

        let result = self.plugin.on_player_joined(&mut self.ctx, player_id, payload);
        self.report("on_player_joined", result);
        self.settle();
        Ok(())
    }

    /// Removes a player, applies the departure policy to its entities and
    /// runs the leave hook.
    pub fn leave(&mut self, player: PlayerId, payload: &[u8]) -> Result<(), RoomError> {
        self.depart(player, payload, DepartureReason::Left)
    }

    /// Transport-driven leave for whichever player is on `peer`.
    pub fn disconnect(&mut self, peer: PeerId) -> Option<PlayerId> {
        let player = self.ctx.player_by_peer(peer)?.id();
        match self.depart(player, &[], DepartureReason::Disconnected) {
            Ok(()) => Some(player),
            Err(_) => None,
        }
    }

    /// Moves a player onto a new connection and resends the room state.
    /// Returns the peer id the player was on.
    pub fn rebind(
        &mut self,
        player: PlayerId,
        connection: Arc<dyn Connection>,
    ) -> Result<PeerId, RoomError> {
        let _guard = self.span.clone().entered();
        let entry = self
            .ctx
            .player_mut(player)
            .ok_or(RoomError::PlayerNotFound(player))?;
        let old_peer = entry.peer();
        entry.rebind(connection);
        let rebound = entry.clone();

        self.send_welcome(&rebound);
        info!(player = %player, from = %old_peer, to = %rebound.peer(), "🔄 Player reconnected");
        Ok(old_peer)
    }

    /// Handles bytes that arrived from `peer`.
    pub fn receive(&mut self, peer: PeerId, bytes: &[u8]) {
        let _guard = self.span.clone().entered();

        let Some(player) = self.ctx.player_by_peer(peer).map(Player::id) else {
            debug!(%peer, "Dropping data from peer not in room");
            return;
        };

        let message = match ClientMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, error = %e, "⚠️ Dropping malformed message");
                return;
            }
        };

        match message {
            ClientMessage::Event {
                code,
                entity,
                payload,
            } => {
                if let Some(id) = entity {
                    if !self.ctx.entities().contains(id) {
                        debug!(code, entity = %id, "Dropping event for missing entity");
                        return;
                    }
                }
                let mut buffer = WireBuffer::from_bytes(payload);
                if let Err(e) =
                    EventRouter::dispatch(code, entity, &mut self.ctx, Some(player), &mut buffer)
                {
                    warn!(code, player = %player, error = %e, "⚠️ Event handler failed");
                }
                self.settle();
            }
            ClientMessage::Loaded => {
                if let Some(entry) = self.ctx.player_mut(player) {
                    entry.set_loaded(true);
                }
                let result = self.plugin.on_player_loaded(&mut self.ctx, player);
                self.report("on_player_loaded", result);
                self.settle();
            }
            ClientMessage::Leave { payload } => {
                if let Err(e) = self.leave(player, &payload) {
                    warn!(player = %player, error = %e, "⚠️ Leave failed");
                }
            }
            ClientMessage::Join { .. } | ClientMessage::JoinOrCreate { .. } => {
                let reply = ServerMessage::JoinRejected {
                    reason: RejectReason::AlreadyInRoom,
                };
                if let Some(entry) = self.ctx.player(player) {
                    let _ = entry.send(&reply.encode(), true);
                }
            }
            ClientMessage::Authorize { .. } => {
                warn!(player = %player, "⚠️ Ignoring authorize from player already in a room");
            }
        }
    }

    /// One simulation step: queued actions, scheduled tasks, the tick hook,
    /// then network flush.
    pub fn tick(&mut self, dt: Duration) {
        if !self.is_running() {
            return;
        }
        let _guard = self.span.clone().entered();

        let dispatcher = self.dispatcher.clone();
        dispatcher.drain(self);
        if !self.is_running() {
            return;
        }
        self.settle();

        self.scheduler.tick(dt, &mut self.ctx);
        self.scheduler.remove_finished();
        self.settle();

        let result = self.plugin.on_tick(&mut self.ctx, dt);
        self.report("on_tick", result);
        self.settle();

        self.ctx.advance_tick();
        self.ctx.flush();
    }

    /// Feeds real elapsed time into the fixed-step accumulator and runs as
    /// many steps as it covers, up to the catch-up limit. Returns the number
    /// of steps run.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        if !self.is_running() {
            return 0;
        }

        self.accumulator += elapsed;
        let mut ticks = 0;
        while self.accumulator >= self.step && ticks < self.max_catch_up_ticks {
            self.accumulator -= self.step;
            self.tick(self.step);
            ticks += 1;
        }

        if self.accumulator >= self.step {
            let dropped = self.accumulator;
            let step_nanos = self.step.as_nanos().max(1);
            self.accumulator =
                Duration::from_nanos((self.accumulator.as_nanos() % step_nanos) as u64);
            let _guard = self.span.clone().entered();
            warn!(
                dropped_ms = (dropped - self.accumulator).as_millis() as u64,
                "⚠️ Room fell behind, dropping simulation time"
            );
        }
        ticks
    }

    /// `Running -> Stopped`. Runs the stop hook once, then sends every
    /// remaining player `RoomLeft`. Calling it again does nothing.
    pub fn stop(&mut self) {
        match self.state {
            RoomState::Stopped => return,
            RoomState::Created => {
                self.state = RoomState::Stopped;
                return;
            }
            RoomState::Running => {}
        }
        let _guard = self.span.clone().entered();

        let result = self.plugin.on_stop(&mut self.ctx);
        self.report("on_stop", result);
        self.settle();
        self.ctx.flush();

        self.state = RoomState::Stopped;
        self.evict_all();
        info!(ticks = self.ctx.tick_count(), "🛑 Room stopped");
    }

    /// Stops the room without running any more plugin code.
    pub fn fault(&mut self, reason: &str) {
        let _guard = self.span.clone().entered();
        error!(reason, "💥 Room faulted");
        self.faulted = true;
        self.state = RoomState::Stopped;
        self.evict_all();
    }

    fn depart(
        &mut self,
        player: PlayerId,
        payload: &[u8],
        reason: DepartureReason,
    ) -> Result<(), RoomError> {
        let _guard = self.span.clone().entered();
        let departed = self
            .ctx
            .remove_player(player)
            .ok_or(RoomError::PlayerNotFound(player))?;

        match self.plugin.departure_policy() {
            DeparturePolicy::DestroyOwned => {
                for entity in departed.owned_entities().iter().copied() {
                    self.ctx.destroy_entity(entity);
                }
            }
            DeparturePolicy::TransferToRoom => {
                self.ctx.release_owned(player);
            }
        }

        let result = self.plugin.on_player_left(&mut self.ctx, &departed, payload);
        self.report("on_player_left", result);
        self.settle();

        let _ = departed.send(&ServerMessage::RoomLeft.encode(), true);
        let _ = departed.connection().reliable().flush();
        info!(player = %player, reason = ?reason, "🚪 Player left");

        self.departures.push(Departure {
            room_id: self.id,
            player_id: player,
            peer: departed.peer(),
            reason,
        });
        Ok(())
    }

    fn evict_all(&mut self) {
        let left = ServerMessage::RoomLeft.encode();
        for player in self.ctx.take_players() {
            let _ = player.send(&left, true);
            let _ = player.connection().reliable().flush();
            self.departures.push(Departure {
                room_id: self.id,
                player_id: player.id(),
                peer: player.peer(),
                reason: DepartureReason::RoomClosed,
            });
        }
    }

    fn send_welcome(&self, player: &Player) {
        let joined = ServerMessage::RoomJoined {
            room_id: self.id,
            map: self.ctx.map().to_string(),
        };
        let announced: Vec<_> = self
            .ctx
            .entities()
            .iter()
            .filter(|entity| entity.is_announced())
            .collect();
        let snapshot = encode_snapshot(announced.into_iter());

        if let Err(e) = player
            .send(&joined.encode(), true)
            .and_then(|_| player.send(&snapshot, true))
        {
            debug!(player = %player.id(), error = %e, "Welcome send failed");
        }
    }

    /// Delivers queued entity lifecycle hooks and hands queued scheduling
    /// changes to the scheduler.
    fn settle(&mut self) {
        while let Some(event) = self.ctx.next_lifecycle() {
            let result = match &event {
                Lifecycle::Created(id) => self.plugin.on_entity_created(&mut self.ctx, *id),
                Lifecycle::Destroyed(entity) => {
                    self.plugin.on_entity_destroyed(&mut self.ctx, entity)
                }
            };
            self.report("entity lifecycle hook", result);
        }

        for task in self.ctx.take_new_tasks() {
            self.scheduler
                .add_with_handle(task.handle, task.interval, task.repeat, task.task);
        }
        for handle in self.ctx.take_cancelled() {
            self.scheduler.remove(handle);
        }
    }

    fn report(&self, hook: &str, result: Result<(), PluginError>) {
        if let Err(e) = result {
            error!(hook, plugin = self.plugin.name(), error = %e, "❌ Plugin hook failed");
        }
    }
}

impl std::fmt::Debug for GameRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRoom")
            .field("id", &self.id)
            .field("map", &self.ctx.map())
            .field("state", &self.state)
            .field("players", &self.ctx.player_count())
            .finish()
    }
}
