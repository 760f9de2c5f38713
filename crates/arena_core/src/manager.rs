//! # Room Manager
//!
//! Matchmaking and lifetime management for every room in the process.
//!
//! The manager lives on the tick thread and takes `&mut self` for every
//! operation, so room lookup and creation for a map are naturally
//! serialized. Transport threads never see it; they route through the shared
//! [`PeerRoutes`] table the manager maintains.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn};

use crate::concurrency::PeerRoutes;
use crate::error::{PluginError, RoomError};
use crate::player::Player;
use crate::plugin::PluginFactory;
use crate::room::{Departure, GameRoom, RoomSettings, RoomSummary};
use crate::transport::Connection;
use crate::types::{PeerId, PlayerId, RoomId};

/// Owns every room and routes players into them.
pub struct RoomManager {
    rooms: Vec<GameRoom>,
    factory: Arc<dyn PluginFactory>,
    routes: PeerRoutes<GameRoom>,
    settings: RoomSettings,
    players: HashMap<PlayerId, RoomId>,
    peers: HashMap<PeerId, PlayerId>,
    departed: Vec<Departure>,
}

impl RoomManager {
    pub fn new(factory: Arc<dyn PluginFactory>, settings: RoomSettings) -> Self {
        Self::with_routes(factory, settings, PeerRoutes::new())
    }

    /// Builds a manager that maintains an existing route table, typically one
    /// already shared with a transport listener.
    pub fn with_routes(
        factory: Arc<dyn PluginFactory>,
        settings: RoomSettings,
        routes: PeerRoutes<GameRoom>,
    ) -> Self {
        Self {
            rooms: Vec::new(),
            factory,
            routes,
            settings,
            players: HashMap::new(),
            peers: HashMap::new(),
            departed: Vec::new(),
        }
    }

    pub fn routes(&self) -> PeerRoutes<GameRoom> {
        self.routes.clone()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Joins an existing room by id.
    pub fn join(
        &mut self,
        player: Player,
        room_id: RoomId,
        payload: &[u8],
    ) -> Result<RoomId, RoomError> {
        if self.players.contains_key(&player.id()) {
            return Err(RoomError::AlreadyInRoom(player.id()));
        }
        let index = self
            .rooms
            .iter()
            .position(|room| room.id() == room_id && room.is_running())
            .ok_or(RoomError::RoomNotFound(room_id))?;

        self.admit(index, player, payload)
    }

    /// Joins the first running room on `map` with a free slot, opening a new
    /// room when there is none.
    pub fn join_or_create(
        &mut self,
        player: Player,
        map: &str,
        min_players: usize,
        max_players: usize,
        payload: &[u8],
    ) -> Result<RoomId, RoomError> {
        if self.players.contains_key(&player.id()) {
            return Err(RoomError::AlreadyInRoom(player.id()));
        }
        if max_players == 0 || min_players > max_players {
            return Err(RoomError::InvalidBounds {
                min: min_players,
                max: max_players,
            });
        }

        let existing = self
            .rooms
            .iter()
            .position(|room| room.map() == map && room.is_running() && !room.is_full());

        let index = match existing {
            Some(index) => index,
            None => self.open_room(map, min_players, max_players)?,
        };
        self.admit(index, player, payload)
    }

    /// Removes a player from its room.
    pub fn leave(&mut self, player: PlayerId, payload: &[u8]) -> Result<(), RoomError> {
        let room_id = *self
            .players
            .get(&player)
            .ok_or(RoomError::PlayerNotFound(player))?;
        let index = self.index_of(room_id)?;
        let result = self
            .guarded(index, |room| room.leave(player, payload))
            .unwrap_or(Err(RoomError::NotRunning(room_id)));
        self.collect_departures();
        result
    }

    /// Removes whichever player is on `peer`, as if it left with an empty
    /// payload.
    pub fn disconnect(&mut self, peer: PeerId) -> Option<PlayerId> {
        let player = *self.peers.get(&peer)?;
        let room_id = *self.players.get(&player)?;
        let index = self.index_of(room_id).ok()?;
        let removed = match self.guarded(index, |room| room.disconnect(peer)) {
            Some(removed) => removed,
            // The faulted room released everyone, this player included.
            None => Some(player),
        };
        self.collect_departures();
        removed
    }

    /// Moves a player that reconnected onto its new connection.
    pub fn rebind(
        &mut self,
        player: PlayerId,
        connection: Arc<dyn Connection>,
    ) -> Result<RoomId, RoomError> {
        let room_id = *self
            .players
            .get(&player)
            .ok_or(RoomError::PlayerNotFound(player))?;
        let new_peer = connection.id();
        let index = self.index_of(room_id)?;
        let rebound = self.guarded(index, |room| room.rebind(player, connection));
        let old_peer = match rebound {
            Some(result) => result?,
            None => {
                self.collect_departures();
                return Err(RoomError::NotRunning(room_id));
            }
        };
        let dispatcher = self.rooms[index].dispatcher();

        self.peers.remove(&old_peer);
        self.routes.detach(old_peer);
        self.peers.insert(new_peer, player);
        self.routes.attach(new_peer, dispatcher);
        Ok(room_id)
    }

    /// Hands bytes from `peer` straight to its room, for data that was
    /// queued before the peer was routed there. Returns `false` if the peer
    /// is not in a room.
    pub fn receive(&mut self, peer: PeerId, bytes: &[u8]) -> bool {
        let Some(room_id) = self
            .peers
            .get(&peer)
            .and_then(|player| self.players.get(player))
            .copied()
        else {
            return false;
        };
        let Ok(index) = self.index_of(room_id) else {
            return false;
        };
        self.guarded(index, |room| room.receive(peer, bytes));
        self.collect_departures();
        true
    }

    /// Advances every room by `elapsed`, isolating panics, then reaps
    /// stopped rooms (and empty ones when configured). Returns every
    /// departure recorded since the previous call.
    pub fn update(&mut self, elapsed: Duration) -> Vec<Departure> {
        for index in 0..self.rooms.len() {
            self.guarded(index, |room| room.advance(elapsed));

            let room = &self.rooms[index];
            if self.settings.destroy_when_empty && room.is_running() && room.is_empty() {
                self.guarded(index, GameRoom::stop);
            }
        }

        self.collect_departures();
        self.reap();
        std::mem::take(&mut self.departed)
    }

    /// Stops a room. Its players are released at once; the room itself is
    /// reaped on the next update.
    pub fn stop_room(&mut self, room_id: RoomId) -> Result<(), RoomError> {
        let index = self.index_of(room_id)?;
        self.guarded(index, GameRoom::stop);
        self.collect_departures();
        Ok(())
    }

    /// Stops every room and drops them all.
    pub fn stop_all(&mut self) -> Vec<Departure> {
        for index in 0..self.rooms.len() {
            self.guarded(index, GameRoom::stop);
        }
        self.collect_departures();
        self.reap();
        std::mem::take(&mut self.departed)
    }

    pub fn room(&self, room_id: RoomId) -> Option<&GameRoom> {
        self.rooms.iter().find(|room| room.id() == room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut GameRoom> {
        self.rooms.iter_mut().find(|room| room.id() == room_id)
    }

    /// The room `player` is currently in.
    pub fn room_of(&self, player: PlayerId) -> Option<RoomId> {
        self.players.get(&player).copied()
    }

    pub fn player_on(&self, peer: PeerId) -> Option<PlayerId> {
        self.peers.get(&peer).copied()
    }

    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms.iter().map(GameRoom::summary).collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn open_room(
        &mut self,
        map: &str,
        min_players: usize,
        max_players: usize,
    ) -> Result<usize, RoomError> {
        let plugin = self.factory.create(map)?;
        let room_id = RoomId::new();
        let span = info_span!("room", room_id = %room_id, map = %map);
        let mut room = GameRoom::new(
            room_id,
            map,
            min_players,
            max_players,
            plugin,
            &self.settings,
            span,
        )?;
        match catch_unwind(AssertUnwindSafe(|| room.start())) {
            Ok(started) => started?,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                room.fault(&reason);
                return Err(PluginError::ExecutionError(reason).into());
            }
        }

        info!(room_id = %room_id, map, min_players, max_players, "🏠 Opened room");
        self.rooms.push(room);
        Ok(self.rooms.len() - 1)
    }

    fn admit(&mut self, index: usize, player: Player, payload: &[u8]) -> Result<RoomId, RoomError> {
        let player_id = player.id();
        let peer = player.peer();
        let room_id = self.rooms[index].id();
        match self.guarded(index, |room| room.joined(player, payload)) {
            Some(joined) => joined?,
            None => {
                self.collect_departures();
                return Err(RoomError::NotRunning(room_id));
            }
        }

        self.players.insert(player_id, room_id);
        self.peers.insert(peer, player_id);
        self.routes.attach(peer, self.rooms[index].dispatcher());
        // The join hook may already have removed the player again.
        self.collect_departures();
        Ok(room_id)
    }

    fn index_of(&self, room_id: RoomId) -> Result<usize, RoomError> {
        self.rooms
            .iter()
            .position(|room| room.id() == room_id)
            .ok_or(RoomError::RoomNotFound(room_id))
    }

    /// Runs `action` against one room. A panic faults that room, forgets
    /// every player placed in it and yields `None`; every other room is
    /// untouched.
    fn guarded<R>(&mut self, index: usize, action: impl FnOnce(&mut GameRoom) -> R) -> Option<R> {
        let room = &mut self.rooms[index];
        match catch_unwind(AssertUnwindSafe(|| action(&mut *room))) {
            Ok(result) => Some(result),
            Err(panic) => {
                let room_id = room.id();
                room.fault(&panic_message(panic.as_ref()));
                self.forget_room(room_id);
                None
            }
        }
    }

    /// Drops every placement into `room_id`. A hook can panic after the
    /// room already let go of a player, so the room's departures alone may
    /// not cover everyone.
    fn forget_room(&mut self, room_id: RoomId) {
        let stranded: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, room)| **room == room_id)
            .map(|(player, _)| *player)
            .collect();
        for player in stranded {
            self.players.remove(&player);
        }
        let peers: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, player)| !self.players.contains_key(player))
            .map(|(peer, _)| *peer)
            .collect();
        for peer in peers {
            self.peers.remove(&peer);
            self.routes.detach(peer);
        }
    }

    fn collect_departures(&mut self) {
        for room in &mut self.rooms {
            for departure in room.take_departures() {
                if self.players.get(&departure.player_id) == Some(&departure.room_id) {
                    self.players.remove(&departure.player_id);
                    if self.peers.get(&departure.peer) == Some(&departure.player_id) {
                        self.peers.remove(&departure.peer);
                        self.routes.detach(departure.peer);
                    }
                }
                self.departed.push(departure);
            }
        }
    }

    fn reap(&mut self) {
        self.rooms.retain(|room| {
            if room.is_running() {
                return true;
            }
            if room.is_faulted() {
                warn!(room_id = %room.id(), map = room.map(), "🗑️ Reaped faulted room");
            } else {
                info!(room_id = %room.id(), map = room.map(), "🗑️ Reaped room");
            }
            false
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("plugin panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("plugin panicked: {message}")
    } else {
        "plugin panicked".to_string()
    }
}
