//! # Game Rooms
//!
//! A [`GameRoom`] runs one authoritative simulation for a bounded set of
//! players. Rooms are owned by the room manager and only ever touched from
//! the tick thread; other threads reach a room through its dispatcher.

mod context;
mod game_room;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{PeerId, PlayerId, RoomId};

pub use context::{EventTarget, RoomContext};
pub use game_room::{GameRoom, RoomState};

/// Per-room timing and lifetime settings shared by every room a manager
/// creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    /// Simulation steps per second.
    pub tick_rate_hz: u32,
    /// Steps a room may run in one update to catch up after a stall.
    pub max_catch_up_ticks: u32,
    /// Stop and reap rooms as soon as their last player leaves.
    pub destroy_when_empty: bool,
}

impl RoomSettings {
    /// Length of one simulation step.
    pub fn step(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            max_catch_up_ticks: 5,
            destroy_when_empty: true,
        }
    }
}

/// Why a player stopped belonging to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureReason {
    /// The client asked to leave.
    Left,
    /// The transport reported a disconnect or timeout.
    Disconnected,
    /// The room stopped or faulted with the player still inside.
    RoomClosed,
}

/// Record of a player leaving a room, collected by the manager so routes and
/// sessions can be updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub peer: PeerId,
    pub reason: DepartureReason,
}

/// Read-only summary of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: RoomId,
    pub map: String,
    pub state: RoomState,
    pub players: usize,
    pub min_players: usize,
    pub max_players: usize,
    pub entities: usize,
    pub tick: u64,
}
