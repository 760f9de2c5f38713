//! # Core Type Definitions
//!
//! Identifier types shared by every layer of the room server.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - Stable session identity assigned at authorization
//! - [`RoomId`] - Globally unique room identity
//! - [`PeerId`] - Transport-level connection identity
//! - [`EntityId`] - Room-scoped replicated entity identity
//!
//! Wrapper types keep the different ids from being confused with one another
//! (a `PeerId` may change across reconnects while the `PlayerId` stays put).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric event code, scoped to a room.
pub type EventCode = u16;

/// Numeric entity type tag chosen by the game plugin.
pub type EntityType = u16;

/// Unique identifier for a player session.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// player IDs cannot be confused with other types of IDs in the system.
/// The authorizer decides the value; [`PlayerId::new`] is used when it
/// has no stable identity of its own to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Splits the id into its high and low 64-bit halves for bit packing.
    pub fn to_parts(self) -> (u64, u64) {
        let value = self.0.as_u128();
        ((value >> 64) as u64, value as u64)
    }

    /// Rebuilds an id from the halves produced by [`PlayerId::to_parts`].
    pub fn from_parts(high: u64, low: u64) -> Self {
        Self(Uuid::from_u128(((high as u128) << 64) | low as u128))
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a room.
///
/// Rooms are created on demand by the room manager; the UUID v4 makes ids
/// unique across the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Creates a new random room ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn to_parts(self) -> (u64, u64) {
        let value = self.0.as_u128();
        ((value >> 64) as u64, value as u64)
    }

    pub fn from_parts(high: u64, low: u64) -> Self {
        Self(Uuid::from_u128(((high as u128) << 64) | low as u128))
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-assigned connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Room-scoped entity identity. Ids are recycled after destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}
