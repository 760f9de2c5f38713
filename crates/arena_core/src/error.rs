//! Error types for the room server core.
//!
//! Every concern gets its own enum so callers can tell a malformed packet
//! (drop the message) from a rejected join (tell the client) from a plugin
//! fault (log and isolate the room).

use crate::types::{EventCode, PeerId, PlayerId, RoomId};

/// Errors raised while encoding or decoding the bit-packed wire format.
///
/// Any of these is fatal to the single message being decoded only; the
/// connection that sent it stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// A read asked for more bits than the buffer holds
    #[error("buffer overrun: requested {requested} bits, {available} available")]
    BufferOverrun { requested: usize, available: usize },
    /// A string field did not contain valid UTF-8
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    /// The message kind header is not one the protocol knows
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u8),
    /// A decoded field is outside the range the protocol allows
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Errors produced by room membership operations.
///
/// `RoomFull` and `RoomNotFound` are surfaced to the requesting client as a
/// join rejection and never cross the tick boundary as a failure.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {room_id} is full ({max} players)")]
    RoomFull { room_id: RoomId, max: usize },
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is not running")]
    NotRunning(RoomId),
    #[error("player {0} is already in a room")]
    AlreadyInRoom(PlayerId),
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("invalid player bounds: min {min}, max {max}")]
    InvalidBounds { min: usize, max: usize },
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Errors that can occur during event subscription and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The code is already taken within the requested scope
    #[error("event code {code} already subscribed in {scope}")]
    DuplicateSubscription { code: EventCode, scope: String },
    /// No handler is registered for the code in any applicable scope
    #[error("no handler for event code {0}")]
    UnknownCode(EventCode),
    /// The payload could not be decoded into the handler's event type
    #[error("event decode error: {0}")]
    Decode(#[from] WireError),
    /// Handler execution failed during event processing
    #[error("handler execution error: {0}")]
    Handler(String),
}

/// Errors that can occur inside game plugin hooks.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin initialization failed while the room was starting
    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Error occurred during plugin execution
    #[error("plugin execution error: {0}")]
    ExecutionError(String),
    /// Event subscription or dispatch failed inside a hook
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Errors reported by transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection {0} is closed")]
    Closed(PeerId),
    #[error("transport has not been started")]
    NotStarted,
    #[error("transport is already running")]
    AlreadyStarted,
    #[error("transport error: {0}")]
    Other(String),
}
