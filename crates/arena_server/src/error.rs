//! Error types for the server host.

use arena_core::TransportError;

/// Errors surfaced by [`crate::RoomServer`] and its transports.
///
/// Per-room and per-message failures never reach this type; they are
/// logged and isolated inside the room or lobby that hit them.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
