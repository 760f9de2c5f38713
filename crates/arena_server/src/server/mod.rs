//! Room server host.
//!
//! - [`RoomServer`] - owns the transport and drives the tick loop
//! - [`ServerState`] - tick-thread state shared by the lobby and rooms
//! - [`ServerListener`] - moves transport callbacks onto the tick thread

pub mod core;
mod handlers;
pub mod listener;

pub use self::core::{RoomServer, ServerState};
pub use listener::ServerListener;
