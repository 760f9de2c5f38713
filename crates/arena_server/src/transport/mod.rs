//! Transport backends for [`arena_core::Transport`].
//!
//! - [`WebSocketTransport`] - production backend on tokio-tungstenite
//! - [`LoopbackTransport`] - in-memory backend for tests and bots

pub mod loopback;
pub mod websocket;

pub use loopback::{LoopbackClient, LoopbackConnection, LoopbackTransport};
pub use websocket::{WebSocketTransport, WsConnection};
