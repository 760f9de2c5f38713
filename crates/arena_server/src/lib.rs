//! # Arena Server
//!
//! Host process for [`arena_core`] rooms. The server owns a transport, keeps
//! one session per connected peer, authorizes peers, matches players into
//! rooms and drives every room from a single fixed-rate tick loop.
//!
//! ## Message Flow
//!
//! 1. A transport reports a connection; the [`server::ServerListener`]
//!    queues it on the lobby dispatcher
//! 2. `Authorize` is resolved asynchronously by the configured
//!    [`arena_core::Authorizer`] and resumed on the tick thread
//! 3. `Join` / `JoinOrCreate` place the player in a room and route the peer
//!    straight to that room's dispatcher
//! 4. Room traffic never passes through the lobby again until the player
//!    leaves
//!
//! ## Configuration
//!
//! Settings come from a TOML file (created with defaults when missing) with
//! command line overrides; see [`config`].

pub mod config;
pub mod connection;
pub mod demo;
pub mod error;
pub mod logging;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::{AppConfig, Args, ServerConfig};
pub use connection::{AuthState, ClientSession, SessionTable};
pub use error::ServerError;
pub use server::{RoomServer, ServerListener, ServerState};
pub use transport::{LoopbackClient, LoopbackTransport, WebSocketTransport};
