//! # Arena Core
//!
//! Building blocks for a room-based authoritative multiplayer server.
//!
//! Clients connect over a pluggable transport, are authorized, and join or
//! create rooms. Each room runs one game plugin at a fixed tick rate and
//! replicates entity state and typed events to its players over a compact
//! bit-packed wire format.
//!
//! ## Architecture Overview
//!
//! - [`wire`] - Bit-level buffer, numeric compressors and protocol messages
//! - [`transport`] - Connection and channel contract a transport implements
//! - [`concurrency`] - Dispatcher, executor and scheduler that keep all room
//!   work on the tick thread
//! - [`replication`] - Entities with dirty-tracked properties
//! - [`events`] - Code-keyed event routing to typed handlers
//! - [`room`] - The room itself and the context its plugin works through
//! - [`manager`] - Matchmaking, room lifetime and peer routing
//!
//! ## Threading
//!
//! Transport callbacks run on whatever threads the transport uses. They only
//! ever touch a [`Dispatcher`] (via [`PeerRoutes`]) or an [`Executor`]. Rooms,
//! entities and players are owned by the [`RoomManager`] and mutated solely
//! from the thread that calls [`RoomManager::update`].
//!
//! ## Writing a Game
//!
//! Implement [`RoomPlugin`], register handlers in `on_start` and hand a
//! [`PluginFactory`] to the manager:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arena_core::*;
//!
//! struct Chat;
//!
//! impl RoomPlugin for Chat {
//!     fn on_start(&mut self, ctx: &mut RoomContext) -> Result<(), PluginError> {
//!         ctx.subscribe(1, |ctx: &mut RoomContext, _sender, line: String| {
//!             ctx.send_event(EventTarget::Room, 1, &line);
//!             Ok(())
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let factory: Arc<dyn PluginFactory> =
//!     Arc::new(|_map: &str| -> Result<Box<dyn RoomPlugin>, PluginError> { Ok(Box::new(Chat)) });
//! let manager = RoomManager::new(factory, RoomSettings::default());
//! ```

pub mod auth;
pub mod concurrency;
pub mod error;
pub mod events;
pub mod manager;
pub mod player;
pub mod plugin;
pub mod replication;
pub mod room;
pub mod transport;
pub mod types;
pub mod wire;

pub use auth::{AnonymousAuthorizer, AuthDecision, AuthorizationRejected, Authorizer};
pub use concurrency::{Dispatcher, Executor, PeerRoutes, Repeat, Scheduler, TaskHandle};
pub use error::{EventError, PluginError, RoomError, TransportError, WireError};
pub use events::{EventHandler, EventRouter, EventScope, NetEvent, TypedEventHandler};
pub use manager::RoomManager;
pub use player::Player;
pub use plugin::{DeparturePolicy, PluginFactory, RoomPlugin};
pub use replication::{Entity, EntityCache, Property, State};
pub use room::{
    Departure, DepartureReason, EventTarget, GameRoom, RoomContext, RoomSettings, RoomState,
    RoomSummary,
};
pub use transport::{
    Channel, Connection, ConnectionStats, StatsRecorder, Transport, TransportConfig,
    TransportListener,
};
pub use types::{EntityId, EntityType, EventCode, PeerId, PlayerId, RoomId};
pub use wire::{
    ClientMessage, EntityRecord, FloatCompressor, IntCompressor, RejectReason, ServerMessage,
    WireBuffer, WireCodec,
};

// Handlers and plugins commonly need these alongside the crate's own types.
pub use async_trait::async_trait;
