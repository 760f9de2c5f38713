//! Connection management for client connections.
//!
//! This module tracks every connected peer's session and where it stands in
//! the authorization flow.

pub mod client;
pub mod manager;

pub use client::{AuthState, ClientSession};
pub use manager::SessionTable;
