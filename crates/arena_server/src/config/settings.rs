//! Configuration settings structures
//!
//! The on-disk TOML layout. Every section has defaults, so a partial file
//! (or none at all) still yields a usable configuration.

use serde::{Deserialize, Serialize};

/// Root of the TOML configuration file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub rooms: RoomDefaults,
    pub logging: LoggingSettings,
}

/// Network and tick loop settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to
    ///
    /// Format: "IP:PORT" (e.g., "127.0.0.1:8080" for localhost,
    /// "0.0.0.0:8080" for all interfaces)
    pub bind_address: String,

    /// Room simulation steps per second
    pub tick_rate_hz: u32,

    /// Steps a room may run in one update to catch up after a stall
    pub max_catch_up_ticks: u32,

    /// Idle seconds before a silent connection is dropped
    pub connection_timeout_secs: u64,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            tick_rate_hz: 20,
            max_catch_up_ticks: 5,
            connection_timeout_secs: 30,
            max_connections: 1000,
        }
    }
}

/// Bounds used when a client asks for a room without giving its own.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoomDefaults {
    pub default_min_players: usize,
    pub default_max_players: usize,
    /// Stop a room as soon as its last player leaves
    pub destroy_when_empty: bool,
}

impl Default for RoomDefaults {
    fn default() -> Self {
        Self {
            default_min_players: 1,
            default_max_players: 8,
            destroy_when_empty: true,
        }
    }
}

/// Logging system configuration
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level filter
    ///
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
