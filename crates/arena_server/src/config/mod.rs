//! Configuration module for the Arena server
//!
//! This module handles command-line arguments, configuration file parsing,
//! validation, and the resolved [`ServerConfig`] the server runs with.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{AppConfig, LoggingSettings, RoomDefaults, ServerSettings};

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use arena_core::{RoomSettings, TransportConfig};
use tracing::{info, warn};

use crate::error::ServerError;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Fully resolved runtime configuration for [`crate::RoomServer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub tick_rate_hz: u32,
    pub max_catch_up_ticks: u32,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub default_min_players: usize,
    pub default_max_players: usize,
    pub destroy_when_empty: bool,
}

impl ServerConfig {
    /// Real-time length of one tick loop iteration.
    pub fn tick_interval(&self) -> Duration {
        self.room_settings().step()
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            tick_rate_hz: self.tick_rate_hz,
            max_catch_up_ticks: self.max_catch_up_ticks,
            destroy_when_empty: self.destroy_when_empty,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            bind_address: self.bind_address.clone(),
            connection_timeout: self.connection_timeout,
            max_connections: self.max_connections,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        AppConfig::default().to_server_config()
    }
}

impl AppConfig {
    /// Load configuration from file or create default configuration
    ///
    /// If the file doesn't exist, a default configuration file is written
    /// and the defaults are returned.
    ///
    /// # Errors
    /// * Returns error if file I/O operations fail
    /// * Returns error if TOML parsing fails
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await? {
            let config_str = tokio::fs::read_to_string(path).await?;
            match toml::from_str::<AppConfig>(&config_str) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    Err(e.into())
                }
            }
        } else {
            warn!("Configuration file not found: {}, using defaults", path.display());

            let default_config = AppConfig::default();
            let config_str = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, config_str).await?;
            info!("Created default configuration file: {}", path.display());

            Ok(default_config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(listen) = &args.listen {
            self.server.bind_address = listen.clone();
        }
        if let Some(tick_rate) = args.tick_rate {
            self.server.tick_rate_hz = tick_rate;
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ServerError::Config(format!(
                    "invalid bind_address '{}': {e}",
                    self.server.bind_address
                ))
            })?;

        if !(1..=1000).contains(&self.server.tick_rate_hz) {
            return Err(ServerError::Config(format!(
                "tick_rate_hz must be between 1 and 1000, got {}",
                self.server.tick_rate_hz
            )));
        }
        if self.server.max_catch_up_ticks == 0 {
            return Err(ServerError::Config(
                "max_catch_up_ticks must be at least 1".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(ServerError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let rooms = &self.rooms;
        if rooms.default_max_players == 0 || rooms.default_min_players > rooms.default_max_players {
            return Err(ServerError::Config(format!(
                "invalid room player bounds: min {} max {}",
                rooms.default_min_players, rooms.default_max_players
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ServerError::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.server.bind_address.clone(),
            tick_rate_hz: self.server.tick_rate_hz,
            max_catch_up_ticks: self.server.max_catch_up_ticks,
            connection_timeout: Duration::from_secs(self.server.connection_timeout_secs),
            max_connections: self.server.max_connections,
            default_min_players: self.rooms.default_min_players,
            default_max_players: self.rooms.default_max_players,
            destroy_when_empty: self.rooms.destroy_when_empty,
        }
    }
}
