//! Core room server implementation.
//!
//! [`RoomServer`] owns the transport and everything the tick thread
//! mutates: the room manager, the session table, the lobby dispatcher and
//! the executor that resumes async work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    Authorizer, Dispatcher, Executor, PluginFactory, RoomManager, Transport, TransportListener,
};
use tokio::runtime::Handle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::connection::SessionTable;
use crate::error::ServerError;
use crate::server::listener::ServerListener;

/// Tick-thread state the lobby and executor continuations operate on.
pub struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) manager: RoomManager,
    pub(crate) sessions: SessionTable,
    pub(crate) executor: Executor<ServerState>,
    pub(crate) lobby: Dispatcher<ServerState>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
}

impl ServerState {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &RoomManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RoomManager {
        &mut self.manager
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Authorizations still in flight.
    pub fn pending_authorizations(&self) -> usize {
        self.executor.pending()
    }
}

/// The game server: transport, lobby, authorization and rooms, driven by a
/// fixed-rate tick loop.
///
/// # Tick Order
///
/// Each [`step`](RoomServer::step) polls the transport, drains the lobby,
/// runs finished async continuations, then advances every room.
pub struct RoomServer {
    state: ServerState,
    transport: Box<dyn Transport>,
    listener: Arc<ServerListener>,
    running: bool,
}

impl RoomServer {
    /// Creates a server. Nothing is bound until [`start`](RoomServer::start)
    /// or [`run`](RoomServer::run).
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved server configuration
    /// * `transport` - Network backend the server will own
    /// * `factory` - Creates the game plugin for every new room
    /// * `authorizer` - Decides which peers become players
    /// * `runtime` - Runtime that async authorization runs on
    pub fn new(
        config: ServerConfig,
        transport: Box<dyn Transport>,
        factory: Arc<dyn PluginFactory>,
        authorizer: Arc<dyn Authorizer>,
        runtime: Handle,
    ) -> Self {
        let manager = RoomManager::new(factory, config.room_settings());
        let lobby = Dispatcher::new();
        let listener = Arc::new(ServerListener::new(manager.routes(), lobby.clone()));

        Self {
            state: ServerState {
                config,
                manager,
                sessions: SessionTable::new(),
                executor: Executor::new(runtime),
                lobby,
                authorizer,
            },
            transport,
            listener,
            running: false,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    pub fn manager(&self) -> &RoomManager {
        &self.state.manager
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts the transport.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.running {
            return Ok(());
        }
        let listener: Arc<dyn TransportListener> = self.listener.clone();
        self.transport
            .start(listener, &self.state.config.transport_config())?;
        self.running = true;
        info!(
            "🚀 Room server started on {} at {} Hz",
            self.state.config.bind_address, self.state.config.tick_rate_hz
        );
        Ok(())
    }

    /// One pass of the tick loop, covering `elapsed` of real time.
    pub fn step(&mut self, elapsed: Duration) -> Result<(), ServerError> {
        self.transport.poll()?;

        let lobby = self.state.lobby.clone();
        lobby.drain(&mut self.state);

        let executor = self.state.executor.clone();
        executor.update(&mut self.state);

        for departure in self.state.manager.update(elapsed) {
            self.state.room_departed(departure);
        }
        Ok(())
    }

    /// Runs the tick loop until `shutdown` resolves, then shuts down.
    ///
    /// Ticks are scheduled at the configured rate; missed ticks are skipped
    /// and the real elapsed time is handed to the rooms, which catch up.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.start()?;

        let mut ticker = interval(self.state.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let elapsed = now - last;
                    last = now;
                    if let Err(e) = self.step(elapsed) {
                        error!("Tick failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown()
    }

    /// Stops every room, closes every session and stops the transport.
    pub fn shutdown(&mut self) -> Result<(), ServerError> {
        if !self.running {
            return Ok(());
        }
        info!("🧹 Performing server cleanup...");

        let departures = self.state.manager.stop_all();
        info!("🛑 Stopped all rooms, {} player(s) released", departures.len());

        for session in self.state.sessions.drain() {
            session.connection().close();
        }
        self.running = false;

        if let Err(e) = self.transport.stop() {
            warn!("Transport stop failed: {}", e);
            return Err(e.into());
        }
        info!("✅ Server cleanup completed");
        Ok(())
    }
}
