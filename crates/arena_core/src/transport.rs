//! Transport layer abstractions.
//!
//! The core never opens a socket. A [`Transport`] implementation owns its own
//! I/O loop and reports connection lifecycle and inbound bytes to a
//! [`TransportListener`]; outbound traffic goes through the [`Channel`]s of a
//! [`Connection`]. Listener callbacks run on transport threads and must only
//! hand work off (see [`crate::concurrency::Dispatcher`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::types::PeerId;

/// Configuration handed to [`Transport::start`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bind_address: String,
    /// Idle time after which a silent connection is reported as timed out.
    pub connection_timeout: Duration,
    pub max_connections: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            connection_timeout: Duration::from_secs(30),
            max_connections: 1000,
        }
    }
}

/// One delivery path of a connection.
///
/// `send` queues bytes without blocking; `flush` pushes anything a transport
/// batches internally.
pub trait Channel: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Traffic counters for a single connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// Lock-free counters transports can embed and snapshot into
/// [`ConnectionStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl StatsRecorder {
    pub fn record_sent(&self, len: usize) {
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, len: usize) {
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// A connected peer as seen by the server.
pub trait Connection: Send + Sync {
    fn id(&self) -> PeerId;

    /// Ordered, guaranteed delivery.
    fn reliable(&self) -> &dyn Channel;

    /// Best-effort delivery. Transports without one may return the reliable
    /// channel.
    fn unreliable(&self) -> &dyn Channel;

    fn stats(&self) -> ConnectionStats {
        ConnectionStats::default()
    }

    /// Round-trip estimate, when the transport measures one.
    fn latency(&self) -> Option<Duration> {
        None
    }

    /// Closes the connection after queued reliable data has been sent.
    fn close(&self);
}

/// Callbacks a transport raises from its own I/O loop.
pub trait TransportListener: Send + Sync {
    fn on_connected(&self, connection: Arc<dyn Connection>);
    fn on_disconnected(&self, peer: PeerId);
    fn on_timeout(&self, peer: PeerId);
    fn on_data(&self, connection: &Arc<dyn Connection>, bytes: &[u8]);
}

/// A network backend.
pub trait Transport: Send {
    fn start(
        &mut self,
        listener: Arc<dyn TransportListener>,
        config: &TransportConfig,
    ) -> Result<(), TransportError>;

    /// Gives transports that need it a chance to do work on the tick thread.
    /// Transports with their own background tasks may leave this empty.
    fn poll(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError>;
}
