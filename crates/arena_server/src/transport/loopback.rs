//! In-memory transport.
//!
//! Deterministic and synchronous: bytes a [`LoopbackClient`] sends are
//! handed to the listener on the caller's thread, and everything the server
//! sends lands in the client's inbox. Used by tests and in-process bots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use arena_core::{
    Channel, ClientMessage, Connection, ConnectionStats, PeerId, ServerMessage, StatsRecorder,
    Transport, TransportConfig, TransportError, TransportListener,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use tracing::{debug, info};

#[derive(Default)]
struct Hub {
    listener: RwLock<Option<Arc<dyn TransportListener>>>,
    next_peer: AtomicU64,
    connections: DashMap<PeerId, Arc<LoopbackConnection>>,
}

impl Hub {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Transport whose peers live in the same process.
///
/// Clones share state, so a test can keep one handle for connecting clients
/// while the server owns another.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    hub: Arc<Hub>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client connection and announces it to the listener.
    pub fn connect(&self) -> Result<LoopbackClient, TransportError> {
        let listener = self.hub.listener().ok_or(TransportError::NotStarted)?;
        let peer = PeerId(self.hub.next_peer.fetch_add(1, Ordering::Relaxed) + 1);

        let (sender, inbox) = unbounded();
        let connection = Arc::new(LoopbackConnection::new(peer, sender));
        self.hub.connections.insert(peer, connection.clone());
        debug!(%peer, "Loopback peer connected");
        listener.on_connected(connection.clone());

        Ok(LoopbackClient {
            connection,
            inbox,
            hub: self.hub.clone(),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.hub.connections.len()
    }
}

impl Transport for LoopbackTransport {
    fn start(
        &mut self,
        listener: Arc<dyn TransportListener>,
        _config: &TransportConfig,
    ) -> Result<(), TransportError> {
        let mut slot = self
            .hub
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        *slot = Some(listener);
        info!("🔁 Loopback transport started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        self.hub
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        for entry in self.hub.connections.iter() {
            entry.value().close();
        }
        self.hub.connections.clear();
        info!("🔁 Loopback transport stopped");
        Ok(())
    }
}

struct LoopbackChannel {
    peer: PeerId,
    sender: Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
    stats: Arc<StatsRecorder>,
}

impl Channel for LoopbackChannel {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.peer));
        }
        self.sender
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Closed(self.peer))?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }
}

/// Server-side end of a loopback peer. Both channels are reliable.
pub struct LoopbackConnection {
    id: PeerId,
    reliable: LoopbackChannel,
    unreliable: LoopbackChannel,
    closed: Arc<AtomicBool>,
    stats: Arc<StatsRecorder>,
}

impl LoopbackConnection {
    fn new(id: PeerId, sender: Sender<Vec<u8>>) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(StatsRecorder::default());
        let channel = |sender| LoopbackChannel {
            peer: id,
            sender,
            closed: closed.clone(),
            stats: stats.clone(),
        };
        Self {
            id,
            reliable: channel(sender.clone()),
            unreliable: channel(sender),
            closed: closed.clone(),
            stats: stats.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for LoopbackConnection {
    fn id(&self) -> PeerId {
        self.id
    }

    fn reliable(&self) -> &dyn Channel {
        &self.reliable
    }

    fn unreliable(&self) -> &dyn Channel {
        &self.unreliable
    }

    fn stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Client-side end of a loopback peer.
pub struct LoopbackClient {
    connection: Arc<LoopbackConnection>,
    inbox: Receiver<Vec<u8>>,
    hub: Arc<Hub>,
}

impl LoopbackClient {
    pub fn peer(&self) -> PeerId {
        self.connection.id
    }

    pub fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        self.send_bytes(&message.encode())
    }

    /// Delivers raw bytes to the server as if they came off the wire.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.connection.is_closed() {
            return Err(TransportError::Closed(self.peer()));
        }
        let listener = self.hub.listener().ok_or(TransportError::NotStarted)?;
        self.connection.stats.record_received(bytes.len());
        let connection: Arc<dyn Connection> = self.connection.clone();
        listener.on_data(&connection, bytes);
        Ok(())
    }

    /// Takes every message the server has sent since the last call.
    /// Undecodable frames are skipped.
    pub fn received(&self) -> Vec<ServerMessage> {
        self.inbox
            .try_iter()
            .filter_map(|bytes| ServerMessage::decode(&bytes).ok())
            .collect()
    }

    /// True once the server closed this connection.
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Drops the connection from the client side.
    pub fn disconnect(&self) {
        self.drop_with(|listener, peer| listener.on_disconnected(peer));
    }

    /// Reports the connection as timed out.
    pub fn time_out(&self) {
        self.drop_with(|listener, peer| listener.on_timeout(peer));
    }

    fn drop_with(&self, notify: impl FnOnce(&dyn TransportListener, PeerId)) {
        self.connection.close();
        if self.hub.connections.remove(&self.peer()).is_some() {
            if let Some(listener) = self.hub.listener() {
                notify(listener.as_ref(), self.peer());
            }
        }
    }
}
