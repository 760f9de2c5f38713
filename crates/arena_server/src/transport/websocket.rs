//! WebSocket transport
//!
//! Accepts TCP connections on the tokio runtime, performs the WebSocket
//! handshake and exchanges binary frames. Both channels of a connection map
//! onto its single ordered stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    Channel, Connection, ConnectionStats, PeerId, StatsRecorder, Transport, TransportConfig,
    TransportError, TransportListener,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

type ConnectionMap = Arc<DashMap<PeerId, Arc<WsConnection>>>;

/// Transport serving clients over WebSocket binary frames.
pub struct WebSocketTransport {
    runtime: Handle,
    connections: ConnectionMap,
    next_peer: Arc<AtomicU64>,
    shutdown: Option<watch::Sender<bool>>,
    local_addr: Option<SocketAddr>,
}

impl WebSocketTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            connections: Arc::new(DashMap::new()),
            next_peer: Arc::new(AtomicU64::new(0)),
            shutdown: None,
            local_addr: None,
        }
    }

    /// Address actually bound, once started. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Transport for WebSocketTransport {
    fn start(
        &mut self,
        listener: Arc<dyn TransportListener>,
        config: &TransportConfig,
    ) -> Result<(), TransportError> {
        if self.shutdown.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let std_listener = std::net::TcpListener::bind(&config.bind_address)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let tcp_listener = {
            let _runtime = self.runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        self.runtime.spawn(accept_loop(
            tcp_listener,
            listener,
            self.connections.clone(),
            self.next_peer.clone(),
            config.clone(),
            shutdown_receiver,
        ));

        self.shutdown = Some(shutdown_sender);
        self.local_addr = Some(local_addr);
        info!("✅ WebSocket transport listening on {}", local_addr);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };
        let _ = shutdown.send(true);
        for entry in self.connections.iter() {
            entry.value().close();
        }
        info!("🛑 WebSocket transport stopped");
        Ok(())
    }
}

async fn accept_loop(
    tcp_listener: TcpListener,
    listener: Arc<dyn TransportListener>,
    connections: ConnectionMap,
    next_peer: Arc<AtomicU64>,
    config: TransportConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = tcp_listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if connections.len() >= config.max_connections {
                        warn!("⚠️ Connection limit reached, refusing {}", addr);
                        tokio::spawn(refuse(stream, addr));
                        continue;
                    }
                    let peer = PeerId(next_peer.fetch_add(1, Ordering::Relaxed) + 1);
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        peer,
                        listener.clone(),
                        connections.clone(),
                        config.connection_timeout,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Completes the handshake only to close with "try again later", so the
/// client sees a refusal instead of a reset.
async fn refuse(stream: TcpStream, addr: SocketAddr) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with refused {} failed: {}", addr, e);
            return;
        }
    };
    let frame = CloseFrame {
        code: CloseCode::Again,
        reason: "connection limit reached".into(),
    };
    if let Err(e) = ws_stream.close(Some(frame)).await {
        debug!("Closing refused {} failed: {}", addr, e);
        return;
    }
    // Wait briefly for the client's close reply.
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(Ok(_)) = ws_stream.next().await {}
    })
    .await;
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    peer: PeerId,
    listener: Arc<dyn TransportListener>,
    connections: ConnectionMap,
    idle_timeout: Duration,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sink, mut ws_receiver) = ws_stream.split();
    let (sender, mut outbound) = mpsc::unbounded_channel::<Message>();
    let connection = Arc::new(WsConnection::new(peer, addr, sender));
    connections.insert(peer, connection.clone());
    info!(%peer, %addr, "🔌 Connection established");
    listener.on_connected(connection.clone());

    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if ws_sink.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let dyn_connection: Arc<dyn Connection> = connection.clone();
    let mut timed_out = false;
    loop {
        // A zero timeout disables idle detection.
        let frame = if idle_timeout.is_zero() {
            Ok(ws_receiver.next().await)
        } else {
            tokio::time::timeout(idle_timeout, ws_receiver.next()).await
        };

        match frame {
            Err(_) => {
                timed_out = true;
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                debug!(%peer, error = %e, "WebSocket read failed");
                break;
            }
            Ok(Some(Ok(Message::Binary(data)))) => {
                connection.stats.record_received(data.len());
                listener.on_data(&dyn_connection, &data);
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(Some(Ok(_))) => {
                warn!(%peer, "Received unsupported message type");
            }
        }
    }

    connection.close();
    connections.remove(&peer);
    if timed_out {
        info!(%peer, "⏱️ Connection timed out");
        listener.on_timeout(peer);
    } else {
        info!(%peer, "Connection closed");
        listener.on_disconnected(peer);
    }
}

struct WsChannel {
    peer: PeerId,
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    stats: StatsRecorder,
}

impl Channel for WsChannel {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.peer));
        }
        self.sender
            .send(Message::Binary(bytes.to_vec().into()))
            .map_err(|_| TransportError::Closed(self.peer))?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }
}

/// One WebSocket client. Sends are queued to a writer task and never block.
pub struct WsConnection {
    addr: SocketAddr,
    channel: WsChannel,
    stats: Arc<StatsRecorder>,
}

impl WsConnection {
    fn new(peer: PeerId, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            addr,
            channel: WsChannel {
                peer,
                sender,
                closed: AtomicBool::new(false),
                stats: StatsRecorder::default(),
            },
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connection for WsConnection {
    fn id(&self) -> PeerId {
        self.channel.peer
    }

    fn reliable(&self) -> &dyn Channel {
        &self.channel
    }

    fn unreliable(&self) -> &dyn Channel {
        &self.channel
    }

    fn stats(&self) -> ConnectionStats {
        let sent = self.channel.stats.snapshot();
        let received = self.stats.snapshot();
        ConnectionStats {
            bytes_sent: sent.bytes_sent,
            messages_sent: sent.messages_sent,
            bytes_received: received.bytes_received,
            messages_received: received.messages_received,
        }
    }

    fn close(&self) {
        if !self.channel.closed.swap(true, Ordering::AcqRel) {
            let _ = self.channel.sender.send(Message::Close(None));
        }
    }
}
