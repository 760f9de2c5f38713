//! Cross-thread action queue drained on the tick thread.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;

use crate::types::PeerId;

/// A deferred action against the tick-thread owned `T`.
pub type Action<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Multi-producer, single-consumer FIFO of deferred actions.
///
/// Any thread may [`dispatch`](Dispatcher::dispatch); only the owner of the
/// `&mut T` drains. Cloning yields another handle to the same queue.
pub struct Dispatcher<T> {
    sender: Sender<Action<T>>,
    receiver: Receiver<Action<T>>,
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Enqueues an action for the next drain.
    pub fn dispatch<F>(&self, action: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.sender.send(Box::new(action));
    }

    /// Runs the actions queued when the call starts, in enqueue order.
    /// Actions enqueued while draining wait for the next call.
    pub fn drain(&self, target: &mut T) -> usize {
        let queued = self.receiver.len();
        let mut ran = 0;
        while ran < queued {
            match self.receiver.try_recv() {
                Ok(action) => {
                    action(target);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &self.receiver.len())
            .finish()
    }
}

/// Concurrent `PeerId -> Dispatcher` table.
///
/// Transport threads read it to push inbound data straight into the
/// dispatcher of the room a peer belongs to; only the tick thread attaches
/// and detaches.
pub struct PeerRoutes<T> {
    routes: Arc<DashMap<PeerId, Dispatcher<T>>>,
}

impl<T> PeerRoutes<T> {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
        }
    }

    pub fn attach(&self, peer: PeerId, dispatcher: Dispatcher<T>) {
        self.routes.insert(peer, dispatcher);
    }

    pub fn detach(&self, peer: PeerId) -> bool {
        self.routes.remove(&peer).is_some()
    }

    /// The dispatcher `peer` is attached to, if any.
    pub fn route(&self, peer: PeerId) -> Option<Dispatcher<T>> {
        self.routes.get(&peer).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.routes.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T> Default for PeerRoutes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PeerRoutes<T> {
    fn clone(&self) -> Self {
        Self {
            routes: Arc::clone(&self.routes),
        }
    }
}
