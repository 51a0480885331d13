//! Live-reload broadcasting
//!
//! Every open `/_reload` stream is a registered connection. A file change
//! fans a reload signal out to all of them; the browser reacts with a full
//! page reload. Connections leave the registry only when the client goes
//! away and the stream is dropped.

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Message pushed to live-reload clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadSignal {
    Reload,
}

impl ReloadSignal {
    /// Event data sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadSignal::Reload => "reload",
        }
    }
}

/// Identity of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, UnboundedSender<ReloadSignal>>>,
}

/// Registry of open live-reload connections.
///
/// Cloning is cheap; all clones share one registry.
#[derive(Debug, Clone, Default)]
pub struct ReloadRegistry {
    inner: Arc<Inner>,
}

impl ReloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection. Dropping the stream unregisters it.
    pub fn register(&self) -> ReloadStream {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded_channel();
        self.connections().insert(id, tx);
        tracing::debug!(connection = id.0, "live reload client connected");
        ReloadStream { id, rx, registry: self.clone() }
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        if self.connections().remove(&id).is_some() {
            tracing::debug!(connection = id.0, "live reload client disconnected");
        }
    }

    /// Send `signal` to every open connection, returning how many got it.
    ///
    /// Sends never wait on the receiver; a connection whose receiver is
    /// already gone is skipped without affecting the rest.
    pub fn broadcast_all(&self, signal: ReloadSignal) -> usize {
        let connections = self.connections();
        connections.values().filter(|tx| tx.send(signal).is_ok()).count()
    }

    /// Number of open connections
    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, UnboundedSender<ReloadSignal>>> {
        // A panic while holding the lock cannot leave the map half-updated
        match self.inner.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Signals for one open connection.
#[derive(Debug)]
pub struct ReloadStream {
    id: ConnectionId,
    rx: UnboundedReceiver<ReloadSignal>,
    registry: ReloadRegistry,
}

impl ReloadStream {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Stream for ReloadStream {
    type Item = ReloadSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ReloadStream {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
