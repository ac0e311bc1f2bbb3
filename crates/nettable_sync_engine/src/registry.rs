//! Live connections and their outbound queues.

use nettable_codec::ProtocolRevision;
use nettable_core::{ChangeEvent, ChangeSink, ConnectionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Snapshot of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Peer address.
    pub peer: SocketAddr,
    /// Negotiated revision, once the handshake completed.
    pub revision: Option<ProtocolRevision>,
    /// Identity announced by the peer.
    pub remote_identity: String,
    /// Whether the handshake completed.
    pub active: bool,
}

/// A connection became active or went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Connection id.
    pub connection_id: ConnectionId,
    /// Peer address.
    pub peer: SocketAddr,
    /// Negotiated revision (`None` if it closed before the handshake).
    pub revision: Option<ProtocolRevision>,
    /// True when connected, false when closed.
    pub connected: bool,
}

struct Slot {
    outbound: UnboundedSender<ChangeEvent>,
    info: ConnectionInfo,
}

/// Routes store changes to every live connection.
///
/// The registry is installed once as a sink on the entry store. Each
/// connection worker registers itself and receives every change through
/// its own queue; the worker decides what to send.
pub struct ConnectionRegistry {
    slots: RwLock<HashMap<ConnectionId, Slot>>,
    next_id: AtomicU64,
    observers: RwLock<Vec<Sender<ConnectionEvent>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Allocates an id for a new connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a connection and returns its outbound queue.
    pub fn register(&self, id: ConnectionId, peer: SocketAddr) -> UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = unbounded_channel();
        let info = ConnectionInfo {
            id,
            peer,
            revision: None,
            remote_identity: String::new(),
            active: false,
        };
        self.slots.write().insert(id, Slot { outbound: tx, info });
        rx
    }

    /// Records a completed handshake and notifies observers.
    pub fn mark_active(&self, id: ConnectionId, revision: ProtocolRevision, identity: &str) {
        let peer = {
            let mut slots = self.slots.write();
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };
            slot.info.revision = Some(revision);
            slot.info.remote_identity = identity.to_string();
            slot.info.active = true;
            slot.info.peer
        };
        self.notify(ConnectionEvent {
            connection_id: id,
            peer,
            revision: Some(revision),
            connected: true,
        });
    }

    /// Removes a connection. Observers are told only if it had been active.
    pub fn unregister(&self, id: ConnectionId) {
        let Some(slot) = self.slots.write().remove(&id) else {
            return;
        };
        if slot.info.active {
            self.notify(ConnectionEvent {
                connection_id: id,
                peer: slot.info.peer,
                revision: slot.info.revision,
                connected: false,
            });
        }
    }

    /// Returns true if any connection completed its handshake.
    pub fn is_connected(&self) -> bool {
        self.slots.read().values().any(|slot| slot.info.active)
    }

    /// Returns a snapshot of all connections, ordered by id.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self
            .slots
            .read()
            .values()
            .map(|slot| slot.info.clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Subscribes to connect and disconnect events.
    pub fn subscribe_connections(&self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel();
        self.observers.write().push(tx);
        rx
    }

    fn notify(&self, event: ConnectionEvent) {
        tracing::debug!(
            connection = %event.connection_id,
            peer = %event.peer,
            connected = event.connected,
            "connection state changed"
        );
        self.observers
            .write()
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSink for ConnectionRegistry {
    fn deliver(&self, event: &ChangeEvent) -> bool {
        for slot in self.slots.read().values() {
            // A closed queue means the worker is exiting and will unregister.
            let _ = slot.outbound.send(event.clone());
        }
        true
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.slots.read().len())
            .finish_non_exhaustive()
    }
}
