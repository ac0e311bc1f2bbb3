//! Change dispatch for observing entry mutations.
//!
//! Every mutation applied by the [`EntryStore`](crate::EntryStore), local or
//! remote, produces exactly one [`ChangeEvent`]. Events are delivered to
//! every matching subscriber in the order the store applied them.
//!
//! # Usage
//!
//! ```rust
//! use nettable_core::{EntryStore, StoreMode};
//!
//! let store = EntryStore::new(StoreMode::Client);
//! let receiver = store.subscribe(Some("/t1/"));
//!
//! store.put("/t1/flag", true.into());
//! store.put("/other/flag", true.into());
//!
//! let event = receiver.try_recv().unwrap();
//! assert_eq!(event.key, "/t1/flag");
//! assert!(event.is_new());
//! assert!(receiver.try_recv().is_err());
//! ```

use crate::types::Origin;
use nettable_codec::{EntryFlags, EntryType, EntryValue, SequenceNumber};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Type of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entry was created, or re-created after a delete.
    New,
    /// Value (and possibly type) of a live entry changed.
    Updated,
    /// Only the flags changed.
    FlagsChanged,
    /// Entry was deleted.
    Deleted,
}

/// A single mutation of the entry store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Full key of the entry.
    pub key: String,
    /// New value. `None` for deletes.
    pub value: Option<EntryValue>,
    /// Type of change.
    pub kind: ChangeKind,
    /// Type stored before an update, when it differed from the new one.
    pub previous_type: Option<EntryType>,
    /// Sequence number after the mutation.
    pub sequence: SequenceNumber,
    /// Flags after the mutation.
    pub flags: EntryFlags,
    /// Server-assigned id, if the store allocates ids.
    pub id: Option<u16>,
    /// Where the mutation came from.
    pub origin: Origin,
}

impl ChangeEvent {
    /// Returns true if the key did not exist before this mutation.
    pub fn is_new(&self) -> bool {
        self.kind == ChangeKind::New
    }

    /// Returns true if the key was removed.
    pub fn is_deleted(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }

    /// Returns true if an update replaced the value with one of another type.
    pub fn type_changed(&self) -> bool {
        self.previous_type.is_some()
    }

    /// Returns the type of the new value.
    pub fn entry_type(&self) -> Option<EntryType> {
        self.value.as_ref().map(EntryValue::entry_type)
    }
}

/// A consumer of change events.
///
/// `deliver` is called while the store lock is held, so implementations must
/// not block and must not call back into the store.
pub trait ChangeSink: Send + Sync {
    /// Delivers one event. Returning `false` unregisters the sink.
    fn deliver(&self, event: &ChangeEvent) -> bool;
}

impl ChangeSink for Sender<ChangeEvent> {
    fn deliver(&self, event: &ChangeEvent) -> bool {
        self.send(event.clone()).is_ok()
    }
}

struct Subscription {
    prefix: Option<String>,
    sink: Arc<dyn ChangeSink>,
}

impl Subscription {
    fn matches(&self, key: &str) -> bool {
        self.prefix
            .as_deref()
            .map_or(true, |prefix| key.starts_with(prefix))
    }
}

/// Distributes change events to subscribers.
///
/// The dispatcher:
/// - Preserves the order events are emitted in
/// - Filters by key prefix per subscriber
/// - Drops subscribers whose receiving end has gone away
pub struct ChangeDispatcher {
    subscribers: RwLock<Vec<Subscription>>,
}

impl ChangeDispatcher {
    /// Creates a new dispatcher.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to events whose key starts with `prefix` (all if `None`).
    pub fn subscribe(&self, prefix: Option<&str>) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.add_sink(prefix, Arc::new(tx));
        rx
    }

    /// Registers a custom sink.
    pub fn add_sink(&self, prefix: Option<&str>, sink: Arc<dyn ChangeSink>) {
        self.subscribers.write().push(Subscription {
            prefix: prefix.map(str::to_string),
            sink,
        });
    }

    /// Emits an event to all matching subscribers.
    pub fn emit(&self, event: &ChangeEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sub| !sub.matches(&event.key) || sub.sink.deliver(event));
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
