//! The entry store.

use crate::change_feed::{ChangeDispatcher, ChangeEvent, ChangeKind, ChangeSink};
use crate::entry::{ApplyOutcome, ApplyPolicy, Entry, RemoteEntry};
use crate::error::{CoreError, CoreResult};
use crate::types::{ConnectionId, Origin, StoreMode};
use nettable_codec::{EntryFlags, EntryType, EntryValue, SequenceNumber};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Highest id a server may assign; `0xFFFF` means "unassigned" on the wire.
const MAX_ENTRY_ID: u16 = 0xFFFE;

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<String, Entry>,
    ids: HashMap<u16, String>,
    next_id: u32,
}

impl StoreInner {
    fn allocate_id(&mut self, mode: StoreMode, key: &str) -> Option<u16> {
        if mode != StoreMode::Server {
            return None;
        }
        let Ok(id) = u16::try_from(self.next_id) else {
            tracing::warn!(key, "entry id space exhausted");
            return None;
        };
        if id > MAX_ENTRY_ID {
            tracing::warn!(key, "entry id space exhausted");
            return None;
        }
        self.next_id += 1;
        self.ids.insert(id, key.to_string());
        Some(id)
    }
}

/// The authoritative local copy of all entries.
///
/// All reads and writes go through one mutex. Every mutation is dispatched to
/// subscribers exactly once, before the lock is released, so observers see
/// changes in the order they were applied.
///
/// Deleted entries are kept as tombstones. A tombstone keeps its id and last
/// sequence number, so re-creating the key continues numbering above any
/// stale copy a peer may still hold.
///
/// In server mode an id stays bound to its key until [`reset`](Self::reset),
/// since a revision 2.0 peer may still address the stale copy by id. A
/// re-created key gets its old id back. At most `0xFFFF` distinct keys can
/// therefore be numbered per store lifetime; later keys stay local.
pub struct EntryStore {
    mode: StoreMode,
    inner: Mutex<StoreInner>,
    dispatcher: ChangeDispatcher,
}

impl EntryStore {
    /// Creates an empty store.
    pub fn new(mode: StoreMode) -> Self {
        Self {
            mode,
            inner: Mutex::new(StoreInner::default()),
            dispatcher: ChangeDispatcher::new(),
        }
    }

    /// Returns whether this store allocates ids.
    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<EntryValue> {
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone())
    }

    /// Returns a copy of the live entry stored under `key`.
    pub fn entry(&self, key: &str) -> Option<Entry> {
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| e.is_live())
            .cloned()
    }

    /// Returns the value under `key` if it has the `expected` type.
    ///
    /// When the key is absent or holds another type, `default` is returned if
    /// given.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` or `TypeMismatch` when no default is supplied.
    pub fn get_typed(
        &self,
        key: &str,
        expected: EntryType,
        default: Option<EntryValue>,
    ) -> CoreResult<EntryValue> {
        match (self.get(key), default) {
            (Some(value), _) if value.entry_type() == expected => Ok(value),
            (_, Some(default)) => Ok(default),
            (Some(value), None) => Err(CoreError::type_mismatch(
                key,
                expected,
                value.entry_type(),
            )),
            (None, None) => Err(CoreError::key_not_found(key)),
        }
    }

    /// Returns the flags of a live entry.
    pub fn flags(&self, key: &str) -> Option<EntryFlags> {
        self.entry(key).map(|e| e.flags)
    }

    /// Returns true if a live entry exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns all live keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live())
            .map(|e| e.key.clone())
            .collect()
    }

    /// Returns the live keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns a copy of every live entry, sorted by key.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live())
            .cloned()
            .collect()
    }

    /// Returns the live entries written locally and not yet acknowledged.
    pub fn pending(&self) -> Vec<Entry> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live() && e.pending)
            .cloned()
            .collect()
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live())
            .count()
    }

    /// Returns true if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a server-assigned id, including ids of tombstones.
    pub fn key_for_id(&self, id: u16) -> Option<String> {
        self.inner.lock().ids.get(&id).cloned()
    }

    /// Returns the type last stored under a server-assigned id.
    pub fn entry_type_for_id(&self, id: u16) -> Option<EntryType> {
        let inner = self.inner.lock();
        let key = inner.ids.get(&id)?;
        inner.entries.get(key).map(Entry::entry_type)
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    /// Writes a value, creating the entry if needed.
    ///
    /// The sequence number is bumped even if the value is unchanged, so a
    /// repeated write re-propagates. Returns the new sequence number.
    pub fn put(&self, key: &str, value: EntryValue) -> SequenceNumber {
        let mut inner = self.inner.lock();

        let event = match inner.entries.get_mut(key) {
            Some(entry) => {
                let (kind, previous_type) = if entry.deleted {
                    entry.flags = EntryFlags::NONE;
                    entry.deleted = false;
                    (ChangeKind::New, None)
                } else {
                    let old = entry.entry_type();
                    (
                        ChangeKind::Updated,
                        (old != value.entry_type()).then_some(old),
                    )
                };
                entry.value = value;
                entry.sequence = entry.sequence.next();
                entry.pending = true;
                event_for(entry, kind, previous_type, Origin::Local)
            }
            None => {
                let id = inner.allocate_id(self.mode, key);
                let mut entry = Entry::new(key.to_string(), value, id);
                entry.pending = true;
                let event = event_for(&entry, ChangeKind::New, None, Origin::Local);
                inner.entries.insert(key.to_string(), entry);
                event
            }
        };

        let sequence = event.sequence;
        self.dispatcher.emit(&event);
        sequence
    }

    /// Deletes an entry. Returns false if no live entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.delete_with_origin(key, Origin::Local)
    }

    /// Replaces the flags of a live entry. Returns false if nothing changed.
    pub fn set_flags(&self, key: &str, flags: EntryFlags) -> bool {
        self.set_flags_with_origin(key, flags, Origin::Local)
    }

    /// Deletes every live entry that is not persistent.
    pub fn clear(&self) -> usize {
        self.clear_with_origin(Origin::Local)
    }

    /// Clears the pending mark if the entry is still at `sequence`.
    ///
    /// A write made after the one being acknowledged keeps the entry pending.
    pub fn acknowledge(&self, key: &str, sequence: SequenceNumber) {
        if let Some(entry) = self.inner.lock().entries.get_mut(key) {
            if entry.sequence == sequence {
                entry.pending = false;
            }
        }
    }

    /// Silently drops every entry, tombstone and id.
    ///
    /// No events are dispatched; subscribers stay registered.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = StoreInner::default();
        tracing::debug!("entry store reset");
    }

    // ========================================================================
    // Remote mutations
    // ========================================================================

    /// Applies an entry state received from a peer.
    ///
    /// Live entries accept only newer sequence numbers; under
    /// [`ApplyPolicy::InitialSync`] an equal sequence with different content
    /// is applied too. A tombstone accepts any value.
    pub fn apply_remote(
        &self,
        remote: RemoteEntry,
        policy: ApplyPolicy,
        from: ConnectionId,
    ) -> ApplyOutcome {
        let origin = Origin::Remote(from);
        let mut inner = self.inner.lock();

        let event = match inner.entries.get_mut(&remote.key) {
            Some(entry) if entry.deleted => {
                entry.value = remote.value;
                entry.sequence = remote.sequence;
                entry.flags = remote.flags.unwrap_or(EntryFlags::NONE);
                entry.deleted = false;
                entry.pending = false;
                event_for(entry, ChangeKind::New, None, origin)
            }
            Some(entry) => {
                let flags = remote.flags.unwrap_or(entry.flags);
                let newer = remote.sequence.is_newer_than(entry.sequence);
                let tie = policy == ApplyPolicy::InitialSync
                    && remote.sequence == entry.sequence
                    && (remote.value != entry.value || flags != entry.flags);
                if !newer && !tie {
                    tracing::trace!(
                        key = %remote.key,
                        local = %entry.sequence,
                        remote = %remote.sequence,
                        "discarding stale entry"
                    );
                    return ApplyOutcome::Stale;
                }

                let old = entry.entry_type();
                let kind = if remote.value == entry.value && flags != entry.flags && !newer {
                    ChangeKind::FlagsChanged
                } else {
                    ChangeKind::Updated
                };
                let previous_type = (old != remote.value.entry_type()).then_some(old);
                entry.value = remote.value;
                entry.sequence = remote.sequence;
                entry.flags = flags;
                entry.pending = false;
                event_for(entry, kind, previous_type, origin)
            }
            None => {
                let id = inner.allocate_id(self.mode, &remote.key);
                let mut entry = Entry::new(remote.key.clone(), remote.value, id);
                entry.sequence = remote.sequence;
                entry.flags = remote.flags.unwrap_or(EntryFlags::NONE);
                let event = event_for(&entry, ChangeKind::New, None, origin);
                inner.entries.insert(remote.key, entry);
                event
            }
        };

        let kind = event.kind;
        self.dispatcher.emit(&event);
        ApplyOutcome::Applied(kind)
    }

    /// Applies a delete received from a peer.
    pub fn delete_remote(&self, key: &str, from: ConnectionId) -> bool {
        self.delete_with_origin(key, Origin::Remote(from))
    }

    /// Applies a flags change received from a peer.
    pub fn set_flags_remote(&self, key: &str, flags: EntryFlags, from: ConnectionId) -> bool {
        self.set_flags_with_origin(key, flags, Origin::Remote(from))
    }

    /// Applies a clear-all received from a peer.
    pub fn clear_remote(&self, from: ConnectionId) -> usize {
        self.clear_with_origin(Origin::Remote(from))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribes to changes of keys starting with `prefix` (all if `None`).
    pub fn subscribe(&self, prefix: Option<&str>) -> Receiver<ChangeEvent> {
        self.dispatcher.subscribe(prefix)
    }

    /// Registers a sink for changes of keys starting with `prefix`.
    pub fn add_sink(&self, prefix: Option<&str>, sink: Arc<dyn ChangeSink>) {
        self.dispatcher.add_sink(prefix, sink);
    }

    fn delete_with_origin(&self, key: &str, origin: Origin) -> bool {
        let inner = &mut *self.inner.lock();
        let Some(entry) = inner.entries.get_mut(key).filter(|e| e.is_live()) else {
            return false;
        };
        entry.deleted = true;
        entry.pending = false;
        let mut event = event_for(entry, ChangeKind::Deleted, None, origin);
        event.value = None;
        self.dispatcher.emit(&event);
        true
    }

    fn set_flags_with_origin(&self, key: &str, flags: EntryFlags, origin: Origin) -> bool {
        let inner = &mut *self.inner.lock();
        let Some(entry) = inner.entries.get_mut(key).filter(|e| e.is_live()) else {
            return false;
        };
        if entry.flags == flags {
            return false;
        }
        entry.flags = flags;
        let event = event_for(entry, ChangeKind::FlagsChanged, None, origin);
        self.dispatcher.emit(&event);
        true
    }

    fn clear_with_origin(&self, origin: Origin) -> usize {
        let inner = &mut *self.inner.lock();
        let mut cleared = 0;
        for entry in inner.entries.values_mut() {
            if entry.deleted || entry.flags.is_persistent() {
                continue;
            }
            entry.deleted = true;
            entry.pending = false;
            let mut event = event_for(entry, ChangeKind::Deleted, None, origin);
            event.value = None;
            self.dispatcher.emit(&event);
            cleared += 1;
        }
        cleared
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(StoreMode::Client)
    }
}

fn event_for(
    entry: &Entry,
    kind: ChangeKind,
    previous_type: Option<EntryType>,
    origin: Origin,
) -> ChangeEvent {
    ChangeEvent {
        key: entry.key.clone(),
        value: Some(entry.value.clone()),
        kind,
        previous_type,
        sequence: entry.sequence,
        flags: entry.flags,
        id: entry.id,
        origin,
    }
}
