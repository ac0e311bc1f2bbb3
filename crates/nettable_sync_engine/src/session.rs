//! The protocol state machine of one connection.
//!
//! A [`Session`] never touches a socket. It consumes decoded messages and
//! local change events and returns the messages to write; the connection
//! worker owns the stream and the timers.

use crate::error::{SyncError, SyncResult};
use crate::state::SessionState;
use nettable_codec::{EntryFlags, EntryType, EntryValue, ProtocolRevision, SequenceNumber};
use nettable_core::{
    ApplyOutcome, ApplyPolicy, ChangeEvent, ChangeKind, ConnectionId, EntryStore, Origin,
    RemoteEntry,
};
use nettable_sync_protocol::{Capabilities, EntryTypes, Message, UNASSIGNED_ID};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which end of the connection a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts clients and numbers entries.
    Server,
    /// Connects to a server.
    Client,
}

/// Per-connection id table of a client.
///
/// Server ids are only valid for the connection that announced them, so the
/// table is dropped with the session.
#[derive(Debug, Default)]
struct IdMap {
    by_id: HashMap<u16, (String, EntryType)>,
    by_key: HashMap<String, u16>,
}

impl IdMap {
    fn insert(&mut self, id: u16, key: &str, ty: EntryType) {
        if let Some((old_key, _)) = self.by_id.insert(id, (key.to_string(), ty)) {
            if old_key != key {
                self.by_key.remove(&old_key);
            }
        }
        self.by_key.insert(key.to_string(), id);
    }

    fn key(&self, id: u16) -> Option<&str> {
        self.by_id.get(&id).map(|(key, _)| key.as_str())
    }

    fn id(&self, key: &str) -> Option<u16> {
        self.by_key.get(key).copied()
    }

    fn entry_type(&self, id: u16) -> Option<EntryType> {
        self.by_id.get(&id).map(|(_, ty)| *ty)
    }

    fn set_type(&mut self, id: u16, ty: EntryType) {
        if let Some((_, slot)) = self.by_id.get_mut(&id) {
            *slot = ty;
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Some(id) = self.by_key.remove(key) {
            self.by_id.remove(&id);
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.by_key.retain(|key, _| keep(key));
        let by_key = &self.by_key;
        self.by_id.retain(|_, (key, _)| by_key.contains_key(key));
    }
}

/// Protocol state machine of one connection.
pub struct Session {
    role: Role,
    connection: ConnectionId,
    store: Arc<EntryStore>,
    identity: String,
    revision: ProtocolRevision,
    caps: Capabilities,
    state: SessionState,
    peer_identity: Option<String>,
    ids: IdMap,
    unacked: Vec<(String, SequenceNumber)>,
}

impl Session {
    /// Creates the server side of a connection.
    ///
    /// `max_revision` is the newest revision the server will accept.
    pub fn server(
        store: Arc<EntryStore>,
        connection: ConnectionId,
        max_revision: ProtocolRevision,
        identity: impl Into<String>,
    ) -> Self {
        Self::new(Role::Server, store, connection, max_revision, identity.into())
    }

    /// Creates the client side of a connection requesting `revision`.
    pub fn client(
        store: Arc<EntryStore>,
        connection: ConnectionId,
        revision: ProtocolRevision,
        identity: impl Into<String>,
    ) -> Self {
        Self::new(Role::Client, store, connection, revision, identity.into())
    }

    fn new(
        role: Role,
        store: Arc<EntryStore>,
        connection: ConnectionId,
        revision: ProtocolRevision,
        identity: String,
    ) -> Self {
        Self {
            role,
            connection,
            store,
            identity,
            revision,
            caps: Capabilities::for_revision(revision),
            state: SessionState::Connecting,
            peer_identity: None,
            ids: IdMap::default(),
            unacked: Vec::new(),
        }
    }

    /// Returns the role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the connection this session belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the revision in use: the negotiated one once the handshake
    /// settled it, otherwise the requested (client) or maximum (server) one.
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Returns the capabilities of [`revision`](Self::revision).
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Returns the identity the peer announced, if any.
    pub fn peer_identity(&self) -> Option<&str> {
        self.peer_identity.as_deref()
    }

    /// Begins the handshake and returns the messages to send first.
    pub fn start(&mut self) -> Vec<Message> {
        match self.role {
            Role::Server => {
                self.state = SessionState::AwaitingClientHello;
                Vec::new()
            }
            Role::Client => {
                self.state = SessionState::AwaitingServerHello;
                vec![Message::client_hello(self.revision, self.identity.clone())]
            }
        }
    }

    /// Marks the session closed.
    pub fn close(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Handles one message from the peer and returns the replies.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the connection: an unknown entry id, a message
    /// illegal in the current state, or (client) a rejected handshake.
    pub fn handle(&mut self, message: Message) -> SyncResult<Vec<Message>> {
        if message == Message::KeepAlive {
            return Ok(Vec::new());
        }
        match (self.role, self.state) {
            (Role::Server, SessionState::AwaitingClientHello) => self.on_client_hello(message),
            (Role::Client, SessionState::AwaitingServerHello) => self.on_server_hello(message),
            (_, SessionState::Synchronizing | SessionState::Active) => {
                self.on_entry_message(message)
            }
            _ => Err(self.unexpected(&message)),
        }
    }

    /// Translates a store change into the message for this connection.
    ///
    /// Returns `None` when the change must not travel on this connection:
    /// it came from the peer, or the revision cannot express it.
    pub fn outgoing_for(&mut self, event: &ChangeEvent) -> Option<Message> {
        if !self.state.is_active() {
            return None;
        }
        match event.origin {
            Origin::Local => {}
            // The originator learns the id of an entry it created.
            Origin::Remote(from)
                if self.role == Role::Server && (from != self.connection || event.is_new()) => {}
            Origin::Remote(_) => return None,
        }

        match event.kind {
            ChangeKind::Deleted => {
                if !self.caps.supports_deletes {
                    debug!(
                        connection = %self.connection,
                        key = %event.key,
                        revision = %self.revision,
                        "delete not propagated"
                    );
                    return None;
                }
                let id = self.id_for(event)?;
                if self.role == Role::Client {
                    self.ids.remove_key(&event.key);
                }
                Some(Message::EntryDelete { id })
            }
            ChangeKind::FlagsChanged => {
                if !self.caps.supports_flags {
                    return None;
                }
                let id = self.id_for(event)?;
                Some(Message::FlagsUpdate {
                    id,
                    flags: event.flags,
                })
            }
            ChangeKind::New | ChangeKind::Updated => {
                let value = event.value.clone()?;
                if !self.can_carry(&value) {
                    debug!(
                        connection = %self.connection,
                        key = %event.key,
                        revision = %self.revision,
                        "raw value not propagated"
                    );
                    return None;
                }
                self.entry_message(event, value)
            }
        }
    }

    /// Acknowledges every local write handed out since the last flush.
    ///
    /// Call once the messages were written to the socket.
    pub fn flushed(&mut self) {
        for (key, sequence) in self.unacked.drain(..) {
            self.store.acknowledge(&key, sequence);
        }
    }

    /// Forgets a write that could not be encoded so it stays pending.
    ///
    /// Returns the key the message was about, if known.
    pub fn unsent(&mut self, message: &Message) -> Option<String> {
        let (key, sequence) = match message {
            Message::EntryAssignment { key, sequence, .. } => (key.clone(), *sequence),
            Message::EntryUpdate { id, sequence, .. } => {
                let key = match self.role {
                    Role::Server => self.store.key_for_id(*id),
                    Role::Client => self.ids.key(*id).map(str::to_string),
                }?;
                (key, *sequence)
            }
            _ => return None,
        };
        self.unacked.retain(|(k, s)| !(*k == key && *s == sequence));
        Some(key)
    }

    fn entry_message(&mut self, event: &ChangeEvent, value: EntryValue) -> Option<Message> {
        let known = self.id_for(event);
        let needs_assignment = event.is_new() || event.type_changed();
        let ty = value.entry_type();

        let message = match (self.role, known) {
            (_, Some(id)) if !needs_assignment => Message::EntryUpdate {
                id,
                sequence: event.sequence,
                value,
            },
            (Role::Server, Some(id)) => Message::EntryAssignment {
                key: event.key.clone(),
                id,
                sequence: event.sequence,
                flags: event.flags,
                value,
            },
            (Role::Client, _) => Message::EntryAssignment {
                key: event.key.clone(),
                id: UNASSIGNED_ID,
                sequence: event.sequence,
                flags: event.flags,
                value,
            },
            (Role::Server, None) => {
                warn!(key = %event.key, "entry has no id, not propagated");
                return None;
            }
        };

        if self.role == Role::Client {
            if let Some(id) = known {
                self.ids.set_type(id, ty);
            }
            self.unacked.push((event.key.clone(), event.sequence));
        }
        Some(message)
    }

    fn on_client_hello(&mut self, message: Message) -> SyncResult<Vec<Message>> {
        let (requested, identity) = match message {
            Message::ClientHello { revision, identity } => (revision, identity),
            other => return Err(self.unexpected(&other)),
        };

        let Some(negotiated) =
            ProtocolRevision::from_u16(requested).filter(|r| *r <= self.revision)
        else {
            warn!(
                connection = %self.connection,
                requested = format_args!("0x{requested:04x}"),
                "unsupported protocol revision"
            );
            self.state = SessionState::Disconnected;
            return Ok(vec![Message::ProtoUnsupported {
                revision: self.revision.as_u16(),
            }]);
        };
        self.set_revision(negotiated);

        let mut out = Vec::new();
        if self.caps.has_hello_handshake {
            self.peer_identity = Some(identity);
            out.push(Message::ServerHello {
                flags: 0,
                identity: self.identity.clone(),
            });
        }
        for entry in self.store.snapshot() {
            let Some(id) = entry.id else { continue };
            if !self.can_carry(&entry.value) {
                continue;
            }
            out.push(Message::EntryAssignment {
                key: entry.key,
                id,
                sequence: entry.sequence,
                flags: entry.flags,
                value: entry.value,
            });
        }
        out.push(Message::ServerHelloComplete);

        self.state = if self.caps.has_hello_handshake {
            SessionState::Synchronizing
        } else {
            SessionState::Active
        };
        debug!(
            connection = %self.connection,
            revision = %self.revision,
            entries = out.len(),
            "sent initial assignments"
        );
        Ok(out)
    }

    fn on_server_hello(&mut self, message: Message) -> SyncResult<Vec<Message>> {
        match message {
            Message::ProtoUnsupported { revision } => {
                self.state = SessionState::Disconnected;
                Err(SyncError::HandshakeRejected {
                    server_revision: revision,
                })
            }
            Message::ServerHello { identity, .. } => {
                self.peer_identity = Some(identity);
                self.state = SessionState::Synchronizing;
                Ok(Vec::new())
            }
            // Revision 2.0 servers go straight to the assignments.
            Message::EntryAssignment { .. } | Message::ServerHelloComplete => {
                self.state = SessionState::Synchronizing;
                self.on_entry_message(message)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_entry_message(&mut self, message: Message) -> SyncResult<Vec<Message>> {
        match message {
            Message::EntryAssignment {
                key,
                id,
                sequence,
                flags,
                value,
            } => Ok(self.on_assignment(key, id, sequence, flags, value)),
            Message::EntryUpdate {
                id,
                sequence,
                value,
            } => {
                let Some(key) = self.known_key(id, "update") else {
                    return Ok(Vec::new());
                };
                if self.role == Role::Client {
                    self.ids.set_type(id, value.entry_type());
                }
                self.store.apply_remote(
                    RemoteEntry::new(key, value, sequence),
                    ApplyPolicy::Steady,
                    self.connection,
                );
                Ok(Vec::new())
            }
            Message::FlagsUpdate { id, flags } => {
                let Some(key) = self.known_key(id, "flags update") else {
                    return Ok(Vec::new());
                };
                self.store.set_flags_remote(&key, flags, self.connection);
                Ok(Vec::new())
            }
            Message::EntryDelete { id } => {
                let Some(key) = self.known_key(id, "delete") else {
                    return Ok(Vec::new());
                };
                self.store.delete_remote(&key, self.connection);
                if self.role == Role::Client {
                    self.ids.remove_key(&key);
                }
                Ok(Vec::new())
            }
            Message::ClearAll => {
                self.store.clear_remote(self.connection);
                if self.role == Role::Client {
                    let store = &self.store;
                    self.ids.retain(|key| store.contains_key(key));
                }
                Ok(Vec::new())
            }
            Message::ServerHelloComplete
                if self.role == Role::Client && self.state == SessionState::Synchronizing =>
            {
                Ok(self.finish_client_sync())
            }
            Message::ClientHelloComplete
                if self.role == Role::Server && self.state == SessionState::Synchronizing =>
            {
                self.state = SessionState::Active;
                Ok(Vec::new())
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_assignment(
        &mut self,
        key: String,
        id: u16,
        sequence: SequenceNumber,
        flags: EntryFlags,
        value: EntryValue,
    ) -> Vec<Message> {
        let remote = RemoteEntry {
            key,
            value,
            sequence,
            flags: self.caps.supports_flags.then_some(flags),
        };

        if self.role == Role::Server {
            self.store
                .apply_remote(remote, ApplyPolicy::Steady, self.connection);
            return Vec::new();
        }

        let policy = if self.state == SessionState::Synchronizing {
            ApplyPolicy::InitialSync
        } else {
            ApplyPolicy::Steady
        };
        let key = remote.key.clone();
        let outcome = self.store.apply_remote(remote, policy, self.connection);
        let local = self.store.entry(&key);

        if id == UNASSIGNED_ID {
            return Vec::new();
        }
        let ty = match &local {
            Some(entry) => entry.entry_type(),
            None => return Vec::new(),
        };
        self.ids.insert(id, &key, ty);

        // Flags set before the id was known could not be sent; the echo of
        // our own assignment is the first chance.
        match local {
            Some(entry)
                if outcome == ApplyOutcome::Stale
                    && self.caps.supports_flags
                    && self.state.is_active()
                    && entry.sequence == sequence
                    && entry.flags != flags =>
            {
                vec![Message::FlagsUpdate {
                    id,
                    flags: entry.flags,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn finish_client_sync(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        for entry in self.store.pending() {
            if !self.can_carry(&entry.value) {
                continue;
            }
            self.unacked.push((entry.key.clone(), entry.sequence));
            out.push(Message::EntryAssignment {
                key: entry.key,
                id: UNASSIGNED_ID,
                sequence: entry.sequence,
                flags: entry.flags,
                value: entry.value,
            });
        }
        debug!(
            connection = %self.connection,
            replayed = out.len(),
            "initial sync complete"
        );
        if self.caps.has_hello_handshake {
            out.push(Message::ClientHelloComplete);
        }
        self.state = SessionState::Active;
        out
    }

    fn set_revision(&mut self, revision: ProtocolRevision) {
        self.revision = revision;
        self.caps = Capabilities::for_revision(revision);
    }

    fn can_carry(&self, value: &EntryValue) -> bool {
        self.caps.supports_raw || value.entry_type() != EntryType::Raw
    }

    fn id_for(&self, event: &ChangeEvent) -> Option<u16> {
        match self.role {
            Role::Server => event.id,
            Role::Client => self.ids.id(&event.key),
        }
    }

    /// Resolves `id` to its key, or logs and returns `None`.
    ///
    /// An id can go stale while a message is in flight, e.g. after a local
    /// delete; such messages are dropped. Revision 2.0 updates for unknown
    /// ids already fail while decoding.
    fn known_key(&self, id: u16, what: &'static str) -> Option<String> {
        let key = match self.role {
            Role::Server => self.store.key_for_id(id),
            Role::Client => self.ids.key(id).map(str::to_string),
        };
        if key.is_none() {
            debug!(connection = %self.connection, id, "{what} for unknown id ignored");
        }
        key
    }

    fn unexpected(&self, message: &Message) -> SyncError {
        SyncError::UnexpectedMessage {
            state: self.state,
            message: message.name(),
        }
    }
}

impl EntryTypes for Session {
    fn entry_type(&self, id: u16) -> Option<EntryType> {
        match self.role {
            Role::Server => self.store.entry_type_for_id(id),
            Role::Client => self.ids.entry_type(id),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("connection", &self.connection)
            .field("revision", &self.revision)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
