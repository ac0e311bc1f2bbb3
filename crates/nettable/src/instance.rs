//! The process-wide table instance.

use crate::error::Result;
use nettable_core::{ChangeEvent, EntryStore, StoreMode, Table};
use nettable_sync_engine::{
    ClientManager, ConnectionEvent, ConnectionInfo, ConnectionRegistry, SyncConfig,
};
use nettable_sync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

enum Role {
    Server(SyncServer),
    Client(ClientManager),
}

/// One participant in a replicated table, either the server or a client.
///
/// The instance owns the entry store and a multi-threaded tokio runtime
/// for networking, so its API is synchronous. Writes through a [`Table`]
/// succeed locally and propagate in the background.
///
/// Must not be dropped from within an async context.
///
/// # Example
///
/// ```no_run
/// use nettable::{NetworkTables, ServerConfig, SyncConfig};
///
/// # fn main() -> nettable::Result<()> {
/// let server = NetworkTables::server(ServerConfig::default())?;
/// server.start()?;
///
/// let client = NetworkTables::client(SyncConfig::new("127.0.0.1:1735"))?;
/// client.start()?;
/// client.get_table("t1").put_number("speed", 2.5);
/// # Ok(())
/// # }
/// ```
pub struct NetworkTables {
    runtime: Runtime,
    store: Arc<EntryStore>,
    registry: Arc<ConnectionRegistry>,
    role: Role,
}

impl NetworkTables {
    /// Creates a stopped server instance.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot be created.
    pub fn server(config: ServerConfig) -> Result<Self> {
        let (store, registry) = wire_store(StoreMode::Server);
        let server = SyncServer::new(config, store.clone(), registry.clone());
        Ok(Self {
            runtime: build_runtime()?,
            store,
            registry,
            role: Role::Server(server),
        })
    }

    /// Creates a stopped client instance.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot be created.
    pub fn client(config: SyncConfig) -> Result<Self> {
        let (store, registry) = wire_store(StoreMode::Client);
        let client = ClientManager::new(config, store.clone(), registry.clone());
        Ok(Self {
            runtime: build_runtime()?,
            store,
            registry,
            role: Role::Client(client),
        })
    }

    /// Starts networking. Does nothing if already started.
    ///
    /// A client returns immediately and connects in the background.
    ///
    /// # Errors
    ///
    /// Fails if a server cannot bind its address.
    pub fn start(&self) -> Result<()> {
        match &self.role {
            Role::Server(server) => {
                if !server.is_running() {
                    self.runtime.block_on(server.start())?;
                }
            }
            Role::Client(client) => {
                let _guard = self.runtime.enter();
                if client.start() {
                    info!(addr = %client.config().server_addr, "client started");
                }
            }
        }
        Ok(())
    }

    /// Stops networking and drops every entry. Idempotent.
    ///
    /// The instance returns to its freshly created state; subscriptions
    /// stay registered and [`start`](Self::start) may be called again.
    pub fn shutdown(&self) {
        self.stop_networking();
        self.store.reset();
    }

    /// Restarts networking with the same configuration, keeping entries.
    ///
    /// # Errors
    ///
    /// Fails if a server cannot bind its address.
    pub fn restart(&self) -> Result<()> {
        self.stop_networking();
        self.start()
    }

    /// Returns a view of the table at `name`.
    pub fn get_table(&self, name: &str) -> Table {
        Table::new(self.store.clone(), name)
    }

    /// Returns true for a server instance.
    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server(_))
    }

    /// Returns true if at least one connection is active.
    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    /// Returns a snapshot of the current connections.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.connections()
    }

    /// Deletes every entry that is not persistent.
    ///
    /// Returns the number of entries deleted.
    pub fn delete_all_entries(&self) -> usize {
        self.store.clear()
    }

    /// Subscribes to changes of keys starting with `prefix`, or of all keys.
    pub fn subscribe(&self, prefix: Option<&str>) -> Receiver<ChangeEvent> {
        self.store.subscribe(prefix)
    }

    /// Subscribes to connections becoming active and closing.
    pub fn subscribe_connections(&self) -> Receiver<ConnectionEvent> {
        self.registry.subscribe_connections()
    }

    /// Returns the listening address of a running server.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.role {
            Role::Server(server) => server.local_addr(),
            Role::Client(_) => None,
        }
    }

    /// Returns the entry store.
    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    fn stop_networking(&self) {
        match &self.role {
            Role::Server(server) => self.runtime.block_on(server.shutdown()),
            Role::Client(client) => self.runtime.block_on(client.shutdown()),
        }
    }
}

impl Drop for NetworkTables {
    fn drop(&mut self) {
        self.stop_networking();
    }
}

impl std::fmt::Debug for NetworkTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkTables")
            .field("server", &self.is_server())
            .field("connected", &self.is_connected())
            .field("entries", &self.store.len())
            .finish()
    }
}

fn wire_store(mode: StoreMode) -> (Arc<EntryStore>, Arc<ConnectionRegistry>) {
    let store = Arc::new(EntryStore::new(mode));
    let registry = Arc::new(ConnectionRegistry::new());
    store.add_sink(None, registry.clone());
    (store, registry)
}

fn build_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("nettable-net")
        .enable_all()
        .build()
}
