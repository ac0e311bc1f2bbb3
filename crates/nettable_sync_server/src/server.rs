//! The table server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use nettable_core::EntryStore;
use nettable_sync_engine::{run_connection, ConnectionRegistry, Session};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Accepts clients and serves the entry store to them.
///
/// Each accepted socket gets its own worker task; a worker that fails is
/// discarded without affecting the others.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> nettable_sync_server::ServerResult<()> {
/// use nettable_core::{EntryStore, StoreMode};
/// use nettable_sync_engine::ConnectionRegistry;
/// use nettable_sync_server::{ServerConfig, SyncServer};
/// use std::sync::Arc;
///
/// let store = Arc::new(EntryStore::new(StoreMode::Server));
/// let registry = Arc::new(ConnectionRegistry::new());
/// store.add_sink(None, registry.clone());
///
/// let server = SyncServer::new(ServerConfig::default(), store, registry);
/// let addr = server.start().await?;
/// println!("listening on {addr}");
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<EntryStore>,
    registry: Arc<ConnectionRegistry>,
    running: Mutex<Option<Running>>,
    /// Address actually bound by the first start, reused on restart.
    bound: Mutex<Option<SocketAddr>>,
}

impl SyncServer {
    /// Creates a stopped server.
    ///
    /// The registry must already be a sink of `store`.
    pub fn new(config: ServerConfig, store: Arc<EntryStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            config,
            store,
            registry,
            running: Mutex::new(None),
            bound: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and spawns the accept loop.
    ///
    /// Returns the bound address; binding port 0 picks a free port, which is
    /// kept across restarts.
    ///
    /// # Errors
    ///
    /// Fails if the server is running or the address cannot be bound.
    pub async fn start(&self) -> ServerResult<SocketAddr> {
        if self.running.lock().is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let addr = self.bound.lock().unwrap_or(self.config.bind_addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.config.clone(),
            self.store.clone(),
            self.registry.clone(),
            rx,
        ));
        *running = Some(Running {
            addr: local,
            shutdown: tx,
            task,
        });
        *self.bound.lock() = Some(local);

        info!(addr = %local, max_revision = %self.config.max_revision, "server listening");
        Ok(local)
    }

    /// Closes the listener and every connection, and waits for them. Idempotent.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            warn!(error = %e, "accept loop failed");
        }
        info!(addr = %running.addr, "server stopped");
    }

    /// Returns the listening address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    /// Returns true while the accept loop runs.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Returns true if at least one client is active.
    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("bind_addr", &self.config.bind_addr)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    store: Arc<EntryStore>,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut workers = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    spawn_worker(&mut workers, stream, peer, &config, &store, &registry, &shutdown);
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
            // Reap finished workers so the set does not grow without bound.
            Some(_) = workers.join_next(), if !workers.is_empty() => {}
        }
    }
    drop(listener);
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "connection worker failed");
        }
    }
}

fn spawn_worker(
    workers: &mut JoinSet<()>,
    stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
    store: &Arc<EntryStore>,
    registry: &Arc<ConnectionRegistry>,
    shutdown: &watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "cannot set nodelay");
    }
    let id = registry.next_connection_id();
    debug!(connection = %id, peer = %peer, "accepted");
    let session = Session::server(store.clone(), id, config.max_revision, config.identity.clone());
    let worker = run_connection(
        stream,
        session,
        registry.clone(),
        peer,
        config.timing,
        shutdown.clone(),
    );
    workers.spawn(async move {
        let end = worker.await;
        if let Err(e) = end.result {
            if !end.was_active {
                debug!(connection = %id, peer = %peer, error = %e, "handshake failed");
            }
        }
    });
}
