//! The client connection manager.

use crate::config::SyncConfig;
use crate::connection::run_connection;
use crate::error::{SyncError, SyncResult};
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use nettable_codec::ProtocolRevision;
use nettable_core::EntryStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Keeps a client connected to its server.
///
/// The manager loops `connect → run session → teardown` until shut down.
/// Every new connection starts a fresh [`Session`], so ids learned on a
/// previous connection are never reused.
pub struct ClientManager {
    config: SyncConfig,
    store: Arc<EntryStore>,
    registry: Arc<ConnectionRegistry>,
    running: Mutex<Option<Running>>,
}

impl ClientManager {
    /// Creates a stopped manager.
    pub fn new(config: SyncConfig, store: Arc<EntryStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            config,
            store,
            registry,
            running: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Spawns the connection loop on the current tokio runtime.
    ///
    /// Returns false if the loop was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_client(
            self.config.clone(),
            self.store.clone(),
            self.registry.clone(),
            rx,
        ));
        *running = Some(Running { shutdown: tx, task });
        true
    }

    /// Stops the loop and waits for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            warn!(error = %e, "client task failed");
        }
    }

    /// Returns true while the loop runs.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Returns true while the connection is active.
    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("server_addr", &self.config.server_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn connect(config: &SyncConfig) -> SyncResult<TcpStream> {
    let stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect(config.server_addr.as_str()),
    )
    .await
    .map_err(|_| SyncError::Timeout)??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn run_client(
    config: SyncConfig,
    store: Arc<EntryStore>,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut revision = config.revision;
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let delay = config.retry.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        attempt = attempt.saturating_add(1);

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            connected = connect(&config) => connected,
        };
        let (stream, peer) = match connected.and_then(|s| {
            let peer = s.peer_addr()?;
            Ok((s, peer))
        }) {
            Ok(pair) => pair,
            Err(e) => {
                debug!(addr = %config.server_addr, attempt, error = %e, "connect failed");
                continue;
            }
        };

        let id = registry.next_connection_id();
        debug!(connection = %id, peer = %peer, revision = %revision, "connected");
        let session = Session::client(store.clone(), id, revision, config.identity.clone());
        let end = run_connection(
            stream,
            session,
            registry.clone(),
            peer,
            config.timing,
            shutdown.clone(),
        )
        .await;

        if end.was_active {
            attempt = 1;
        }
        match end.result {
            Ok(()) => {}
            Err(SyncError::Cancelled) => break,
            Err(SyncError::HandshakeRejected { server_revision }) => {
                match ProtocolRevision::from_u16(server_revision).filter(|r| *r < revision) {
                    Some(lower) => {
                        info!(
                            addr = %config.server_addr,
                            from = %revision,
                            to = %lower,
                            "server requires older revision, downgrading"
                        );
                        revision = lower;
                        attempt = 0;
                    }
                    None => warn!(
                        addr = %config.server_addr,
                        server_revision = format_args!("0x{server_revision:04x}"),
                        "no common protocol revision"
                    ),
                }
            }
            Err(e) if e.is_retryable() => {}
            Err(e) => {
                warn!(error = %e, "client stopping");
                break;
            }
        }
    }
    debug!(addr = %config.server_addr, "client loop stopped");
}
