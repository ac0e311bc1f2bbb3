//! The per-connection worker task.

use crate::config::ConnectionTiming;
use crate::error::{SyncError, SyncResult};
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use crate::state::SessionState;
use bytes::BytesMut;
use nettable_sync_protocol::{FrameDecoder, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// How a connection ended.
#[derive(Debug)]
pub struct ConnectionEnd {
    /// Whether the session reached `Active`.
    pub was_active: bool,
    /// `Ok` for an orderly close (server side rejection), else the cause.
    pub result: SyncResult<()>,
}

/// Drives `session` over `stream` until the connection ends.
///
/// The worker registers with `registry` for outbound changes, performs the
/// handshake, and then multiplexes socket reads, queued store changes and
/// the keep-alive timer. It stops when `shutdown` flips to `true`.
pub async fn run_connection<S>(
    stream: S,
    mut session: Session,
    registry: Arc<ConnectionRegistry>,
    peer: SocketAddr,
    timing: ConnectionTiming,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = session.connection_id();
    let mut outbound = registry.register(id, peer);
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = FrameDecoder::new(session.revision());
    let mut was_active = false;

    let result: SyncResult<()> = async {
        if *shutdown.borrow() {
            return Err(SyncError::Cancelled);
        }
        let hello = session.start();
        write_messages(&mut writer, &mut session, hello).await?;

        let mut last_rx = Instant::now();
        let mut last_tx = Instant::now();
        let tick = (timing.keep_alive_interval / 4).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Err(SyncError::Cancelled),

                read = reader.read_buf(decoder.buffer_mut()) => {
                    if read? == 0 {
                        return Err(SyncError::ConnectionLost);
                    }
                    last_rx = Instant::now();
                    loop {
                        decoder.set_revision(session.revision());
                        let Some(message) = decoder.next_message(&session)? else {
                            break;
                        };
                        trace!(connection = %id, message = message.name(), "received");
                        let replies = session.handle(message)?;
                        if write_messages(&mut writer, &mut session, replies).await? {
                            last_tx = Instant::now();
                        }
                        if session.state() == SessionState::Disconnected {
                            // Handshake refused; the reply is already out.
                            let _ = writer.shutdown().await;
                            return Ok(());
                        }
                        if !was_active && session.state().is_active() {
                            was_active = true;
                            registry.mark_active(
                                id,
                                session.revision(),
                                session.peer_identity().unwrap_or_default(),
                            );
                            info!(
                                connection = %id,
                                peer = %peer,
                                revision = %session.revision(),
                                "connection active"
                            );
                        }
                    }
                }

                Some(event) = outbound.recv(), if session.state().is_active() => {
                    let mut batch: Vec<Message> = session.outgoing_for(&event).into_iter().collect();
                    while let Ok(event) = outbound.try_recv() {
                        batch.extend(session.outgoing_for(&event));
                    }
                    if write_messages(&mut writer, &mut session, batch).await? {
                        last_tx = Instant::now();
                    }
                }

                _ = ticker.tick() => {
                    if last_rx.elapsed() >= timing.idle_timeout {
                        warn!(connection = %id, peer = %peer, "peer idle, closing");
                        return Err(SyncError::ConnectionLost);
                    }
                    if last_tx.elapsed() >= timing.keep_alive_interval {
                        write_messages(&mut writer, &mut session, vec![Message::KeepAlive]).await?;
                        last_tx = Instant::now();
                    }
                }
            }
        }
    }
    .await;

    registry.unregister(id);
    session.close();
    match &result {
        Ok(()) => debug!(connection = %id, peer = %peer, "connection closed"),
        Err(SyncError::Cancelled) => debug!(connection = %id, "connection cancelled"),
        Err(e) if was_active => info!(connection = %id, peer = %peer, error = %e, "connection lost"),
        Err(e) => debug!(connection = %id, peer = %peer, error = %e, "connection failed"),
    }
    ConnectionEnd { was_active, result }
}

/// Encodes and writes `messages`. Returns false if there was nothing to write.
async fn write_messages<W>(
    writer: &mut W,
    session: &mut Session,
    messages: Vec<Message>,
) -> SyncResult<bool>
where
    W: AsyncWrite + Unpin,
{
    if messages.is_empty() {
        return Ok(false);
    }
    let mut buf = BytesMut::new();
    for message in &messages {
        match message.encode(session.revision()) {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => {
                let key = session.unsent(message);
                warn!(
                    connection = %session.connection_id(),
                    message = message.name(),
                    key = key.as_deref().unwrap_or("-"),
                    error = %e,
                    "dropping message"
                );
            }
        }
    }
    writer.write_all(&buf).await?;
    writer.flush().await?;
    session.flushed();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nettable_codec::{EntryType, EntryValue, ProtocolRevision};
    use nettable_core::{ConnectionId, EntryStore, StoreMode};
    use std::collections::HashMap;
    use tokio::io::DuplexStream;

    fn peer() -> SocketAddr {
        "127.0.0.1:1735".parse().unwrap()
    }

    fn fast_timing() -> ConnectionTiming {
        ConnectionTiming {
            keep_alive_interval: Duration::from_millis(50),
            idle_timeout: Duration::from_millis(400),
        }
    }

    /// Reads the next message other than a keep-alive.
    async fn read_message(stream: &mut DuplexStream, decoder: &mut FrameDecoder) -> Message {
        let types: HashMap<u16, EntryType> = HashMap::new();
        loop {
            match decoder.next_message(&types).unwrap() {
                Some(Message::KeepAlive) => continue,
                Some(message) => return message,
                None => {}
            }
            let n = stream.read_buf(decoder.buffer_mut()).await.unwrap();
            assert!(n > 0, "stream closed");
        }
    }

    #[tokio::test]
    async fn server_worker_performs_handshake() {
        let store = Arc::new(EntryStore::new(StoreMode::Server));
        store.put("/t1/a", EntryValue::Number(4.0));
        let registry = Arc::new(ConnectionRegistry::new());
        let (_stop, shutdown) = watch::channel(false);
        let (server_io, mut client_io) = tokio::io::duplex(4096);

        let id = registry.next_connection_id();
        let session = Session::server(store.clone(), id, ProtocolRevision::Nt3, "srv");
        let worker = tokio::spawn(run_connection(
            server_io,
            session,
            registry.clone(),
            peer(),
            fast_timing(),
            shutdown,
        ));

        let hello = Message::client_hello(ProtocolRevision::Nt3, "test");
        client_io
            .write_all(&hello.encode(ProtocolRevision::Nt3).unwrap())
            .await
            .unwrap();

        let mut decoder = FrameDecoder::new(ProtocolRevision::Nt3);
        assert!(matches!(
            read_message(&mut client_io, &mut decoder).await,
            Message::ServerHello { .. }
        ));
        assert!(matches!(
            read_message(&mut client_io, &mut decoder).await,
            Message::EntryAssignment { id: 0, .. }
        ));
        assert_eq!(
            read_message(&mut client_io, &mut decoder).await,
            Message::ServerHelloComplete
        );

        client_io
            .write_all(&Message::ClientHelloComplete.encode(ProtocolRevision::Nt3).unwrap())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !registry.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Local writes now flow to the connection.
        store.put("/t1/b", EntryValue::Boolean(true));
        match read_message(&mut client_io, &mut decoder).await {
            Message::EntryAssignment { key, .. } => assert_eq!(key, "/t1/b"),
            other => panic!("unexpected {other:?}"),
        }

        drop(client_io);
        let end = worker.await.unwrap();
        assert!(end.was_active);
        assert!(matches!(end.result, Err(SyncError::ConnectionLost)));
        assert!(registry.connections().is_empty());
    }

    #[tokio::test]
    async fn rejected_revision_closes_cleanly() {
        let store = Arc::new(EntryStore::new(StoreMode::Server));
        let registry = Arc::new(ConnectionRegistry::new());
        let (_stop, shutdown) = watch::channel(false);
        let (server_io, mut client_io) = tokio::io::duplex(4096);

        let session = Session::server(store, ConnectionId::new(9), ProtocolRevision::Nt2, "srv");
        let worker = tokio::spawn(run_connection(
            server_io,
            session,
            registry,
            peer(),
            fast_timing(),
            shutdown,
        ));

        let hello = Message::client_hello(ProtocolRevision::Nt3, "test");
        client_io
            .write_all(&hello.encode(ProtocolRevision::Nt3).unwrap())
            .await
            .unwrap();
        let mut decoder = FrameDecoder::new(ProtocolRevision::Nt3);
        assert_eq!(
            read_message(&mut client_io, &mut decoder).await,
            Message::ProtoUnsupported { revision: 0x0200 }
        );

        let end = worker.await.unwrap();
        assert!(!end.was_active);
        assert!(end.result.is_ok());
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let store = Arc::new(EntryStore::new(StoreMode::Server));
        let registry = Arc::new(ConnectionRegistry::new());
        let (_stop, shutdown) = watch::channel(false);
        let (server_io, _client_io) = tokio::io::duplex(4096);

        let session = Session::server(store, ConnectionId::new(3), ProtocolRevision::Nt3, "srv");
        let end = tokio::time::timeout(
            Duration::from_secs(2),
            run_connection(server_io, session, registry, peer(), fast_timing(), shutdown),
        )
        .await
        .unwrap();
        assert!(matches!(end.result, Err(SyncError::ConnectionLost)));
    }

    #[tokio::test]
    async fn shutdown_cancels_worker() {
        let store = Arc::new(EntryStore::new(StoreMode::Client));
        let registry = Arc::new(ConnectionRegistry::new());
        let (stop, shutdown) = watch::channel(false);
        let (client_side, _server_side) = tokio::io::duplex(4096);

        let session = Session::client(store, ConnectionId::new(4), ProtocolRevision::Nt3, "c");
        let worker = tokio::spawn(run_connection(
            client_side,
            session,
            registry,
            peer(),
            ConnectionTiming::default(),
            shutdown,
        ));
        stop.send(true).unwrap();
        let end = worker.await.unwrap();
        assert!(matches!(end.result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn client_and_server_workers_sync() {
        let server_store = Arc::new(EntryStore::new(StoreMode::Server));
        let client_store = Arc::new(EntryStore::new(StoreMode::Client));
        let server_registry = Arc::new(ConnectionRegistry::new());
        let client_registry = Arc::new(ConnectionRegistry::new());
        server_store.add_sink(None, server_registry.clone());
        client_store.add_sink(None, client_registry.clone());
        let (stop, shutdown) = watch::channel(false);
        let (a, b) = tokio::io::duplex(4096);

        server_store.put("/from/server", "hello".into());
        client_store.put("/from/client", 7.0.into());

        let server = Session::server(
            server_store.clone(),
            server_registry.next_connection_id(),
            ProtocolRevision::Nt3,
            "srv",
        );
        let client = Session::client(
            client_store.clone(),
            client_registry.next_connection_id(),
            ProtocolRevision::Nt3,
            "cli",
        );
        let s = tokio::spawn(run_connection(
            a,
            server,
            server_registry.clone(),
            peer(),
            fast_timing(),
            shutdown.clone(),
        ));
        let c = tokio::spawn(run_connection(
            b,
            client,
            client_registry.clone(),
            peer(),
            fast_timing(),
            shutdown,
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while server_store.get("/from/client").is_none()
                || client_store.get("/from/server").is_none()
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(client_store.pending().is_empty());

        client_store.put("/from/client", 8.0.into());
        tokio::time::timeout(Duration::from_secs(2), async {
            while server_store.get("/from/client") != Some(8.0.into()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Unencodable writes are dropped but stay pending; the link survives.
        client_store.put("/too/long", EntryValue::BooleanArray(vec![true; 300]));
        client_store.put(
            "/too/big",
            EntryValue::Raw(vec![0; nettable_codec::MAX_PAYLOAD_LEN + 1]),
        );
        client_store.put("/marker", true.into());
        tokio::time::timeout(Duration::from_secs(2), async {
            while server_store.get("/marker").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(server_store.get("/too/long").is_none());
        assert!(server_store.get("/too/big").is_none());
        let pending: Vec<String> = client_store.pending().into_iter().map(|e| e.key).collect();
        assert_eq!(pending, vec!["/too/big".to_string(), "/too/long".to_string()]);
        assert!(client_registry.is_connected());

        stop.send(true).unwrap();
        assert!(s.await.unwrap().was_active);
        assert!(c.await.unwrap().was_active);
    }
}
