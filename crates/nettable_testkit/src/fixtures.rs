//! Live server and client fixtures.
//!
//! Every fixture binds an ephemeral loopback port and uses short timers, so
//! tests run in parallel and settle quickly.

use crate::integration::{wait_until, DEFAULT_WAIT};
use nettable::{NetworkTables, ProtocolRevision, RetryConfig, ServerConfig, SyncConfig, Table};
use std::net::SocketAddr;
use std::time::Duration;

/// Returns a server configuration bound to an ephemeral loopback port.
pub fn local_server_config(max_revision: ProtocolRevision) -> ServerConfig {
    ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_identity("testkit-server")
        .with_max_revision(max_revision)
        .with_keep_alive_interval(Duration::from_millis(100))
        .with_idle_timeout(Duration::from_secs(1))
}

/// Returns a client configuration with fast reconnects.
pub fn fast_client_config(addr: SocketAddr, revision: ProtocolRevision) -> SyncConfig {
    SyncConfig::new(addr.to_string())
        .with_identity("testkit-client")
        .with_revision(revision)
        .with_keep_alive_interval(Duration::from_millis(100))
        .with_idle_timeout(Duration::from_secs(1))
        .with_connect_timeout(Duration::from_millis(500))
        .with_retry(RetryConfig::fixed(Duration::from_millis(20)))
}

/// A started server and one client connected to it.
pub struct LivePair {
    /// The server instance.
    pub server: NetworkTables,
    /// The client instance.
    pub client: NetworkTables,
    /// The address the server listens on.
    pub addr: SocketAddr,
}

impl LivePair {
    /// Starts a server accepting up to `server_max` and a client requesting
    /// `client_revision`, and waits until they are connected.
    ///
    /// # Panics
    ///
    /// Panics if the pair does not connect within [`DEFAULT_WAIT`].
    pub fn start(server_max: ProtocolRevision, client_revision: ProtocolRevision) -> Self {
        let server = NetworkTables::server(local_server_config(server_max))
            .expect("Failed to create server");
        server.start().expect("Failed to start server");
        let addr = server.local_addr().expect("Server has no address");

        let client = NetworkTables::client(fast_client_config(addr, client_revision))
            .expect("Failed to create client");
        client.start().expect("Failed to start client");

        let pair = Self {
            server,
            client,
            addr,
        };
        pair.wait_connected();
        pair
    }

    /// Both endpoints on revision 3.0.
    pub fn nt3() -> Self {
        Self::start(ProtocolRevision::Nt3, ProtocolRevision::Nt3)
    }

    /// Both endpoints on revision 2.0.
    pub fn nt2() -> Self {
        Self::start(ProtocolRevision::Nt2, ProtocolRevision::Nt2)
    }

    /// Returns a table view on the server.
    pub fn server_table(&self, name: &str) -> Table {
        self.server.get_table(name)
    }

    /// Returns a table view on the client.
    pub fn client_table(&self, name: &str) -> Table {
        self.client.get_table(name)
    }

    /// Waits until both sides report an active connection.
    ///
    /// # Panics
    ///
    /// Panics on timeout.
    pub fn wait_connected(&self) {
        assert!(
            wait_until(DEFAULT_WAIT, || self.client.is_connected()
                && self.server.is_connected()),
            "client did not connect to {}",
            self.addr
        );
    }

    /// Waits until the client reports no active connection.
    ///
    /// # Panics
    ///
    /// Panics on timeout.
    pub fn wait_disconnected(&self) {
        assert!(
            wait_until(DEFAULT_WAIT, || !self.client.is_connected()),
            "client still connected"
        );
    }
}
