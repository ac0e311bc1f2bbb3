//! Server configuration.

use nettable_codec::ProtocolRevision;
use nettable_sync_engine::{ConnectionTiming, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the table server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Identity announced in the 3.0 hello.
    pub identity: String,
    /// Newest revision accepted; older clients are served at their own.
    pub max_revision: ProtocolRevision,
    /// Keep-alive and idle timers of every connection.
    pub timing: ConnectionTiming,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            identity: String::new(),
            max_revision: ProtocolRevision::Nt3,
            timing: ConnectionTiming::default(),
        }
    }

    /// Sets the server identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Sets the newest accepted revision.
    pub fn with_max_revision(mut self, revision: ProtocolRevision) -> Self {
        self.max_revision = revision;
        self
    }

    /// Sets the keep-alive interval.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.timing.keep_alive_interval = interval;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.timing.idle_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 1735);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.max_revision, ProtocolRevision::Nt3);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_identity("field")
            .with_max_revision(ProtocolRevision::Nt2)
            .with_idle_timeout(Duration::from_secs(1));

        assert_eq!(config.identity, "field");
        assert_eq!(config.max_revision, ProtocolRevision::Nt2);
        assert_eq!(config.timing.idle_timeout, Duration::from_secs(1));
    }
}
