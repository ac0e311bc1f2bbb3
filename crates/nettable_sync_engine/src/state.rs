//! Connection lifecycle states.

use std::fmt;

/// The state of one protocol session.
///
/// ```text
/// Disconnected → Connecting → AwaitingClientHello (server)
///                           → AwaitingServerHello (client)
///              → Synchronizing → Active → Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Socket is being established.
    Connecting,
    /// Server waits for the client's hello.
    AwaitingClientHello,
    /// Client waits for the server's hello.
    AwaitingServerHello,
    /// Initial entries are being exchanged.
    Synchronizing,
    /// Steady state; changes flow in both directions.
    Active,
}

impl SessionState {
    /// Returns true once the handshake and initial sync are complete.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Returns true while the handshake is in progress.
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::AwaitingClientHello
                | SessionState::AwaitingServerHello
                | SessionState::Synchronizing
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingClientHello => "awaiting client hello",
            SessionState::AwaitingServerHello => "awaiting server hello",
            SessionState::Synchronizing => "synchronizing",
            SessionState::Active => "active",
        })
    }
}
