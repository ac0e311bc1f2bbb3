//! CLI command implementations.

pub mod get;
pub mod put;
pub mod serve;
pub mod watch;

use clap::{Args, ValueEnum};
use nettable::{ChangeKind, EntryValue, NetworkTables, ProtocolRevision, SyncConfig, DEFAULT_PORT};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Result type of every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable.
    Text,
    /// One JSON document per line.
    Json,
}

/// Protocol revision selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RevisionArg {
    /// Revision 2.0.
    #[value(name = "2")]
    Nt2,
    /// Revision 3.0.
    #[value(name = "3")]
    Nt3,
}

impl From<RevisionArg> for ProtocolRevision {
    fn from(arg: RevisionArg) -> Self {
        match arg {
            RevisionArg::Nt2 => ProtocolRevision::Nt2,
            RevisionArg::Nt3 => ProtocolRevision::Nt3,
        }
    }
}

/// Options shared by the client commands.
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Server address (host:port)
    #[arg(short, long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
    pub server: String,

    /// Protocol revision to request
    #[arg(short, long, value_enum, default_value = "3")]
    pub revision: RevisionArg,

    /// Identity announced to the server
    #[arg(long, default_value = "nettable-cli")]
    pub identity: String,

    /// Seconds to wait for the connection
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

/// Connects a client and waits until its initial sync completed.
pub fn connect(args: &ConnectArgs) -> Result<NetworkTables, Box<dyn std::error::Error>> {
    let config = SyncConfig::new(args.server.clone())
        .with_revision(args.revision.into())
        .with_identity(args.identity.clone());
    let nt = NetworkTables::client(config)?;
    nt.start()?;

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while !nt.is_connected() {
        if Instant::now() >= deadline {
            return Err(format!("cannot connect to {}", args.server).into());
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    Ok(nt)
}

/// One entry in command output.
#[derive(Debug, Serialize)]
pub struct EntryOutput<'a> {
    /// Full key.
    pub key: &'a str,
    /// Change kind, for watch output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// The value, absent for deletes.
    #[serde(flatten)]
    pub value: Option<&'a EntryValue>,
}

impl EntryOutput<'_> {
    /// Prints the entry in `format`.
    pub fn print(&self, format: OutputFormat) -> CommandResult {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(self)?),
            OutputFormat::Text => {
                let kind = self.kind.map(|k| format!("[{k}] ")).unwrap_or_default();
                match self.value {
                    Some(value) => println!("{kind}{} ({}) = {value}", self.key, value.entry_type()),
                    None => println!("{kind}{}", self.key),
                }
            }
        }
        Ok(())
    }
}

/// Returns a lowercase name for a change kind.
pub fn kind_name(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::New => "new",
        ChangeKind::Updated => "updated",
        ChangeKind::FlagsChanged => "flags",
        ChangeKind::Deleted => "deleted",
    }
}
