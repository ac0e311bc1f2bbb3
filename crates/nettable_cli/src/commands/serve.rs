//! Serve command.

use super::{kind_name, CommandResult, EntryOutput, OutputFormat, RevisionArg};
use nettable::{NetworkTables, ServerConfig};
use std::net::SocketAddr;
use tracing::info;

/// Runs a server until Ctrl-C, optionally printing every change.
pub fn run(
    bind: SocketAddr,
    identity: &str,
    max_revision: RevisionArg,
    watch: bool,
    format: OutputFormat,
) -> CommandResult {
    let config = ServerConfig::new(bind)
        .with_identity(identity)
        .with_max_revision(max_revision.into());
    let nt = NetworkTables::server(config)?;

    if watch {
        let events = nt.subscribe(None);
        std::thread::spawn(move || {
            for event in events {
                let out = EntryOutput {
                    key: &event.key,
                    kind: Some(kind_name(event.kind)),
                    value: event.value.as_ref(),
                };
                if out.print(format).is_err() {
                    break;
                }
            }
        });
    }

    let connections = nt.subscribe_connections();
    std::thread::spawn(move || {
        for event in connections {
            let state = if event.connected { "connected" } else { "disconnected" };
            info!(peer = %event.peer, connection = %event.connection_id, "client {state}");
        }
    });

    nt.start()?;
    if let Some(addr) = nt.local_addr() {
        info!(addr = %addr, "serving, press Ctrl-C to stop");
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())?;

    info!("shutting down");
    nt.shutdown();
    Ok(())
}
