//! Watch command.

use super::get::absolute;
use super::{connect, kind_name, CommandResult, ConnectArgs, EntryOutput, OutputFormat};

/// Prints the current entries under `prefix`, then every change.
pub fn run(args: &ConnectArgs, prefix: &str, format: OutputFormat) -> CommandResult {
    let nt = connect(args)?;
    let prefix = absolute(prefix);
    let events = nt.subscribe(Some(&prefix));

    for entry in nt.store().snapshot() {
        if entry.key.starts_with(&prefix) {
            EntryOutput {
                key: &entry.key,
                kind: None,
                value: Some(&entry.value),
            }
            .print(format)?;
        }
    }

    for event in events {
        EntryOutput {
            key: &event.key,
            kind: Some(kind_name(event.kind)),
            value: event.value.as_ref(),
        }
        .print(format)?;
    }
    Ok(())
}
