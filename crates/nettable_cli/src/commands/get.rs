//! Get and keys commands.

use super::{connect, CommandResult, ConnectArgs, EntryOutput, OutputFormat};

/// Prints the value of one key.
pub fn run_get(args: &ConnectArgs, key: &str, format: OutputFormat) -> CommandResult {
    let nt = connect(args)?;
    let key = absolute(key);
    let value = nt
        .store()
        .get(&key)
        .ok_or_else(|| format!("no such key: {key}"))?;
    EntryOutput {
        key: &key,
        kind: None,
        value: Some(&value),
    }
    .print(format)
}

/// Lists keys under `prefix`, with values if `values` is set.
pub fn run_keys(
    args: &ConnectArgs,
    prefix: &str,
    values: bool,
    format: OutputFormat,
) -> CommandResult {
    let nt = connect(args)?;
    let store = nt.store();
    for key in store.keys_with_prefix(prefix) {
        let value = if values { store.get(&key) } else { None };
        EntryOutput {
            key: &key,
            kind: None,
            value: value.as_ref(),
        }
        .print(format)?;
    }
    Ok(())
}

/// Returns `key` with a leading separator.
pub fn absolute(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_made_absolute() {
        assert_eq!(absolute("t1/x"), "/t1/x");
        assert_eq!(absolute("/t1/x"), "/t1/x");
    }
}
