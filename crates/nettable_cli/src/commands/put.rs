//! Put and delete commands.

use super::get::absolute;
use super::{connect, CommandResult, ConnectArgs};
use clap::ValueEnum;
use nettable::EntryValue;
use std::time::{Duration, Instant};

/// Value type selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueType {
    /// `true` or `false`.
    Boolean,
    /// A number.
    Number,
    /// A string, taken verbatim.
    String,
    /// Hex-encoded bytes.
    Raw,
    /// Comma-separated booleans.
    BooleanArray,
    /// Comma-separated numbers.
    NumberArray,
    /// Comma-separated strings.
    StringArray,
}

/// Parses `text` as a value of type `ty`.
pub fn parse_value(ty: ValueType, text: &str) -> Result<EntryValue, String> {
    let items = || text.split(',').map(str::trim).filter(|s| !s.is_empty());
    Ok(match ty {
        ValueType::Boolean => EntryValue::Boolean(parse_bool(text)?),
        ValueType::Number => EntryValue::Number(parse_number(text)?),
        ValueType::String => EntryValue::String(text.to_string()),
        ValueType::Raw => EntryValue::Raw(parse_hex(text)?),
        ValueType::BooleanArray => {
            EntryValue::BooleanArray(items().map(parse_bool).collect::<Result<_, _>>()?)
        }
        ValueType::NumberArray => {
            EntryValue::NumberArray(items().map(parse_number).collect::<Result<_, _>>()?)
        }
        ValueType::StringArray => {
            EntryValue::StringArray(items().map(str::to_string).collect())
        }
    })
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("not a boolean: {other}")),
    }
}

fn parse_number(text: &str) -> Result<f64, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("not a number: {text}"))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err("hex input must have an even length".to_string());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {i}"))
        })
        .collect()
}

/// Writes one key and waits until the write went out.
pub fn run_put(args: &ConnectArgs, key: &str, value: EntryValue, persistent: bool) -> CommandResult {
    let nt = connect(args)?;
    let key = absolute(key);
    let store = nt.store();
    store.put(&key, value);
    if persistent {
        store.set_flags(&key, nettable::EntryFlags::PERSISTENT);
    }
    wait_flushed(&nt, Duration::from_secs(args.timeout))?;
    // Flags travel separately once the server numbered the entry.
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

/// Deletes one key.
pub fn run_delete(args: &ConnectArgs, key: &str) -> CommandResult {
    let nt = connect(args)?;
    let key = absolute(key);
    if !nt.store().delete(&key) {
        return Err(format!("no such key: {key}").into());
    }
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

fn wait_flushed(nt: &nettable::NetworkTables, timeout: Duration) -> CommandResult {
    let deadline = Instant::now() + timeout;
    while !nt.store().pending().is_empty() {
        if Instant::now() >= deadline {
            return Err("write was not sent before the timeout".into());
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
