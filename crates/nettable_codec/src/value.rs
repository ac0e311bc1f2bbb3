//! Dynamically typed entry values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type tag of an entry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// A single boolean.
    Boolean,
    /// A double-precision number.
    Number,
    /// A UTF-8 string.
    String,
    /// Opaque bytes.
    Raw,
    /// Array of booleans.
    BooleanArray,
    /// Array of numbers.
    NumberArray,
    /// Array of strings.
    StringArray,
}

impl EntryType {
    /// Returns the wire type code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            EntryType::Boolean => 0x00,
            EntryType::Number => 0x01,
            EntryType::String => 0x02,
            EntryType::Raw => 0x03,
            EntryType::BooleanArray => 0x10,
            EntryType::NumberArray => 0x11,
            EntryType::StringArray => 0x12,
        }
    }

    /// Parses a wire type code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(EntryType::Boolean),
            0x01 => Some(EntryType::Number),
            0x02 => Some(EntryType::String),
            0x03 => Some(EntryType::Raw),
            0x10 => Some(EntryType::BooleanArray),
            0x11 => Some(EntryType::NumberArray),
            0x12 => Some(EntryType::StringArray),
            _ => None,
        }
    }

    /// Returns a short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EntryType::Boolean => "boolean",
            EntryType::Number => "number",
            EntryType::String => "string",
            EntryType::Raw => "raw",
            EntryType::BooleanArray => "boolean[]",
            EntryType::NumberArray => "number[]",
            EntryType::StringArray => "string[]",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed entry value.
///
/// The type of a key is not fixed: a later write may replace the value with
/// one of a different variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntryValue {
    /// A single boolean.
    Boolean(bool),
    /// A double-precision number.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// Opaque bytes.
    Raw(Vec<u8>),
    /// Array of booleans.
    BooleanArray(Vec<bool>),
    /// Array of numbers.
    NumberArray(Vec<f64>),
    /// Array of strings.
    StringArray(Vec<String>),
}

impl EntryValue {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryValue::Boolean(_) => EntryType::Boolean,
            EntryValue::Number(_) => EntryType::Number,
            EntryValue::String(_) => EntryType::String,
            EntryValue::Raw(_) => EntryType::Raw,
            EntryValue::BooleanArray(_) => EntryType::BooleanArray,
            EntryValue::NumberArray(_) => EntryType::NumberArray,
            EntryValue::StringArray(_) => EntryType::StringArray,
        }
    }

    /// Returns the boolean if this is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EntryValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number if this is a `Number`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EntryValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EntryValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if this is `Raw`.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            EntryValue::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the elements if this is a `BooleanArray`.
    pub fn as_bool_array(&self) -> Option<&[bool]> {
        match self {
            EntryValue::BooleanArray(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the elements if this is a `NumberArray`.
    pub fn as_number_array(&self) -> Option<&[f64]> {
        match self {
            EntryValue::NumberArray(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the elements if this is a `StringArray`.
    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            EntryValue::StringArray(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryValue::Boolean(b) => write!(f, "{b}"),
            EntryValue::Number(n) => write!(f, "{n}"),
            EntryValue::String(s) => write!(f, "{s:?}"),
            EntryValue::Raw(b) => write!(f, "<{} bytes>", b.len()),
            EntryValue::BooleanArray(a) => write!(f, "{a:?}"),
            EntryValue::NumberArray(a) => write!(f, "{a:?}"),
            EntryValue::StringArray(a) => write!(f, "{a:?}"),
        }
    }
}

impl From<bool> for EntryValue {
    fn from(value: bool) -> Self {
        EntryValue::Boolean(value)
    }
}

impl From<f64> for EntryValue {
    fn from(value: f64) -> Self {
        EntryValue::Number(value)
    }
}

impl From<i32> for EntryValue {
    fn from(value: i32) -> Self {
        EntryValue::Number(f64::from(value))
    }
}

impl From<&str> for EntryValue {
    fn from(value: &str) -> Self {
        EntryValue::String(value.to_string())
    }
}

impl From<String> for EntryValue {
    fn from(value: String) -> Self {
        EntryValue::String(value)
    }
}

impl From<Vec<bool>> for EntryValue {
    fn from(value: Vec<bool>) -> Self {
        EntryValue::BooleanArray(value)
    }
}

impl From<&[bool]> for EntryValue {
    fn from(value: &[bool]) -> Self {
        EntryValue::BooleanArray(value.to_vec())
    }
}

impl From<Vec<f64>> for EntryValue {
    fn from(value: Vec<f64>) -> Self {
        EntryValue::NumberArray(value)
    }
}

impl From<&[f64]> for EntryValue {
    fn from(value: &[f64]) -> Self {
        EntryValue::NumberArray(value.to_vec())
    }
}

impl From<Vec<String>> for EntryValue {
    fn from(value: Vec<String>) -> Self {
        EntryValue::StringArray(value)
    }
}

impl From<&[&str]> for EntryValue {
    fn from(value: &[&str]) -> Self {
        EntryValue::StringArray(value.iter().map(|s| (*s).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_roundtrip() {
        for ty in [
            EntryType::Boolean,
            EntryType::Number,
            EntryType::String,
            EntryType::Raw,
            EntryType::BooleanArray,
            EntryType::NumberArray,
            EntryType::StringArray,
        ] {
            assert_eq!(EntryType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(EntryType::from_code(0x20), None);
    }

    #[test]
    fn conversions_pick_the_right_variant() {
        assert_eq!(EntryValue::from(2).entry_type(), EntryType::Number);
        assert_eq!(EntryValue::from("s").entry_type(), EntryType::String);
        assert_eq!(
            EntryValue::from(&["s", "t"][..]),
            EntryValue::StringArray(vec!["s".into(), "t".into()])
        );
        assert_eq!(EntryValue::from(vec![true, false]).as_bool_array(), Some(&[true, false][..]));
    }

    #[test]
    fn accessors_check_the_tag() {
        let value = EntryValue::Number(1.5);
        assert_eq!(value.as_number(), Some(1.5));
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(EntryValue::from("\u{A9}").to_string(), "\"\u{A9}\"");
        assert_eq!(EntryValue::Raw(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(EntryValue::from(vec![1.0, 2.5]).to_string(), "[1.0, 2.5]");
    }
}
