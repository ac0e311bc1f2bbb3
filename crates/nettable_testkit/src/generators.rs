//! Property-based test generators using proptest.

use nettable::{EntryValue, ProtocolRevision};
use proptest::prelude::*;

/// Strategy for table-relative key names.
pub fn key_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_ ]{0,15}").expect("Invalid regex")
}

/// Strategy for arbitrary Unicode strings, including multi-byte characters.
pub fn unicode_string_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..64).prop_map(|chars| chars.into_iter().collect())
}

/// Strategy for finite numbers; NaN never compares equal after a round trip.
pub fn number_strategy() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL
}

/// Strategy for values that exist on `revision`.
///
/// Arrays stay within the 255-element wire limit.
pub fn entry_value_strategy(revision: ProtocolRevision) -> BoxedStrategy<EntryValue> {
    let common = prop_oneof![
        any::<bool>().prop_map(EntryValue::Boolean),
        number_strategy().prop_map(EntryValue::Number),
        unicode_string_strategy().prop_map(EntryValue::String),
        prop::collection::vec(any::<bool>(), 0..=255).prop_map(EntryValue::BooleanArray),
        prop::collection::vec(number_strategy(), 0..=32).prop_map(EntryValue::NumberArray),
        prop::collection::vec(unicode_string_strategy(), 0..=8).prop_map(EntryValue::StringArray),
    ];
    match revision {
        ProtocolRevision::Nt2 => common.boxed(),
        ProtocolRevision::Nt3 => prop_oneof![
            common,
            prop::collection::vec(any::<u8>(), 0..512).prop_map(EntryValue::Raw),
        ]
        .boxed(),
    }
}
