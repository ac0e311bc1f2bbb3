//! Table views over the entry namespace.

use crate::change_feed::ChangeEvent;
use crate::error::CoreResult;
use crate::store::EntryStore;
use nettable_codec::{EntryFlags, EntryType, EntryValue};
use std::collections::BTreeSet;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Separator between path segments of a key.
pub const PATH_SEPARATOR: char = '/';

/// A key-prefix view over an [`EntryStore`].
///
/// `Table` is a cheap handle; any number of views may exist for the same
/// path. Keys passed to its methods are relative to the table's path.
///
/// # Example
///
/// ```rust
/// use nettable_core::{EntryStore, StoreMode, Table};
/// use std::sync::Arc;
///
/// let store = Arc::new(EntryStore::new(StoreMode::Server));
/// let table = Table::new(store.clone(), "t1");
///
/// table.put_number("speed", 2.5);
/// assert_eq!(table.get_number("speed").unwrap(), 2.5);
/// assert_eq!(store.get("/t1/speed"), Some(2.5.into()));
/// assert!(table.get_boolean("missing").is_err());
/// assert!(table.get_boolean_or("missing", true));
/// ```
#[derive(Clone)]
pub struct Table {
    store: Arc<EntryStore>,
    path: String,
    prefix: String,
}

impl Table {
    /// Creates a view of the table at `name`.
    ///
    /// Leading and trailing separators are ignored, so `"t1"`, `"/t1"` and
    /// `"/t1/"` name the same table.
    pub fn new(store: Arc<EntryStore>, name: &str) -> Self {
        let trimmed = name.trim_matches(PATH_SEPARATOR);
        let path = format!("{PATH_SEPARATOR}{trimmed}");
        let prefix = if trimmed.is_empty() {
            path.clone()
        } else {
            format!("{path}{PATH_SEPARATOR}")
        };
        Self {
            store,
            path,
            prefix,
        }
    }

    /// Returns the absolute path of this table, e.g. `/t1`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the full key for a relative key.
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Returns the store this table views.
    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Returns a view of a nested table.
    pub fn get_sub_table(&self, name: &str) -> Table {
        Table::new(self.store.clone(), &self.full_key(name))
    }

    // Reads

    /// Returns the value under `key` regardless of its type.
    pub fn get_value(&self, key: &str) -> CoreResult<EntryValue> {
        let full = self.full_key(key);
        self.store
            .get(&full)
            .ok_or_else(|| crate::CoreError::key_not_found(full))
    }

    /// Returns the value under `key`, or `default` if absent.
    pub fn get_value_or(&self, key: &str, default: EntryValue) -> EntryValue {
        self.get_value(key).unwrap_or(default)
    }

    /// Reads a boolean.
    pub fn get_boolean(&self, key: &str) -> CoreResult<bool> {
        self.get_as(key, EntryType::Boolean, EntryValue::as_bool)
    }

    /// Reads a number.
    pub fn get_number(&self, key: &str) -> CoreResult<f64> {
        self.get_as(key, EntryType::Number, EntryValue::as_number)
    }

    /// Reads a string.
    pub fn get_string(&self, key: &str) -> CoreResult<String> {
        self.get_as(key, EntryType::String, |v| v.as_str().map(str::to_string))
    }

    /// Reads raw bytes.
    pub fn get_raw(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.get_as(key, EntryType::Raw, |v| v.as_raw().map(<[u8]>::to_vec))
    }

    /// Reads a boolean array.
    pub fn get_boolean_array(&self, key: &str) -> CoreResult<Vec<bool>> {
        self.get_as(key, EntryType::BooleanArray, |v| {
            v.as_bool_array().map(<[bool]>::to_vec)
        })
    }

    /// Reads a number array.
    pub fn get_number_array(&self, key: &str) -> CoreResult<Vec<f64>> {
        self.get_as(key, EntryType::NumberArray, |v| {
            v.as_number_array().map(<[f64]>::to_vec)
        })
    }

    /// Reads a string array.
    pub fn get_string_array(&self, key: &str) -> CoreResult<Vec<String>> {
        self.get_as(key, EntryType::StringArray, |v| {
            v.as_string_array().map(<[String]>::to_vec)
        })
    }

    /// Reads a boolean, falling back to `default` on absence or type mismatch.
    pub fn get_boolean_or(&self, key: &str, default: bool) -> bool {
        self.get_boolean(key).unwrap_or(default)
    }

    /// Reads a number, falling back to `default` on absence or type mismatch.
    pub fn get_number_or(&self, key: &str, default: f64) -> f64 {
        self.get_number(key).unwrap_or(default)
    }

    /// Reads a string, falling back to `default` on absence or type mismatch.
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key)
            .unwrap_or_else(|_| default.to_string())
    }

    /// Reads raw bytes, falling back to `default`.
    pub fn get_raw_or(&self, key: &str, default: &[u8]) -> Vec<u8> {
        self.get_raw(key).unwrap_or_else(|_| default.to_vec())
    }

    /// Reads a boolean array, falling back to `default`.
    pub fn get_boolean_array_or(&self, key: &str, default: &[bool]) -> Vec<bool> {
        self.get_boolean_array(key)
            .unwrap_or_else(|_| default.to_vec())
    }

    /// Reads a number array, falling back to `default`.
    pub fn get_number_array_or(&self, key: &str, default: &[f64]) -> Vec<f64> {
        self.get_number_array(key)
            .unwrap_or_else(|_| default.to_vec())
    }

    /// Reads a string array, falling back to `default`.
    pub fn get_string_array_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        self.get_string_array(key)
            .unwrap_or_else(|_| default.iter().map(|s| (*s).to_string()).collect())
    }

    fn get_as<T>(
        &self,
        key: &str,
        expected: EntryType,
        extract: impl FnOnce(&EntryValue) -> Option<T>,
    ) -> CoreResult<T> {
        let full = self.full_key(key);
        let value = self.store.get_typed(&full, expected, None)?;
        extract(&value).ok_or_else(|| {
            crate::CoreError::type_mismatch(full, expected, value.entry_type())
        })
    }

    // Writes

    /// Writes any value. Propagation to peers happens in the background.
    pub fn put_value(&self, key: &str, value: EntryValue) {
        self.store.put(&self.full_key(key), value);
    }

    /// Writes a boolean.
    pub fn put_boolean(&self, key: &str, value: bool) {
        self.put_value(key, EntryValue::Boolean(value));
    }

    /// Writes a number.
    pub fn put_number(&self, key: &str, value: f64) {
        self.put_value(key, EntryValue::Number(value));
    }

    /// Writes a string.
    pub fn put_string(&self, key: &str, value: &str) {
        self.put_value(key, EntryValue::String(value.to_string()));
    }

    /// Writes raw bytes. Peers on revision 2.0 never receive raw values.
    pub fn put_raw(&self, key: &str, value: &[u8]) {
        self.put_value(key, EntryValue::Raw(value.to_vec()));
    }

    /// Writes a boolean array.
    pub fn put_boolean_array(&self, key: &str, value: &[bool]) {
        self.put_value(key, EntryValue::BooleanArray(value.to_vec()));
    }

    /// Writes a number array.
    pub fn put_number_array(&self, key: &str, value: &[f64]) {
        self.put_value(key, EntryValue::NumberArray(value.to_vec()));
    }

    /// Writes a string array.
    pub fn put_string_array(&self, key: &str, value: &[&str]) {
        self.put_value(key, EntryValue::from(value));
    }

    /// Deletes `key`. Returns false if it did not exist.
    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(&self.full_key(key))
    }

    // Structure

    /// Returns true if `key` holds a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(&self.full_key(key))
    }

    /// Returns true if any key exists below the sub-table `name`.
    pub fn contains_sub_table(&self, name: &str) -> bool {
        let prefix = format!("{}{PATH_SEPARATOR}", self.full_key(name));
        !self.store.keys_with_prefix(&prefix).is_empty()
    }

    /// Returns the keys directly in this table, sorted.
    pub fn get_keys(&self) -> Vec<String> {
        self.store
            .keys_with_prefix(&self.prefix)
            .into_iter()
            .filter_map(|k| {
                let rest = &k[self.prefix.len()..];
                (!rest.contains(PATH_SEPARATOR)).then(|| rest.to_string())
            })
            .collect()
    }

    /// Returns the names of the sub-tables directly below this table, sorted.
    pub fn get_sub_tables(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .store
            .keys_with_prefix(&self.prefix)
            .into_iter()
            .filter_map(|k| {
                let rest = &k[self.prefix.len()..];
                rest.split_once(PATH_SEPARATOR)
                    .map(|(name, _)| name.to_string())
            })
            .collect();
        names.into_iter().collect()
    }

    // Flags

    /// Marks `key` persistent so it survives a clear-all.
    pub fn set_persistent(&self, key: &str) -> bool {
        self.update_flags(key, |f| f.with(EntryFlags::PERSISTENT))
    }

    /// Removes the persistent mark from `key`.
    pub fn clear_persistent(&self, key: &str) -> bool {
        self.update_flags(key, |f| f.without(EntryFlags::PERSISTENT))
    }

    /// Returns true if `key` exists and is persistent.
    pub fn is_persistent(&self, key: &str) -> bool {
        self.store
            .flags(&self.full_key(key))
            .is_some_and(EntryFlags::is_persistent)
    }

    fn update_flags(&self, key: &str, f: impl FnOnce(EntryFlags) -> EntryFlags) -> bool {
        let full = self.full_key(key);
        match self.store.flags(&full) {
            Some(flags) => self.store.set_flags(&full, f(flags)),
            None => false,
        }
    }

    /// Subscribes to changes of every key below this table, nested ones
    /// included.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.store.subscribe(Some(&self.prefix))
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreMode;
    use crate::CoreError;

    fn table(name: &str) -> Table {
        Table::new(Arc::new(EntryStore::new(StoreMode::Client)), name)
    }

    #[test]
    fn path_normalization() {
        let store = Arc::new(EntryStore::default());
        for name in ["t1", "/t1", "/t1/"] {
            let t = Table::new(store.clone(), name);
            assert_eq!(t.path(), "/t1");
            assert_eq!(t.full_key("b"), "/t1/b");
        }
        assert_eq!(Table::new(store, "").full_key("b"), "/b");
    }

    #[test]
    fn never_written_keys() {
        let t = table("t1");
        assert!(matches!(
            t.get_boolean("b"),
            Err(CoreError::KeyNotFound { ref key }) if key == "/t1/b"
        ));
        assert!(t.get_number("d").unwrap_err().is_not_found());
        assert!(t.get_string("s").unwrap_err().is_not_found());
        assert!(t.get_raw("r").unwrap_err().is_not_found());
        assert!(t.get_boolean_array("ba").unwrap_err().is_not_found());
        assert!(t.get_number_array("da").unwrap_err().is_not_found());
        assert!(t.get_string_array("sa").unwrap_err().is_not_found());

        assert!(t.get_boolean_or("b", true));
        assert_eq!(t.get_number_or("d", 1.5), 1.5);
        assert_eq!(t.get_string_or("s", "x"), "x");
        assert_eq!(t.get_raw_or("r", &[1, 2]), vec![1, 2]);
        assert_eq!(t.get_boolean_array_or("ba", &[true]), vec![true]);
        assert_eq!(t.get_number_array_or("da", &[2.0]), vec![2.0]);
        assert_eq!(t.get_string_array_or("sa", &["a"]), vec!["a".to_string()]);
    }

    #[test]
    fn typed_roundtrip() {
        let t = table("t1");
        t.put_boolean("b", true);
        t.put_number("d", 1.5);
        t.put_string("s", "\u{A9}");
        t.put_raw("r", &[0, 255]);
        t.put_boolean_array("ba", &[true, false]);
        t.put_number_array("da", &[2.0, 1.0]);
        t.put_string_array("sa", &["t", "s"]);

        assert!(t.get_boolean("b").unwrap());
        assert_eq!(t.get_number("d").unwrap(), 1.5);
        assert_eq!(t.get_string("s").unwrap(), "\u{A9}");
        assert_eq!(t.get_raw("r").unwrap(), vec![0, 255]);
        assert_eq!(t.get_boolean_array("ba").unwrap(), vec![true, false]);
        assert_eq!(t.get_number_array("da").unwrap(), vec![2.0, 1.0]);
        assert_eq!(
            t.get_string_array("sa").unwrap(),
            vec!["t".to_string(), "s".to_string()]
        );
    }

    #[test]
    fn mismatch_is_bridged_by_default() {
        let t = table("t1");
        t.put_number("d", 1.0);
        assert!(matches!(
            t.get_boolean("d"),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(!t.get_boolean_or("d", false));
    }

    #[test]
    fn keys_and_sub_tables() {
        let t = table("t1");
        t.put_number("z", 1.0);
        t.put_number("a", 1.0);
        t.put_number("sub/x", 1.0);
        t.put_number("sub/deeper/y", 1.0);
        t.put_number("other/x", 1.0);
        Table::new(t.store().clone(), "t2").put_number("a", 1.0);

        assert_eq!(t.get_keys(), vec!["a".to_string(), "z".to_string()]);
        assert_eq!(
            t.get_sub_tables(),
            vec!["other".to_string(), "sub".to_string()]
        );
        assert!(t.contains_sub_table("sub"));
        assert!(!t.contains_sub_table("missing"));

        let sub = t.get_sub_table("sub");
        assert_eq!(sub.path(), "/t1/sub");
        assert_eq!(sub.get_keys(), vec!["x".to_string()]);
        assert_eq!(sub.get_sub_tables(), vec!["deeper".to_string()]);
    }

    #[test]
    fn delete_and_contains() {
        let t = table("t1");
        t.put_boolean("b", true);
        assert!(t.contains_key("b"));
        assert!(t.delete("b"));
        assert!(!t.contains_key("b"));
        assert!(t.get_boolean("b").unwrap_err().is_not_found());
    }

    #[test]
    fn persistent_flag() {
        let t = table("t1");
        assert!(!t.set_persistent("missing"));
        t.put_number("d", 1.0);
        assert!(t.set_persistent("d"));
        assert!(t.is_persistent("d"));
        assert!(t.clear_persistent("d"));
        assert!(!t.is_persistent("d"));
    }

    #[test]
    fn subscribe_scopes_to_table() {
        let t = table("t1");
        let rx = t.subscribe();
        t.put_number("a", 1.0);
        Table::new(t.store().clone(), "t10").put_number("a", 1.0);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "/t1/a");
    }
}
