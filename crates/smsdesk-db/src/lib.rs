pub mod keys;
pub mod migrations;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Durable key/value store. Every value is serialized whole as JSON; a write
/// replaces the entire value at its key.
///
/// Each call is serialized by the connection mutex, but nothing spans two
/// calls: a read followed by a write of the same key can interleave with
/// another writer, and the later write wins.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Record store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory store; used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))?;
        f(&conn)
    }

    // -- Fallible primitives --

    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })?;

        match raw {
            None => Ok(None),
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .with_context(|| format!("corrupt value at key '{}'", key))?;
                Ok(Some(value))
            }
        }
    }

    pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize value for key '{}'", key))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, &text),
            )?;
            Ok(())
        })
    }

    /// Returns true if a value was removed.
    pub fn try_remove(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM records WHERE key = ?1", [key])?;
            Ok(removed > 0)
        })
    }

    // -- Never-failing boundary --

    /// Reads the value at `key`, falling back to `default` when the key is
    /// missing or its value cannot be read. Faults are logged, never returned.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!("Record store read of '{}' failed, using default: {:#}", key, e);
                default
            }
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key, T::default())
    }

    /// Replaces the value at `key`. Returns false (after logging) if the
    /// write did not happen.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.try_set(key, value) {
            Ok(()) => true,
            Err(e) => {
                error!("Record store write of '{}' failed: {:#}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn set_then_get_roundtrip() {
        let store = RecordStore::open_in_memory().unwrap();
        let value = vec!["a".to_string(), "b".to_string()];

        assert!(store.set("list", &value));
        let loaded: Vec<String> = store.get("list", vec![]);
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_key_yields_default() {
        let store = RecordStore::open_in_memory().unwrap();

        let loaded: Vec<u32> = store.get("nothing", vec![7]);
        assert_eq!(loaded, vec![7]);
        assert!(store.try_get::<Vec<u32>>("nothing").unwrap().is_none());
    }

    #[test]
    fn empty_collection_roundtrips_as_empty() {
        let store = RecordStore::open_in_memory().unwrap();
        let empty: Vec<String> = vec![];

        assert!(store.set("list", &empty));
        let loaded: Vec<String> = store.get("list", vec!["default".into()]);
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_value_yields_default_and_is_kept() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO records (key, value) VALUES ('users', '{not json')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let loaded: Vec<String> = store.get_or_default("users");
        assert!(loaded.is_empty());
        assert!(store.try_get::<Vec<String>>("users").is_err());

        let raw: String = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT value FROM records WHERE key = 'users'", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(raw, "{not json");
    }

    #[test]
    fn wrong_shape_yields_default() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.set("count", &42u32));

        let loaded: Vec<String> = store.get("count", vec![]);
        assert!(loaded.is_empty());
    }

    #[test]
    fn set_replaces_whole_value() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut first = BTreeMap::new();
        first.insert("a", 1);
        first.insert("b", 2);
        let mut second = BTreeMap::new();
        second.insert("c", 3);

        assert!(store.set("map", &first));
        assert!(store.set("map", &second));

        let loaded: BTreeMap<String, i32> = store.get_or_default("map");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("c"), Some(&3));
    }

    #[test]
    fn remove_reports_presence() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.set("k", &"v"));

        assert!(store.try_remove("k").unwrap());
        assert!(!store.try_remove("k").unwrap());
        assert_eq!(store.get("k", String::from("gone")), "gone");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsdesk.db");

        {
            let store = RecordStore::open(&path).unwrap();
            assert!(store.set(keys::BLACKLIST, &vec!["+9999"]));
        }

        let store = RecordStore::open(&path).unwrap();
        let loaded: Vec<String> = store.get_or_default(keys::BLACKLIST);
        assert_eq!(loaded, vec!["+9999".to_string()]);
    }
}
