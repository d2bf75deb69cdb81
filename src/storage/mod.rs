use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;

mod schema;

/// Current feed format.
pub const FEED_KEY: &str = "cleartype-feed";
/// Multi-document store that predates the feed.
pub const LEGACY_DOCUMENTS_KEY: &str = "cleartype-documents";
/// Single scratch pad blob from the very first release.
pub const LEGACY_SCRATCH_KEY: &str = "scratch-pad-content";
pub const THEME_KEY: &str = "cleartype-theme";
pub const SIDEBAR_KEY: &str = "cleartype-sidebar";

/// Synchronous string-keyed storage primitive the feed is persisted through.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[derive(Clone)]
pub struct SqliteStorage {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteStorage {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl KeyValueStore for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("reading key '{key}'"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key '{key}'"))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("removing key '{key}'"))?;
            Ok(())
        })
    }
}

/// In-process store. Counts writes and can be told to reject them, which is
/// how quota and disabled-storage failures are exercised.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
    writes: Cell<usize>,
    reject_writes: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RefCell::new(map),
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.set(reject);
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.reject_writes.get() {
            bail!("storage quota exceeded while writing '{key}'");
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

pub fn init(options: &StorageOptions) -> Result<SqliteStorage> {
    let db_path = &options.database_path;
    if db_path.as_os_str().is_empty() {
        bail!("storage database path was not resolved");
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, options)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "storage ready");
    Ok(SqliteStorage {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(options.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_storage() -> anyhow::Result<(TempDir, SqliteStorage)> {
        let temp = TempDir::new()?;
        let mut options = StorageOptions::default();
        options.database_path = temp.path().join("data/cleartype.db");
        let storage = init(&options)?;
        Ok((temp, storage))
    }

    #[test]
    fn sqlite_set_get_remove() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get(FEED_KEY)?, None);

        storage.set(FEED_KEY, "first")?;
        storage.set(FEED_KEY, "second")?;
        assert_eq!(storage.get(FEED_KEY)?.as_deref(), Some("second"));

        storage.remove(FEED_KEY)?;
        assert_eq!(storage.get(FEED_KEY)?, None);
        storage.remove(FEED_KEY)?;
        Ok(())
    }

    fn stored_keys(storage: &SqliteStorage) -> anyhow::Result<Vec<String>> {
        storage.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    #[test]
    fn sqlite_values_survive_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut options = StorageOptions::default();
        options.database_path = temp.path().join("cleartype.db");
        {
            let storage = init(&options)?;
            storage.set(THEME_KEY, "dark")?;
            storage.set(FEED_KEY, "{\"items\":[]}")?;
        }
        let reopened = init(&options)?;
        assert_eq!(reopened.get(THEME_KEY)?.as_deref(), Some("dark"));
        assert_eq!(stored_keys(&reopened)?, [FEED_KEY, THEME_KEY]);
        Ok(())
    }

    #[test]
    fn sqlite_round_trips_unicode_text() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let body = "emoji 📝 and accents é, ñ\nsecond line";
        storage.set(LEGACY_SCRATCH_KEY, body)?;
        assert_eq!(storage.get(LEGACY_SCRATCH_KEY)?.as_deref(), Some(body));
        Ok(())
    }

    #[test]
    fn init_requires_resolved_path() {
        let options = StorageOptions::default();
        assert!(init(&options).is_err());
    }

    #[test]
    fn memory_storage_counts_and_rejects_writes() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([(THEME_KEY, "light")]);
        assert!(storage.contains(THEME_KEY));
        storage.set(SIDEBAR_KEY, "open")?;
        assert_eq!(storage.write_count(), 1);

        storage.set_reject_writes(true);
        assert!(storage.set(SIDEBAR_KEY, "closed").is_err());
        assert_eq!(storage.get(SIDEBAR_KEY)?.as_deref(), Some("open"));
        assert_eq!(storage.write_count(), 1);
        Ok(())
    }
}
