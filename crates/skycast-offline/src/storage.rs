//! Named bundles of cached responses.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::OfflineError;
use crate::network::StoredResponse;

/// Synchronous storage for cached responses, grouped into named bundles.
///
/// The proxy calls these from blocking tasks.
pub trait CacheStorage: Send + 'static {
    fn put(&mut self, bundle: &str, url: &str, response: &StoredResponse) -> Result<(), OfflineError>;

    fn get(&self, bundle: &str, url: &str) -> Result<Option<StoredResponse>, OfflineError>;

    /// Names of all bundles holding at least one response.
    fn bundles(&self) -> Result<Vec<String>, OfflineError>;

    /// Delete a bundle and everything in it. Returns whether it existed.
    fn delete_bundle(&mut self, bundle: &str) -> Result<bool, OfflineError>;

    fn entry_count(&self, bundle: &str) -> Result<usize, OfflineError>;
}

/// In-process storage, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    bundles: HashMap<String, HashMap<String, StoredResponse>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn put(&mut self, bundle: &str, url: &str, response: &StoredResponse) -> Result<(), OfflineError> {
        self.bundles
            .entry(bundle.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        Ok(())
    }

    fn get(&self, bundle: &str, url: &str) -> Result<Option<StoredResponse>, OfflineError> {
        Ok(self.bundles.get(bundle).and_then(|b| b.get(url)).cloned())
    }

    fn bundles(&self) -> Result<Vec<String>, OfflineError> {
        let mut names: Vec<String> = self.bundles.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete_bundle(&mut self, bundle: &str) -> Result<bool, OfflineError> {
        Ok(self.bundles.remove(bundle).is_some())
    }

    fn entry_count(&self, bundle: &str) -> Result<usize, OfflineError> {
        Ok(self.bundles.get(bundle).map_or(0, HashMap::len))
    }
}

/// SQLite-backed storage that survives restarts.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OfflineError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, OfflineError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), OfflineError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                bundle TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT,
                body BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (bundle, url)
            );

            CREATE INDEX IF NOT EXISTS idx_responses_bundle ON responses(bundle);
            "#,
        )?;
        Ok(())
    }
}

impl CacheStorage for SqliteStorage {
    fn put(&mut self, bundle: &str, url: &str, response: &StoredResponse) -> Result<(), OfflineError> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO responses (bundle, url, status, content_type, body, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                bundle,
                url,
                response.status,
                response.content_type,
                response.body,
                now
            ],
        )?;
        Ok(())
    }

    fn get(&self, bundle: &str, url: &str) -> Result<Option<StoredResponse>, OfflineError> {
        let response = self
            .conn
            .query_row(
                "SELECT status, content_type, body FROM responses WHERE bundle = ?1 AND url = ?2",
                params![bundle, url],
                |row| {
                    Ok(StoredResponse {
                        status: row.get(0)?,
                        content_type: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(response)
    }

    fn bundles(&self) -> Result<Vec<String>, OfflineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT bundle FROM responses ORDER BY bundle")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete_bundle(&mut self, bundle: &str) -> Result<bool, OfflineError> {
        let deleted = self
            .conn
            .execute("DELETE FROM responses WHERE bundle = ?1", params![bundle])?;
        Ok(deleted > 0)
    }

    fn entry_count(&self, bundle: &str) -> Result<usize, OfflineError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE bundle = ?1",
            params![bundle],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
