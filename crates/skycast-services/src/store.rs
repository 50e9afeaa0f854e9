//! Persistent user preferences.
//!
//! Values are JSON blobs keyed by name, one file per key. When the data
//! directory cannot be used the store keeps working from memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

pub const RECENT_SEARCHES_KEY: &str = "weatherRecentSearches";
pub const THEME_KEY: &str = "weatherDashboardTheme";
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Key/value store for user preferences.
pub struct PreferenceStore {
    dir: Option<PathBuf>,
    persistent: AtomicBool,
    memory: Mutex<HashMap<String, Value>>,
}

/// A value paired with its wall-clock expiry in unix milliseconds.
#[derive(Debug, Serialize, Deserialize)]
struct Expiring {
    value: Value,
    expiry: i64,
}

impl PreferenceStore {
    /// Store backed by files under `dir`, created if missing.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!("Preference store at {:?}", dir);
                Self {
                    dir: Some(dir),
                    persistent: AtomicBool::new(true),
                    memory: Mutex::new(HashMap::new()),
                }
            }
            Err(e) => {
                tracing::error!(
                    "Preference directory {:?} unavailable, keeping preferences in memory: {}",
                    dir,
                    e
                );
                Self::in_memory()
            }
        }
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            persistent: AtomicBool::new(false),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    /// Save `value` under `key`.
    ///
    /// The value is always kept in memory. A failed disk write switches the
    /// store to memory-only mode and returns the error; later saves succeed
    /// in memory.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_value(value)?;
        self.memory.lock().insert(key.to_string(), json.clone());

        let Some(path) = self.path_for(key) else {
            return Ok(());
        };

        let written = serde_json::to_string_pretty(&json)
            .map_err(StoreError::from)
            .and_then(|text| fs::write(&path, text).map_err(StoreError::from));

        if let Err(e) = &written {
            tracing::error!("Failed to save preference {}: {}", key, e);
            self.persistent.store(false, Ordering::SeqCst);
        }
        written
    }

    /// Load the value under `key`, or `None` when missing or unreadable.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_value(key)?;
        match serde_json::from_value(json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Error retrieving preference {}: {}", key, e);
                None
            }
        }
    }

    pub fn load_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.load(key).unwrap_or(default)
    }

    pub fn remove(&self, key: &str) {
        self.memory.lock().remove(key);
        if let Some(path) = self.path_for(key) {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::error!("Failed to remove preference {}: {}", key, e);
                }
            }
        }
    }

    /// Remove every stored preference.
    pub fn clear(&self) {
        self.memory.lock().clear();
        let Some(dir) = self.active_dir() else {
            return;
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to clear preferences: {}", e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::error!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }

    /// Save a value that reads as absent once `ttl` has passed.
    pub fn set_with_expiry<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let item = Expiring {
            value: serde_json::to_value(value)?,
            expiry: now_millis().saturating_add(ttl_ms),
        };
        self.save(key, &item)
    }

    /// Load a value saved with [`set_with_expiry`](Self::set_with_expiry). Expired items are removed.
    pub fn get_with_expiry<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let item: Expiring = self.load(key)?;
        if now_millis() > item.expiry {
            tracing::debug!("Preference {} expired", key);
            self.remove(key);
            return None;
        }
        match serde_json::from_value(item.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Error retrieving item with expiry {}: {}", key, e);
                None
            }
        }
    }

    pub fn theme(&self) -> Theme {
        self.load_or(THEME_KEY, Theme::default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.save(THEME_KEY, &theme)
    }

    fn load_value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.lock().get(key) {
            return Some(value.clone());
        }

        let path = self.path_for(key)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::error!("Failed to read preference {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => {
                self.memory.lock().insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(e) => {
                tracing::error!("Preference {} is corrupt: {}", key, e);
                None
            }
        }
    }

    fn active_dir(&self) -> Option<&Path> {
        if self.is_persistent() {
            self.dir.as_deref()
        } else {
            None
        }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.active_dir().map(|dir| dir.join(format!("{}.json", file)))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Colour scheme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// A city the user searched for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSearch {
    pub name: String,
    /// Country code as reported by the provider
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl RecentSearch {
    fn same_place(&self, other: &RecentSearch) -> bool {
        self.name.to_lowercase() == other.name.to_lowercase() && self.country == other.country
    }
}

/// Most recent searches, newest first.
#[derive(Debug, Clone)]
pub struct RecentSearches {
    items: Vec<RecentSearch>,
    limit: usize,
}

impl RecentSearches {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
        }
    }

    pub fn load(store: &PreferenceStore, limit: usize) -> Self {
        let mut items: Vec<RecentSearch> = store.load_or(RECENT_SEARCHES_KEY, Vec::new());
        items.truncate(limit);
        Self { items, limit }
    }

    /// Add a search to the front. A place already in the list is left where it is.
    ///
    /// Returns whether the list changed.
    pub fn record(&mut self, search: RecentSearch) -> bool {
        if self.items.iter().any(|item| item.same_place(&search)) {
            return false;
        }
        self.items.insert(0, search);
        self.items.truncate(self.limit);
        true
    }

    pub fn items(&self) -> &[RecentSearch] {
        &self.items
    }

    pub fn persist(&self, store: &PreferenceStore) -> Result<(), StoreError> {
        store.save(RECENT_SEARCHES_KEY, &self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn search(name: &str, country: &str) -> RecentSearch {
        RecentSearch {
            name: name.to_string(),
            country: country.to_string(),
            lat: 0.0,
            lon: 0.0,
        }
    }

    #[test]
    fn test_save_and_load_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(dir.path());
        assert!(store.is_persistent());
        store.save("answer", &42u32).unwrap();

        let reopened = PreferenceStore::open(dir.path());
        assert_eq!(reopened.load::<u32>("answer"), Some(42));
        assert!(dir.path().join("answer.json").exists());
    }

    #[test]
    fn test_load_or_default_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(dir.path());
        assert_eq!(store.load_or("missing", 7u8), 7);
    }

    #[test]
    fn test_corrupt_file_reads_as_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let store = PreferenceStore::open(dir.path());
        assert_eq!(store.load::<Vec<String>>("broken"), None);
    }

    #[test]
    fn test_unusable_directory_degrades_to_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let store = PreferenceStore::open(blocker.join("prefs"));
        assert!(!store.is_persistent());

        store.save("k", &"v").unwrap();
        assert_eq!(store.load::<String>("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(dir.path());
        store.save("a", &1).unwrap();
        store.save("b", &2).unwrap();

        store.remove("a");
        assert_eq!(store.load::<i32>("a"), None);

        store.clear();
        assert_eq!(store.load::<i32>("b"), None);
        assert!(!dir.path().join("b.json").exists());
    }

    #[test]
    fn test_expiry() {
        let store = PreferenceStore::in_memory();
        store
            .set_with_expiry("fresh", &"yes", Duration::from_secs(60))
            .unwrap();
        assert_eq!(store.get_with_expiry::<String>("fresh").as_deref(), Some("yes"));

        let stale = Expiring {
            value: serde_json::json!("old"),
            expiry: now_millis() - 1,
        };
        store.save("stale", &stale).unwrap();
        assert_eq!(store.get_with_expiry::<String>("stale"), None);
        assert_eq!(store.load::<Value>("stale"), None);
    }

    #[test]
    fn test_theme_defaults_to_dark() {
        let store = PreferenceStore::in_memory();
        assert_eq!(store.theme(), Theme::Dark);
        store.set_theme(Theme::Dark.toggled()).unwrap();
        assert_eq!(store.theme(), Theme::Light);
    }

    #[test]
    fn test_recent_searches_newest_first_and_capped() {
        let mut recent = RecentSearches::new(DEFAULT_RECENT_LIMIT);
        for name in ["A", "B", "C", "D", "E", "F"] {
            assert!(recent.record(search(name, "GB")));
        }
        let names: Vec<&str> = recent.items().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["F", "E", "D", "C", "B"]);
    }

    #[test]
    fn test_recent_searches_dedupe_ignores_case() {
        let mut recent = RecentSearches::new(DEFAULT_RECENT_LIMIT);
        assert!(recent.record(search("Paris", "FR")));
        assert!(!recent.record(search("paris", "FR")));
        assert!(recent.record(search("Paris", "US")));
        assert_eq!(recent.items().len(), 2);
    }

    #[test]
    fn test_recent_searches_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(dir.path());
        let mut recent = RecentSearches::new(DEFAULT_RECENT_LIMIT);
        recent.record(search("Tokyo", "JP"));
        recent.persist(&store).unwrap();

        let loaded = RecentSearches::load(&PreferenceStore::open(dir.path()), DEFAULT_RECENT_LIMIT);
        assert_eq!(loaded.items(), recent.items());
    }
}
