//! Short-lived in-memory response cache.
//!
//! `TtlCache` maps a request signature to a value and an expiry instant.
//! Expired entries are evicted lazily, on the next lookup that touches them.
//! There is no size bound: entries live until they expire or the cache is
//! cleared.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::types::{AirPollution, CurrentWeather, Forecast, OneCall, Units};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Shared handles see the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Deterministic cache key for a logical request.
///
/// Coordinates are rounded to four decimal places (about 11 m) so that the
/// same place always yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn coords(operation: &str, lat: f64, lon: f64) -> Self {
        Self(format!(
            "{}:{},{}",
            operation,
            round_coord(lat),
            round_coord(lon)
        ))
    }

    /// Key for a unit-bearing request. Metric is the implicit default and adds no suffix.
    pub fn with_units(self, units: Units) -> Self {
        match units {
            Units::Metric => self,
            other => Self(format!("{}:{}", self.0, other.as_query())),
        }
    }

    /// Append an extra discriminator such as a timestamp.
    pub fn with_suffix(self, suffix: impl std::fmt::Display) -> Self {
        Self(format!("{}:{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn round_coord(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // -0.0 + 0.0 == +0.0, so a coordinate that rounds to zero never prints as "-0.0000"
    format!("{:.4}", rounded + 0.0)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory map from key to value with per-entry expiry.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    epoch: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            clock,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the value for `key` if it has not expired. A stale entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                tracing::trace!("Evicted expired cache entry {}", key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = self.entry(value, ttl);
        self.entries.lock().insert(key.into(), entry);
    }

    /// Store `value` under `key` for the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    /// Drop every entry. Producers already in flight will not write their results back.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Keys of all live entries.
    pub fn keys(&self) -> Vec<String> {
        self.purge_expired();
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value for `key`, or run `producer` once and cache its result.
    ///
    /// A failed producer caches nothing and its error is returned unchanged.
    /// Concurrent callers for the same key each run their own producer.
    pub async fn memoize<F, Fut, E>(&self, key: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(value);
        }

        tracing::debug!("Cache miss: {}", key);
        let epoch = self.epoch.load(Ordering::SeqCst);
        let value = producer().await?;

        let entry = self.entry(value.clone(), self.default_ttl);
        let mut entries = self.entries.lock();
        // Compared under the entries lock, which `clear` also holds
        if self.epoch.load(Ordering::SeqCst) == epoch {
            entries.insert(key.to_string(), entry);
        } else {
            tracing::debug!("Cache cleared while fetching {}; result not stored", key);
        }

        Ok(value)
    }

    fn entry(&self, value: V, ttl: Duration) -> CacheEntry<V> {
        CacheEntry {
            value,
            expires_at: self.clock.now().checked_add(ttl),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.lock().len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Per-endpoint caches owned by a weather client.
///
/// Values are `Arc`s, so two hits within the TTL hand out the same allocation.
#[derive(Debug)]
pub struct ResponseCache {
    pub current: TtlCache<Arc<CurrentWeather>>,
    pub forecast: TtlCache<Arc<Forecast>>,
    pub air: TtlCache<Arc<AirPollution>>,
    pub one_call: TtlCache<Arc<OneCall>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: TtlCache::with_clock(ttl, clock.clone()),
            forecast: TtlCache::with_clock(ttl, clock.clone()),
            air: TtlCache::with_clock(ttl, clock.clone()),
            one_call: TtlCache::with_clock(ttl, clock),
        }
    }

    pub fn clear(&self) {
        self.current.clear();
        self.forecast.clear();
        self.air.clear();
        self.one_call.clear();
    }

    /// Live entries across all endpoints.
    pub fn len(&self) -> usize {
        self.current.len() + self.forecast.len() + self.air.len() + self.one_call.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
