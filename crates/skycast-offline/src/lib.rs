//! Offline support for SkyCast
//!
//! A caching proxy that sits between the app and the network. App-shell
//! assets are served cache-first, weather API calls network-first with a
//! cached fallback, and everything else allow-listed falls back to the cache
//! when the network fails. Responses live in versioned bundles; activating a
//! new version deletes the old ones.

pub mod error;
pub mod network;
pub mod proxy;
pub mod route;
pub mod storage;

pub use error::OfflineError;
pub use network::{HttpNetwork, Network, ProxyRequest, StoredResponse};
pub use proxy::{OfflineProxy, OfflineSettings, ProxyResponse, ResponseSource};
pub use route::{
    host_matches, PassthroughReason, RequestRoute, RouteDecision, RoutePattern, RouteTable,
    Strategy,
};
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
