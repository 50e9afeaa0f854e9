//! Application services for SkyCast: the dashboard orchestrator and the
//! user preference store.

pub mod dashboard;
pub mod error;
pub mod store;

pub use dashboard::{CityCard, Dashboard, Notice, NoticeLevel};
pub use error::{to_app_error, StoreError};
pub use store::{PreferenceStore, RecentSearch, RecentSearches, Theme};
