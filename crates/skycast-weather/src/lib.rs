//! Weather service for SkyCast
//!
//! Provides typed access to an OpenWeather-compatible API with short-lived
//! response memoization, geocoding, location lookup and forecast shaping.

pub mod cache;
pub mod forecast;
pub mod format;
pub mod geocode;
pub mod location;
pub mod provider;
pub mod transport;
pub mod types;

pub use cache::{CacheKey, Clock, ManualClock, ResponseCache, SystemClock, TtlCache};
pub use forecast::{DaySummary, ForecastView, HourlyPoint, FORECAST_DAYS};
pub use location::{
    locate_with_timeout, FixedLocation, LocationProvider, NoLocation, DEFAULT_LOCATION_TIMEOUT,
};
pub use provider::{ApiSettings, WeatherClient, DEFAULT_BASE_URL, DEFAULT_TTL};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use types::*;
