use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather API settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Dashboard behavior
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Offline caching proxy
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Measurement units requested from the weather provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the OpenWeather-compatible API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API key (defaults to the SKYCAST_API_KEY environment variable).
    /// A key taken from the environment is never written back to the file.
    #[serde(default = "default_api_key", skip_serializing_if = "is_env_api_key")]
    pub api_key: String,

    /// Measurement units
    #[serde(default)]
    pub units: Units,

    /// How long fetched responses stay fresh, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Per-request HTTP timeout, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

const API_KEY_ENV: &str = "SKYCAST_API_KEY";

fn default_api_key() -> String {
    std::env::var(API_KEY_ENV).unwrap_or_default()
}

#[allow(clippy::ptr_arg)]
fn is_env_api_key(key: &String) -> bool {
    !key.is_empty() && std::env::var(API_KEY_ENV).is_ok_and(|env| env == *key)
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: default_api_key(),
            units: Units::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// A named coordinate pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl CityConfig {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Upper bound on the location lookup, in milliseconds
    #[serde(default = "default_geolocation_timeout_ms")]
    pub geolocation_timeout_ms: u64,

    /// How many nearby cities to ask the provider for
    #[serde(default = "default_nearby_count")]
    pub nearby_count: u32,

    /// How many distinct nearby cities to actually load
    #[serde(default = "default_max_nearby_cities")]
    pub max_nearby_cities: usize,

    /// Length of the recent searches list
    #[serde(default = "default_recent_search_limit")]
    pub recent_search_limit: usize,

    /// Cities shown when location lookup fails or finds nothing
    #[serde(default = "default_cities")]
    pub default_cities: Vec<CityConfig>,

    /// Fixed device location; when absent, location lookup is unavailable
    #[serde(default)]
    pub location: Option<CityConfig>,
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        CityConfig::new("London", 51.5074, -0.1278),
        CityConfig::new("New York", 40.7128, -74.006),
        CityConfig::new("Tokyo", 35.6762, 139.6503),
        CityConfig::new("Mexico City", 19.4326, -99.1332),
        CityConfig::new("Sydney", -33.8688, 151.2093),
        CityConfig::new("Paris", 48.8566, 2.3522),
    ]
}

fn default_geolocation_timeout_ms() -> u64 {
    5000
}

fn default_nearby_count() -> u32 {
    12
}

fn default_max_nearby_cities() -> usize {
    6
}

fn default_recent_search_limit() -> usize {
    5
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_cities: default_cities(),
            geolocation_timeout_ms: default_geolocation_timeout_ms(),
            nearby_count: default_nearby_count(),
            max_nearby_cities: default_max_nearby_cities(),
            recent_search_limit: default_recent_search_limit(),
            location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Route API traffic through the offline caching proxy
    #[serde(default = "default_offline_enabled")]
    pub enabled: bool,

    /// Version tag of the current cache bundle; bumping it invalidates older bundles
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the app shell is served from
    #[serde(default = "default_origin")]
    pub origin: String,

    /// App shell paths pre-cached on install
    #[serde(default = "default_app_shell")]
    pub app_shell: Vec<String>,

    /// Path prefixes served cache-first
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,

    /// Hosts of the weather provider (network-first)
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Third-party hosts the proxy is allowed to cache
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_offline_enabled() -> bool {
    true
}

fn default_cache_name() -> String {
    "weather-dashboard-v3".to_string()
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_app_shell() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/src/js/main.js",
        "/src/js/dashboard.js",
        "/src/js/api.js",
        "/src/js/ui.js",
        "/src/js/utils.js",
        "/src/css/style.css",
        "/manifest.json",
        "/icons/icon-192.png",
        "/icons/icon-512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_static_prefixes() -> Vec<String> {
    vec!["/src/".to_string(), "/icons/".to_string()]
}

fn default_api_hosts() -> Vec<String> {
    vec!["openweathermap.org".to_string()]
}

fn default_allowed_hosts() -> Vec<String> {
    [
        "unpkg.com",
        "cdn",
        "fonts.googleapis.com",
        "fonts.gstatic.com",
        "flagcdn.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: default_offline_enabled(),
            cache_name: default_cache_name(),
            origin: default_origin(),
            app_shell: default_app_shell(),
            static_prefixes: default_static_prefixes(),
            api_hosts: default_api_hosts(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for preferences and the offline cache database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skycast")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// SQLite database holding offline cache bundles
    pub fn offline_db_path(&self) -> PathBuf {
        self.data_dir.join("offline_cache.db")
    }

    /// Directory holding persisted preferences
    pub fn preferences_dir(&self) -> PathBuf {
        self.data_dir.join("preferences")
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            dashboard: DashboardConfig::default(),
            offline: OfflineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.api_base_url, "weather.api_base_url", &mut result);

        if self.weather.api_key.trim().is_empty() {
            result.add_warning(
                "weather.api_key",
                "No API key configured - set SKYCAST_API_KEY or weather.api_key",
            );
        }

        if self.weather.cache_ttl_secs == 0 {
            result.add_warning("weather.cache_ttl_secs", "Response caching disabled (0 seconds)");
        } else if self.weather.cache_ttl_secs > 24 * 60 * 60 {
            result.add_warning(
                "weather.cache_ttl_secs",
                "Cache TTL is more than 24 hours; data may be stale",
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if self.dashboard.default_cities.is_empty() {
            result.add_warning(
                "dashboard.default_cities",
                "No default cities - the grid may be empty without a location",
            );
        }

        let cities = self
            .dashboard
            .default_cities
            .iter()
            .chain(self.dashboard.location.iter());
        for city in cities {
            if !(-90.0..=90.0).contains(&city.lat) || !(-180.0..=180.0).contains(&city.lon) {
                result.add_error(
                    "dashboard.default_cities",
                    format!("Coordinates out of range for {}", city.name),
                );
            }
        }

        if self.dashboard.geolocation_timeout_ms == 0 {
            result.add_error(
                "dashboard.geolocation_timeout_ms",
                "Geolocation timeout must be greater than 0",
            );
        }

        if self.dashboard.recent_search_limit == 0 {
            result.add_warning(
                "dashboard.recent_search_limit",
                "Recent searches disabled (limit 0)",
            );
        }

        if self.offline.enabled {
            self.validate_url(&self.offline.origin, "offline.origin", &mut result);

            if self.offline.cache_name.trim().is_empty() {
                result.add_error("offline.cache_name", "Cache name must not be empty");
            }

            for path in self
                .offline
                .app_shell
                .iter()
                .chain(self.offline.static_prefixes.iter())
            {
                if !path.starts_with('/') {
                    result.add_error(
                        "offline.app_shell",
                        format!("Path must start with '/': {}", path),
                    );
                }
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("no user config directory".into()))?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}
