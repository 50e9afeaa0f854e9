use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Measurement units requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    /// Value of the `units` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }

    /// Temperature suffix for display
    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
            Self::Standard => "K",
        }
    }

    /// Wind speed unit for display
    pub fn speed_unit(&self) -> &'static str {
        match self {
            Self::Imperial => "mph",
            Self::Metric | Self::Standard => "m/s",
        }
    }
}

/// Weather condition categories mapped from provider condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert an OpenWeather condition id to WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_condition_id(id: i32) -> Self {
        match id {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            500 | 501 | 520 | 521 => Self::Rain,
            502..=504 | 522 | 531 => Self::HeavyRain,
            511 => Self::Sleet, // Freezing rain
            611..=616 => Self::Sleet,
            600..=610 | 617..=699 => Self::Snow,
            700..=799 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear, // Unknown ids default to clear
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }

    /// Get icon name
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::PartlyCloudy => "cloud-sun",
            Self::Cloudy => "clouds",
            Self::Fog => "smog",
            Self::Drizzle => "cloud-rain",
            Self::Rain => "cloud-rain",
            Self::HeavyRain => "cloud-showers-heavy",
            Self::Snow => "snowflake",
            Self::Sleet => "snowflake",
            Self::Thunderstorm => "bolt",
        }
    }
}

/// Geographic location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub city_name: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: None,
            city_name: None,
        }
    }
}

/// Latitude/longitude pair as returned by the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// One entry of the provider's `weather` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: i32,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

impl Condition {
    pub fn category(&self) -> WeatherCondition {
        WeatherCondition::from_condition_id(self.id)
    }
}

/// Temperature, pressure and humidity readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    pub humidity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
    #[serde(default)]
    pub gust: Option<f64>,
}

/// Rain or snow volume over the last 1h / 3h
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precipitation {
    #[serde(rename = "1h", default)]
    pub one_hour: Option<f64>,
    #[serde(rename = "3h", default)]
    pub three_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sys {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

/// Response of the current weather endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub coord: Coord,
    pub weather: Vec<Condition>,
    pub main: MainReadings,
    pub wind: Wind,
    #[serde(default)]
    pub visibility: Option<u32>,
    #[serde(default)]
    pub rain: Option<Precipitation>,
    #[serde(default)]
    pub snow: Option<Precipitation>,
    pub dt: i64,
    #[serde(default)]
    pub sys: Sys,
    /// Shift in seconds from UTC
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub name: String,
}

impl CurrentWeather {
    /// The primary condition, if the provider sent any
    pub fn condition(&self) -> Option<&Condition> {
        self.weather.first()
    }

    pub fn country_code(&self) -> Option<&str> {
        self.sys.country.as_deref()
    }
}

/// One 3-hour step of the forecast endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: MainReadings,
    pub weather: Vec<Condition>,
    pub wind: Wind,
    #[serde(default)]
    pub rain: Option<Precipitation>,
    /// Probability of precipitation, 0..1
    #[serde(default)]
    pub pop: Option<f64>,
    /// "YYYY-MM-DD HH:MM:SS" in UTC
    #[serde(default)]
    pub dt_txt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<i32>,
    #[serde(default)]
    pub coord: Option<Coord>,
}

/// Response of the 5 day / 3 hour forecast endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub list: Vec<ForecastEntry>,
    pub city: ForecastCity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityIndex {
    /// 1 (good) to 5 (very poor)
    pub aqi: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualitySample {
    pub dt: i64,
    pub main: AirQualityIndex,
    #[serde(default)]
    pub components: HashMap<String, f64>,
}

/// Response of the air pollution endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirPollution {
    pub list: Vec<AirQualitySample>,
}

impl AirPollution {
    /// AQI of the most recent sample
    pub fn aqi(&self) -> Option<u8> {
        self.list.first().map(|s| s.main.aqi)
    }
}

/// One city returned by the "find nearby" endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyCity {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyCities {
    #[serde(default)]
    pub list: Vec<NearbyCity>,
}

/// Result of direct or reverse geocoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    #[serde(default)]
    pub day: Option<f64>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneCallDaily {
    pub dt: i64,
    pub temp: DailyTemperature,
    #[serde(default)]
    pub humidity: Option<u8>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub weather: Vec<Condition>,
    #[serde(default)]
    pub pop: Option<f64>,
}

/// Point-in-time readings of the one-call and time-machine endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneCallReading {
    pub dt: i64,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub humidity: Option<u8>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    #[serde(default)]
    pub sender_name: String,
    pub event: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub description: String,
}

/// Response of the one-call family (timezone, daily, alerts, time machine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneCall {
    pub lat: f64,
    pub lon: f64,
    /// IANA timezone name
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub timezone_offset: Option<i32>,
    #[serde(default)]
    pub current: Option<OneCallReading>,
    #[serde(default)]
    pub daily: Option<Vec<OneCallDaily>>,
    #[serde(default)]
    pub alerts: Option<Vec<WeatherAlert>>,
    /// Time machine readings
    #[serde(default)]
    pub data: Option<Vec<OneCallReading>>,
}

/// Location service errors
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{endpoint} request failed with status: {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Parse error in {endpoint} response: {message}")]
    Parse {
        endpoint: &'static str,
        message: String,
    },
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Location error: {0}")]
    Location(#[from] LocationError),
}
