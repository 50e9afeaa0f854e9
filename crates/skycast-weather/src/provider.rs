//! OpenWeather API client with per-endpoint memoization.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::cache::{CacheKey, ResponseCache};
use crate::transport::{HttpTransport, Transport};
use crate::types::{AirPollution, CurrentWeather, Forecast, NearbyCities, OneCall, Units, WeatherError};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Where and how to reach the provider.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub units: Units,
}

impl ApiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            units: Units::Metric,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }
}

/// Typed client for the weather provider.
///
/// Owns its response cache; clones of the client are not shared, wrap it in
/// an `Arc` to share one cache between tasks.
#[derive(Debug)]
pub struct WeatherClient<T: Transport = HttpTransport> {
    transport: T,
    base_url: Url,
    api_key: String,
    units: Units,
    cache: ResponseCache,
}

impl WeatherClient<HttpTransport> {
    /// Client over plain HTTP with the default 5 minute cache.
    pub fn new(settings: ApiSettings) -> Result<Self, WeatherError> {
        let transport = HttpTransport::new(Duration::from_secs(10))?;
        Self::with_transport(transport, settings, ResponseCache::new(DEFAULT_TTL))
    }
}

impl<T: Transport> WeatherClient<T> {
    pub fn with_transport(
        transport: T,
        settings: ApiSettings,
        cache: ResponseCache,
    ) -> Result<Self, WeatherError> {
        let base_url = Url::parse(&settings.base_url)?;
        Ok(Self {
            transport,
            base_url,
            api_key: settings.api_key,
            units: settings.units,
            cache,
        })
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Forget every memoized response.
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("API cache cleared");
    }

    /// Current conditions at a coordinate.
    #[instrument(skip(self), level = "debug")]
    pub async fn current_weather(&self, lat: f64, lon: f64) -> Result<Arc<CurrentWeather>, WeatherError> {
        let key = CacheKey::coords("current", lat, lon).with_units(self.units);
        self.cache
            .current
            .memoize(key.as_str(), || async {
                let url = self.url("/data/2.5/weather", &coords(lat, lon), true)?;
                self.fetch_json::<CurrentWeather>("Current weather", &url)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// 5 day forecast in 3 hour steps.
    #[instrument(skip(self), level = "debug")]
    pub async fn forecast(&self, lat: f64, lon: f64) -> Result<Arc<Forecast>, WeatherError> {
        let key = CacheKey::coords("fc", lat, lon).with_units(self.units);
        self.cache
            .forecast
            .memoize(key.as_str(), || async {
                let url = self.url("/data/2.5/forecast", &coords(lat, lon), true)?;
                self.fetch_json::<Forecast>("Forecast", &url).await.map(Arc::new)
            })
            .await
    }

    /// Air quality index and pollutant concentrations.
    #[instrument(skip(self), level = "debug")]
    pub async fn air_pollution(&self, lat: f64, lon: f64) -> Result<Arc<AirPollution>, WeatherError> {
        let key = CacheKey::coords("air", lat, lon);
        self.cache
            .air
            .memoize(key.as_str(), || async {
                let url = self.url("/data/2.5/air_pollution", &coords(lat, lon), false)?;
                self.fetch_json::<AirPollution>("Air pollution", &url)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Cities around a coordinate. Not memoized.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_nearby(&self, lat: f64, lon: f64, count: u32) -> Result<NearbyCities, WeatherError> {
        let mut params = coords(lat, lon);
        params.push(("cnt", count.to_string()));
        let url = self.url("/data/2.5/find", &params, true)?;
        self.fetch_json("Find nearby cities", &url).await
    }

    /// Timezone name and offset (one-call, current block only).
    #[instrument(skip(self), level = "debug")]
    pub async fn timezone(&self, lat: f64, lon: f64) -> Result<Arc<OneCall>, WeatherError> {
        let key = CacheKey::coords("timezone", lat, lon);
        self.one_call(key, "Timezone", lat, lon, "minutely,hourly,daily,alerts", false)
            .await
    }

    /// Daily forecast (one-call, daily block only).
    #[instrument(skip(self), level = "debug")]
    pub async fn daily_forecast(&self, lat: f64, lon: f64) -> Result<Arc<OneCall>, WeatherError> {
        let key = CacheKey::coords("daily", lat, lon).with_units(self.units);
        self.one_call(key, "Daily forecast", lat, lon, "current,minutely,hourly,alerts", true)
            .await
    }

    /// Active weather alerts (one-call, alerts block only).
    #[instrument(skip(self), level = "debug")]
    pub async fn weather_alerts(&self, lat: f64, lon: f64) -> Result<Arc<OneCall>, WeatherError> {
        let key = CacheKey::coords("alerts", lat, lon);
        self.one_call(key, "Weather alerts", lat, lon, "current,minutely,hourly,daily", false)
            .await
    }

    /// Readings at a past unix timestamp.
    #[instrument(skip(self), level = "debug")]
    pub async fn historical_weather(
        &self,
        lat: f64,
        lon: f64,
        timestamp: i64,
    ) -> Result<Arc<OneCall>, WeatherError> {
        let key = CacheKey::coords("hist", lat, lon)
            .with_suffix(timestamp)
            .with_units(self.units);
        self.cache
            .one_call
            .memoize(key.as_str(), || async {
                let mut params = coords(lat, lon);
                params.push(("dt", timestamp.to_string()));
                let url = self.url("/data/2.5/onecall/timemachine", &params, true)?;
                self.fetch_json::<OneCall>("Historical weather", &url)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    async fn one_call(
        &self,
        key: CacheKey,
        endpoint: &'static str,
        lat: f64,
        lon: f64,
        exclude: &str,
        with_units: bool,
    ) -> Result<Arc<OneCall>, WeatherError> {
        self.cache
            .one_call
            .memoize(key.as_str(), || async {
                let mut params = coords(lat, lon);
                params.push(("exclude", exclude.to_string()));
                let url = self.url("/data/2.5/onecall", &params, with_units)?;
                self.fetch_json::<OneCall>(endpoint, &url).await.map(Arc::new)
            })
            .await
    }

    /// Build an endpoint URL with the API key (and units, when asked) appended.
    pub(crate) fn url(
        &self,
        path: &str,
        params: &[(&str, String)],
        with_units: bool,
    ) -> Result<Url, WeatherError> {
        let mut url = self.base_url.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            if with_units {
                query.append_pair("units", self.units.as_query());
            }
            query.append_pair("appid", &self.api_key);
        }
        Ok(url)
    }

    /// GET `url` and parse the body as `R`, mapping status codes to typed errors.
    pub(crate) async fn fetch_json<R: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &Url,
    ) -> Result<R, WeatherError> {
        let response = self.transport.get(url).await.map_err(|e| {
            tracing::error!("{} request failed: {}", endpoint, e);
            e
        })?;

        if response.status == 401 {
            return Err(WeatherError::InvalidApiKey);
        }

        if !response.is_success() {
            tracing::warn!(
                "{} request failed with status: {}",
                endpoint,
                response.status
            );
            return Err(WeatherError::Status {
                endpoint,
                status: response.status,
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| WeatherError::Parse {
            endpoint,
            message: e.to_string(),
        })
    }
}

fn coords(lat: f64, lon: f64) -> Vec<(&'static str, String)> {
    vec![("lat", lat.to_string()), ("lon", lon.to_string())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn london_current() -> serde_json::Value {
        serde_json::json!({
            "coord": {"lon": -0.1278, "lat": 51.5074},
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {"temp": 11.3, "feels_like": 10.2, "pressure": 1008, "humidity": 81},
            "wind": {"speed": 5.1, "deg": 200},
            "rain": {"1h": 0.4},
            "dt": 1700000000,
            "sys": {"country": "GB", "sunrise": 1699945000, "sunset": 1699978000},
            "timezone": 0,
            "name": "London"
        })
    }

    fn client(server: &MockServer, clock: &ManualClock) -> WeatherClient {
        let settings = ApiSettings::new("test-key").with_base_url(server.uri());
        WeatherClient::with_transport(
            HttpTransport::new(Duration::from_secs(5)).unwrap(),
            settings,
            ResponseCache::with_clock(DEFAULT_TTL, Arc::new(clock.clone())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_current_weather_memoized_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("lat", "51.5074"))
            .and(query_param("lon", "-0.1278"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
            .expect(2)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        let first = client.current_weather(51.5074, -0.1278).await.unwrap();
        clock.advance(Duration::from_secs(4 * 60));
        let second = client.current_weather(51.5074, -0.1278).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(client.cache().current.contains("current:51.5074,-0.1278"));

        // 5 minutes and 1 second after the first fetch
        clock.advance(Duration::from_secs(61));
        let third = client.current_weather(51.5074, -0.1278).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.name, "London");
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london_current()))
            .expect(2)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        client.current_weather(51.5074, -0.1278).await.unwrap();
        client.clear_cache();
        client.current_weather(51.5074, -0.1278).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        for _ in 0..2 {
            let result = client.air_pollution(1.0, 2.0).await;
            assert!(matches!(
                result,
                Err(WeatherError::Status { status: 503, .. })
            ));
        }
        assert!(client.cache().air.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_invalid_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        let result = client.forecast(1.0, 2.0).await;
        assert!(matches!(result, Err(WeatherError::InvalidApiKey)));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"cod": 200})),
            )
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        let result = client.current_weather(1.0, 2.0).await;
        assert!(matches!(
            result,
            Err(WeatherError::Parse { endpoint: "Current weather", .. })
        ));
    }

    #[tokio::test]
    async fn test_find_nearby_is_not_memoized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/find"))
            .and(query_param("cnt", "12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [
                    {"id": 1, "name": "Camden Town", "coord": {"lat": 51.54, "lon": -0.14}},
                    {"id": 2, "name": "Islington", "coord": {"lat": 51.53, "lon": -0.10}}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        for _ in 0..2 {
            let nearby = client.find_nearby(51.5, -0.12, 12).await.unwrap();
            assert_eq!(nearby.list.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_one_call_variants_use_distinct_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lat": 1.0, "lon": 2.0, "timezone": "Etc/GMT", "timezone_offset": 0
            })))
            .expect(3)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        client.timezone(1.0, 2.0).await.unwrap();
        client.daily_forecast(1.0, 2.0).await.unwrap();
        client.weather_alerts(1.0, 2.0).await.unwrap();
        // All three now served from cache
        client.timezone(1.0, 2.0).await.unwrap();
        client.daily_forecast(1.0, 2.0).await.unwrap();
        client.weather_alerts(1.0, 2.0).await.unwrap();

        assert_eq!(client.cache().one_call.len(), 3);
    }

    #[tokio::test]
    async fn test_historical_keyed_by_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall/timemachine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lat": 1.0, "lon": 2.0,
                "data": [{"dt": 1600000000, "temp": 20.5}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let client = client(&server, &clock);

        client.historical_weather(1.0, 2.0, 1_600_000_000).await.unwrap();
        client.historical_weather(1.0, 2.0, 1_600_000_000).await.unwrap();
        let other = client.historical_weather(1.0, 2.0, 1_600_003_600).await.unwrap();
        assert_eq!(other.data.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_url_carries_key_and_units() {
        let settings = ApiSettings::new("k").with_units(Units::Imperial);
        let client = WeatherClient::with_transport(
            HttpTransport::new(Duration::from_secs(1)).unwrap(),
            settings,
            ResponseCache::new(DEFAULT_TTL),
        )
        .unwrap();

        let url = client
            .url("/data/2.5/weather", &coords(10.5, -3.25), true)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.openweathermap.org/data/2.5/weather?lat=10.5&lon=-3.25&units=imperial&appid=k"
        );
    }
}
