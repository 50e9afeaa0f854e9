//! Integration tests for the dashboard against a mock weather API.

use std::sync::Arc;
use std::time::Duration;

use skycast_core::DashboardConfig;
use skycast_services::{Dashboard, NoticeLevel, PreferenceStore, RecentSearches};
use skycast_weather::{
    ApiSettings, FixedLocation, HttpTransport, Location, LocationProvider, NoLocation,
    ResponseCache, WeatherClient, DEFAULT_TTL,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a current weather JSON
fn weather_json(name: &str, country: &str) -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": 0.0, "lat": 0.0},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 18.5, "humidity": 60},
        "wind": {"speed": 4.1, "deg": 270.0},
        "dt": 1700000000,
        "sys": {"country": country, "sunrise": 1699945000, "sunset": 1699980000},
        "timezone": 0,
        "name": name
    })
}

fn place_json(name: &str, country: &str, lat: f64, lon: f64) -> serde_json::Value {
    serde_json::json!({"name": name, "lat": lat, "lon": lon, "country": country})
}

fn client(server: &MockServer) -> Arc<WeatherClient<HttpTransport>> {
    let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
    let client = WeatherClient::with_transport(
        transport,
        ApiSettings::new("test-key").with_base_url(server.uri()),
        ResponseCache::new(DEFAULT_TTL),
    )
    .unwrap();
    Arc::new(client)
}

fn dashboard<L: LocationProvider>(
    server: &MockServer,
    locator: L,
    store: PreferenceStore,
    config: DashboardConfig,
) -> Dashboard<HttpTransport, L> {
    Dashboard::new(client(server), locator, store, config)
}

async fn mount_any_weather(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_json("Somewhere", "GB")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_default_cities_without_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_json("Somewhere", "GB")))
        .expect(6)
        .mount(&server)
        .await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    assert_eq!(dash.load_initial_cities().await, 6);

    let names: Vec<String> = dash.cards().into_iter().map(|c| c.name).collect();
    for city in ["London", "New York", "Tokyo", "Mexico City", "Sydney", "Paris"] {
        assert!(names.iter().any(|n| n == city), "missing {}", city);
    }
    assert!(dash.take_notices().is_empty());
}

#[tokio::test]
async fn test_one_failing_city_does_not_block_the_rest() {
    let server = MockServer::start().await;
    // Registered first so it wins over the catch-all below
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "35.6762"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_any_weather(&server).await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    assert_eq!(dash.load_initial_cities().await, 5);
    assert!(dash.cards().iter().all(|c| c.name != "Tokyo"));

    let notices = dash.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(notices[0].message.starts_with("Could not load weather for Tokyo"));
}

#[tokio::test]
async fn test_user_location_with_nearby_cities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([place_json("New York", "US", 40.71, -74.0)])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/find"))
        .and(query_param("cnt", "12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": [
                {"id": 1, "name": "Hoboken", "coord": {"lat": 40.744, "lon": -74.032}},
                {"id": 2, "name": "Hoboken", "coord": {"lat": 40.745, "lon": -74.031}},
                {"id": 3, "name": "Jersey City", "coord": {"lat": 40.728, "lon": -74.077}},
                {"id": 4, "name": "Newark", "coord": {"lat": 40.735, "lon": -74.172}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_any_weather(&server).await;

    let config = DashboardConfig {
        max_nearby_cities: 2,
        ..DashboardConfig::default()
    };
    let dash = dashboard(
        &server,
        FixedLocation::new(Location::new(40.7128, -74.006)),
        PreferenceStore::in_memory(),
        config,
    );

    assert_eq!(dash.load_initial_cities().await, 3);

    let mut names: Vec<String> = dash.cards().into_iter().map(|c| c.name).collect();
    names.sort();
    assert_eq!(names, vec!["Hoboken", "Jersey City", "New York"]);
}

#[tokio::test]
async fn test_failed_reverse_geocode_falls_back_to_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_any_weather(&server).await;

    let dash = dashboard(
        &server,
        FixedLocation::new(Location::new(40.7128, -74.006)),
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    assert_eq!(dash.load_initial_cities().await, 6);
}

#[tokio::test]
async fn test_search_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    assert!(dash.search("Atlantis").await.is_none());
    assert!(dash.search("   ").await.is_none());

    let notices = dash.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].message,
        "City \"Atlantis\" not found. Please try another search."
    );
    assert!(dash.recent_searches().is_empty());
}

#[tokio::test]
async fn test_search_adds_card_and_persists_recent_searches() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let cities = [
        ("Lisbon", 38.72, -9.14),
        ("Madrid", 40.42, -3.70),
        ("Rome", 41.90, 12.50),
        ("Berlin", 52.52, 13.40),
        ("Vienna", 48.21, 16.37),
        ("Prague", 50.08, 14.44),
    ];
    for (name, lat, lon) in cities {
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", name))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([place_json(name, "EU", lat, lon)])),
            )
            .mount(&server)
            .await;
    }
    mount_any_weather(&server).await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::open(dir.path()),
        DashboardConfig::default(),
    );

    let card = dash.search("Lisbon").await.unwrap();
    assert_eq!(card.name, "Lisbon");
    assert_eq!(card.id, "Lisbon-gb");
    assert_eq!(dash.cards().len(), 1);

    // Searching again refreshes the same card and leaves the history alone
    dash.search("Lisbon").await.unwrap();
    assert_eq!(dash.cards().len(), 1);
    assert_eq!(dash.recent_searches().len(), 1);

    for (name, _, _) in &cities[1..] {
        dash.search(name).await.unwrap();
    }
    let recent = dash.recent_searches();
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].name, "Prague");
    assert!(recent.iter().all(|r| r.name != "Lisbon"));

    // A fresh store over the same directory sees the same history
    let reopened = PreferenceStore::open(dir.path());
    let loaded = RecentSearches::load(&reopened, 5);
    let names: Vec<&str> = loaded.items().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Prague", "Vienna", "Berlin", "Rome", "Madrid"]);
}

#[tokio::test]
async fn test_refresh_all_refetches_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_json("Somewhere", "GB")))
        .expect(12)
        .mount(&server)
        .await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    assert_eq!(dash.load_initial_cities().await, 6);
    assert_eq!(dash.generation(), 0);

    assert_eq!(dash.refresh_all().await, 6);
    assert_eq!(dash.generation(), 1);

    let notices = dash.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert_eq!(notices[0].message, "Refreshing weather data...");
}

async fn mount_oslo_search(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Oslo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([place_json("Oslo", "NO", 59.9139, 10.7522)])),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_search_finishing_after_refresh_is_discarded() {
    let server = MockServer::start().await;
    mount_oslo_search(&server).await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "59.9139"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(weather_json("Oslo", "NO"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    mount_any_weather(&server).await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    let (found, count) = tokio::join!(dash.search("Oslo"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dash.refresh_all().await
    });

    assert!(found.is_none());
    assert_eq!(count, 6);
    assert_eq!(dash.generation(), 1);
    assert!(dash.cards().iter().all(|c| c.name != "Oslo"));
    assert!(dash.recent_searches().is_empty());
}

#[tokio::test]
async fn test_stale_failure_is_not_reported() {
    let server = MockServer::start().await;
    mount_oslo_search(&server).await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "59.9139"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    mount_any_weather(&server).await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );

    let (found, _) = tokio::join!(dash.search("Oslo"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dash.refresh_all().await
    });

    assert!(found.is_none());
    let notices = dash.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
}

#[tokio::test]
async fn test_forecast_for_card() {
    let server = MockServer::start().await;
    mount_any_weather(&server).await;

    let list: Vec<serde_json::Value> = (0..48)
        .map(|i| {
            let dt = 1700006400 + i * 3 * 3600;
            serde_json::json!({
                "dt": dt,
                "main": {"temp": 10.0 + i as f64 * 0.1, "humidity": 70},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
                "wind": {"speed": 5.0, "deg": 180.0},
                "rain": {"3h": 0.4}
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "list": list,
            "city": {"name": "London", "country": "GB", "timezone": 0}
        })))
        .mount(&server)
        .await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );
    dash.load_initial_cities().await;
    let card = dash
        .cards()
        .into_iter()
        .find(|c| c.name == "London")
        .unwrap();

    let view = dash.open_forecast(&card).await.unwrap();
    assert_eq!(view.city_name, "London");
    assert_eq!(view.days.len(), 5);
}

#[tokio::test]
async fn test_forecast_failure_becomes_notice() {
    let server = MockServer::start().await;
    mount_any_weather(&server).await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dash = dashboard(
        &server,
        NoLocation,
        PreferenceStore::in_memory(),
        DashboardConfig::default(),
    );
    dash.load_initial_cities().await;
    let card = dash.cards().remove(0);

    assert!(dash.open_forecast(&card).await.is_none());
    let notices = dash.take_notices();
    assert_eq!(
        notices[0].message,
        "Could not load forecast. Please try again later."
    );
}
