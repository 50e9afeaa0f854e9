use std::time::Duration;

use anyhow::Result;

use skycast_core::{Config, ConfigError};
use skycast_offline::{HttpNetwork, OfflineProxy, OfflineSettings, SqliteStorage};
use skycast_services::{Dashboard, PreferenceStore};
use skycast_weather::{
    ApiSettings, FixedLocation, HttpTransport, Location, LocationProvider, NoLocation,
    ResponseCache, Transport, Units, WeatherClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    skycast_core::init()?;

    let (config, _) = match Config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => {
            if let Some(config_err) = e.downcast_ref::<ConfigError>() {
                eprintln!("{}", config_err.user_message());
            }
            return Err(e);
        }
    };
    tracing::info!("SkyCast starting (config dir {})", config.config_dir.display());

    let timeout = Duration::from_secs(config.weather.request_timeout_secs);

    if config.offline.enabled {
        let proxy = OfflineProxy::new(
            HttpNetwork::new(timeout)?,
            SqliteStorage::open(config.storage.offline_db_path())?,
            &offline_settings(&config),
        )?;
        if let Err(e) = proxy.install().await {
            tracing::warn!("Offline bundle not installed: {}", e);
        }
        let removed = proxy.activate().await?;
        if !removed.is_empty() {
            tracing::info!("Removed old offline bundles: {:?}", removed);
        }
        run(proxy, &config).await
    } else {
        run(HttpTransport::new(timeout)?, &config).await
    }
}

async fn run<T: Transport>(transport: T, config: &Config) -> Result<()> {
    let settings = ApiSettings::new(config.weather.api_key.clone())
        .with_base_url(config.weather.api_base_url.clone())
        .with_units(units(config.weather.units));
    let cache = ResponseCache::new(Duration::from_secs(config.weather.cache_ttl_secs));
    let client = WeatherClient::with_transport(transport, settings, cache)?;

    let store = PreferenceStore::open(config.storage.preferences_dir());

    match &config.dashboard.location {
        Some(city) => {
            let mut location = Location::new(city.lat, city.lon);
            location.city_name = Some(city.name.clone());
            show(client, FixedLocation::new(location), store, config).await
        }
        None => show(client, NoLocation, store, config).await,
    }
}

async fn show<T: Transport, L: LocationProvider>(
    client: WeatherClient<T>,
    locator: L,
    store: PreferenceStore,
    config: &Config,
) -> Result<()> {
    let suffix = client.units().temperature_suffix();
    let dashboard = Dashboard::new(client.into(), locator, store, config.dashboard.clone());

    dashboard.load_initial_cities().await;

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !query.trim().is_empty() {
        if let Some(card) = dashboard.search(&query).await {
            if let Some(view) = dashboard.open_forecast(&card).await {
                println!("Forecast for {}:", view.city_name);
                for day in &view.days {
                    let description = day
                        .representative
                        .condition
                        .as_ref()
                        .map(|c| c.description.as_str())
                        .unwrap_or_default();
                    println!(
                        "  {}  {}{} / {}{}  {}",
                        day.date,
                        day.temp_min,
                        suffix,
                        day.temp_max,
                        suffix,
                        description
                    );
                }
                println!();
            }
        }
    }

    println!("SkyCast ({} cities)", dashboard.cards().len());
    for card in dashboard.cards() {
        let description = card
            .weather
            .condition()
            .map(|c| c.description.as_str())
            .unwrap_or_default();
        println!(
            "  {:<20} {:>3}  {:>6.1}{}  {}",
            card.name,
            card.country_code,
            card.weather.main.temp,
            suffix,
            description
        );
    }

    let recent = dashboard.recent_searches();
    if !recent.is_empty() {
        let names: Vec<&str> = recent.iter().map(|r| r.name.as_str()).collect();
        println!("Recent searches: {}", names.join(", "));
    }

    for notice in dashboard.take_notices() {
        eprintln!("[{:?}] {}", notice.level, notice.message);
    }

    Ok(())
}

fn units(units: skycast_core::Units) -> Units {
    match units {
        skycast_core::Units::Metric => Units::Metric,
        skycast_core::Units::Imperial => Units::Imperial,
        skycast_core::Units::Standard => Units::Standard,
    }
}

fn offline_settings(config: &Config) -> OfflineSettings {
    let offline = &config.offline;
    OfflineSettings {
        cache_name: offline.cache_name.clone(),
        origin: offline.origin.clone(),
        app_shell: offline.app_shell.clone(),
        static_prefixes: offline.static_prefixes.clone(),
        api_hosts: offline.api_hosts.clone(),
        allowed_hosts: offline.allowed_hosts.clone(),
    }
}
