//! Dashboard orchestration: which cities to show and keeping their cards current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use skycast_core::{AppError, CityConfig, DashboardConfig};
use skycast_weather::format::{flag_url, format_local_time, is_capital_city};
use skycast_weather::{
    locate_with_timeout, CurrentWeather, ForecastView, LocationProvider, Transport, WeatherClient,
    WeatherError, FORECAST_DAYS,
};

use crate::error::to_app_error;
use crate::store::{PreferenceStore, RecentSearch, RecentSearches};

const REFRESH_NOTICE: &str = "Refreshing weather data...";
const FORECAST_FAILED: &str = "Could not load forecast. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message for the user (toast or error banner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// View model for one city on the dashboard.
#[derive(Debug, Clone)]
pub struct CityCard {
    /// Name with whitespace runs replaced by dashes, then the lower-case country code
    pub id: String,
    pub name: String,
    pub country_code: String,
    pub lat: f64,
    pub lon: f64,
    pub flag_url: Option<String>,
    pub is_capital: bool,
    pub weather: Arc<CurrentWeather>,
    /// Local time in the city, e.g. "06:42 AM"
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

impl CityCard {
    fn build(city: &CityQuery, weather: Arc<CurrentWeather>) -> Self {
        let country_code = weather.country_code().unwrap_or_default().to_string();
        let id = format!(
            "{}-{}",
            city.name.split_whitespace().collect::<Vec<_>>().join("-"),
            country_code.to_lowercase()
        );
        let sunrise = weather
            .sys
            .sunrise
            .and_then(|t| format_local_time(t, weather.timezone));
        let sunset = weather
            .sys
            .sunset
            .and_then(|t| format_local_time(t, weather.timezone));

        Self {
            id,
            name: city.name.clone(),
            flag_url: (!country_code.is_empty()).then(|| flag_url(&country_code)),
            is_capital: is_capital_city(&city.name, &country_code),
            country_code,
            lat: city.lat,
            lon: city.lon,
            weather,
            sunrise,
            sunset,
        }
    }

    fn same_city(&self, other: &CityCard) -> bool {
        self.name == other.name && self.country_code == other.country_code
    }
}

#[derive(Debug, Clone)]
struct CityQuery {
    name: String,
    lat: f64,
    lon: f64,
}

impl From<&CityConfig> for CityQuery {
    fn from(city: &CityConfig) -> Self {
        Self {
            name: city.name.clone(),
            lat: city.lat,
            lon: city.lon,
        }
    }
}

struct DashboardState {
    cards: Vec<CityCard>,
    notices: Vec<Notice>,
    recent: RecentSearches,
}

/// Owns the list of city cards and coordinates every fetch that fills it.
///
/// Every load captures the current generation; results from an older
/// generation are dropped so a slow response cannot overwrite state after
/// [`refresh_all`](Self::refresh_all).
pub struct Dashboard<T: Transport, L: LocationProvider> {
    client: Arc<WeatherClient<T>>,
    locator: L,
    store: PreferenceStore,
    config: DashboardConfig,
    state: Mutex<DashboardState>,
    generation: AtomicU64,
}

impl<T: Transport, L: LocationProvider> Dashboard<T, L> {
    pub fn new(
        client: Arc<WeatherClient<T>>,
        locator: L,
        store: PreferenceStore,
        config: DashboardConfig,
    ) -> Self {
        let recent = RecentSearches::load(&store, config.recent_search_limit);
        tracing::info!(
            "Dashboard created ({} recent searches)",
            recent.items().len()
        );
        Self {
            client,
            locator,
            store,
            config,
            state: Mutex::new(DashboardState {
                cards: Vec::new(),
                notices: Vec::new(),
                recent,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &Arc<WeatherClient<T>> {
        &self.client
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn cards(&self) -> Vec<CityCard> {
        self.state.lock().cards.clone()
    }

    pub fn recent_searches(&self) -> Vec<RecentSearch> {
        self.state.lock().recent.items().to_vec()
    }

    /// Drain pending notices, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.state.lock().notices)
    }

    /// Fill the dashboard from the user's location, or the default cities.
    ///
    /// Returns the number of cards shown.
    pub async fn load_initial_cities(&self) -> usize {
        let generation = self.generation();

        let located = self.load_around_user(generation).await;
        if !located || self.state.lock().cards.is_empty() {
            tracing::info!("Loading default cities");
            let defaults = self.config.default_cities.iter().map(CityQuery::from).collect();
            self.fetch_cities(defaults, generation).await;
        }

        self.state.lock().cards.len()
    }

    /// Look up a city by name and add (or refresh) its card.
    pub async fn search(&self, query: &str) -> Option<CityCard> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let generation = self.generation();

        let matches = match self.client.geocode(query).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!("Search city error: {}", e);
                let err = to_app_error(e);
                self.notify(Notice::error(format!(
                    "Error searching for \"{}\": {}",
                    query,
                    err.user_message()
                )));
                return None;
            }
        };

        let Some(place) = matches.into_iter().next() else {
            self.notify(Notice::error(format!(
                "City \"{}\" not found. Please try another search.",
                query
            )));
            return None;
        };

        let city = CityQuery {
            name: place.name,
            lat: place.lat,
            lon: place.lon,
        };
        let card = self.process_city(city, generation).await?;
        self.remember_search(&card);
        Some(card)
    }

    /// Forecast for a card, grouped by day. Failures become a notice.
    pub async fn open_forecast(&self, card: &CityCard) -> Option<ForecastView> {
        match self.client.forecast(card.lat, card.lon).await {
            Ok(forecast) => Some(ForecastView::from_forecast(&forecast).truncate(FORECAST_DAYS)),
            Err(e) => {
                tracing::error!("Forecast error for {}: {}", card.name, e);
                self.notify(Notice::error(FORECAST_FAILED));
                None
            }
        }
    }

    /// Drop every card and cached response, then load again.
    pub async fn refresh_all(&self) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Refreshing dashboard (generation {})", generation);

        {
            let mut state = self.state.lock();
            state.cards.clear();
            state.notices.push(Notice::info(REFRESH_NOTICE));
        }
        self.client.clear_cache();

        self.load_initial_cities().await
    }

    /// User's own city plus nearby ones. False when no location is available.
    async fn load_around_user(&self, generation: u64) -> bool {
        let timeout = Duration::from_millis(self.config.geolocation_timeout_ms);
        let location = match locate_with_timeout(&self.locator, timeout).await {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!("Could not get user location: {}", e);
                return false;
            }
        };
        let (lat, lon) = (location.latitude, location.longitude);

        match self.client.reverse_geocode(lat, lon).await {
            Ok(Some(place)) => {
                let city = CityQuery {
                    name: place.name,
                    lat,
                    lon,
                };
                self.process_city(city, generation).await;
            }
            Ok(None) => tracing::debug!("No named place at the user's location"),
            Err(e) => {
                tracing::warn!("Could not get user location: {}", e);
                return false;
            }
        }

        match self
            .client
            .find_nearby(lat, lon, self.config.nearby_count)
            .await
        {
            Ok(nearby) => {
                let mut unique: Vec<CityQuery> = Vec::new();
                for city in nearby.list {
                    if !unique.iter().any(|c| c.name == city.name) {
                        unique.push(CityQuery {
                            name: city.name,
                            lat: city.coord.lat,
                            lon: city.coord.lon,
                        });
                    }
                }
                unique.truncate(self.config.max_nearby_cities);
                self.fetch_cities(unique, generation).await;
            }
            Err(e) => tracing::error!("Finding nearby cities error: {}", e),
        }

        true
    }

    /// Fetch all cities concurrently and apply each card as it arrives.
    async fn fetch_cities(&self, cities: Vec<CityQuery>, generation: u64) {
        let mut set = JoinSet::new();
        for city in cities {
            let client = self.client.clone();
            set.spawn(async move {
                let result = client.current_weather(city.lat, city.lon).await;
                (city, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((city, result)) => {
                    self.apply_result(&city, result, generation);
                }
                Err(e) => tracing::error!("City fetch task failed: {}", e),
            }
        }
    }

    async fn process_city(&self, city: CityQuery, generation: u64) -> Option<CityCard> {
        let result = self.client.current_weather(city.lat, city.lon).await;
        self.apply_result(&city, result, generation)
    }

    fn apply_result(
        &self,
        city: &CityQuery,
        result: Result<Arc<CurrentWeather>, WeatherError>,
        generation: u64,
    ) -> Option<CityCard> {
        match result {
            Ok(weather) => {
                let card = CityCard::build(city, weather);
                self.apply_card(card.clone(), generation).then_some(card)
            }
            Err(e) => {
                tracing::error!("Error processing data for {}: {}", city.name, e);
                if generation != self.generation() {
                    tracing::debug!("Not reporting stale failure for {}", city.name);
                    return None;
                }
                let err = to_app_error(e);
                self.notify(Notice::error(format!(
                    "Could not load weather for {}: {}",
                    city.name,
                    err.user_message()
                )));
                None
            }
        }
    }

    /// Insert or replace a card. Returns false when the card is from a stale generation.
    fn apply_card(&self, card: CityCard, generation: u64) -> bool {
        let mut state = self.state.lock();
        if generation != self.generation() {
            tracing::debug!("Discarding stale result for {} (generation {})", card.name, generation);
            return false;
        }

        match state.cards.iter_mut().find(|c| c.same_city(&card)) {
            Some(existing) => *existing = card,
            None => state.cards.push(card),
        }
        true
    }

    fn remember_search(&self, card: &CityCard) {
        let mut state = self.state.lock();
        let added = state.recent.record(RecentSearch {
            name: card.name.clone(),
            country: card.country_code.clone(),
            lat: card.lat,
            lon: card.lon,
        });
        if added {
            if let Err(e) = state.recent.persist(&self.store) {
                tracing::warn!("Recent searches not saved: {}", e);
                let err = AppError::from(e);
                state.notices.push(Notice {
                    level: NoticeLevel::Warning,
                    message: err.user_message().to_string(),
                });
            }
        }
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!("Notice: {}", notice.message);
        self.state.lock().notices.push(notice);
    }
}
