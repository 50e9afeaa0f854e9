//! Caching proxy between the app and the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use skycast_weather::{Transport, TransportResponse, WeatherError};

use crate::error::OfflineError;
use crate::network::{Network, ProxyRequest, StoredResponse};
use crate::route::{PassthroughReason, RequestRoute, RouteDecision, RoutePattern, RouteTable, Strategy};
use crate::storage::CacheStorage;

/// What the proxy caches and for whom.
#[derive(Debug, Clone)]
pub struct OfflineSettings {
    /// Version tag of the current bundle
    pub cache_name: String,
    /// Origin the app is served from
    pub origin: String,
    pub app_shell: Vec<String>,
    pub static_prefixes: Vec<String>,
    pub api_hosts: Vec<String>,
    pub allowed_hosts: Vec<String>,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            cache_name: "weather-dashboard-v3".to_string(),
            origin: "http://localhost:8080".to_string(),
            app_shell: [
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
            .map(String::from)
            .to_vec(),
            static_prefixes: vec!["/src/".to_string(), "/icons/".to_string()],
            api_hosts: vec!["openweathermap.org".to_string()],
            allowed_hosts: [
                "unpkg.com",
                "cdn",
                "fonts.googleapis.com",
                "fonts.gstatic.com",
                "flagcdn.com",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl OfflineSettings {
    /// Build the route table: app shell and static prefixes cache-first, API hosts network-first.
    pub fn route_table(&self) -> Result<RouteTable, OfflineError> {
        let origin = Url::parse(&self.origin)?;
        let mut table = RouteTable::new(&origin);

        for path in &self.app_shell {
            table = table.with_route(RequestRoute::new(
                RoutePattern::ExactPath(path.clone()),
                Strategy::CacheFirst,
            ));
        }
        for prefix in &self.static_prefixes {
            table = table.with_route(RequestRoute::new(
                RoutePattern::PathPrefix(prefix.clone()),
                Strategy::CacheFirst,
            ));
        }
        for host in &self.api_hosts {
            table = table.with_route(RequestRoute::new(
                RoutePattern::Host(host.clone()),
                Strategy::NetworkFirst,
            ));
        }
        for host in &self.allowed_hosts {
            table = table.allow_host(host.clone());
        }

        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub response: StoredResponse,
    pub source: ResponseSource,
}

impl ProxyResponse {
    fn network(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cache(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }
}

/// Intercepts GET requests and answers them from a versioned response bundle.
///
/// Until [`activate`](Self::activate) is called every request goes straight
/// to the network.
pub struct OfflineProxy<N: Network, S: CacheStorage> {
    network: N,
    storage: Arc<Mutex<S>>,
    routes: RouteTable,
    origin: Url,
    cache_name: String,
    app_shell: Vec<String>,
    active: AtomicBool,
}

impl<N: Network, S: CacheStorage> OfflineProxy<N, S> {
    pub fn new(network: N, storage: S, settings: &OfflineSettings) -> Result<Self, OfflineError> {
        Ok(Self {
            network,
            storage: Arc::new(Mutex::new(storage)),
            routes: settings.route_table()?,
            origin: Url::parse(&settings.origin)?,
            cache_name: settings.cache_name.clone(),
            app_shell: settings.app_shell.clone(),
            active: AtomicBool::new(false),
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fetch the whole app shell into the current bundle.
    ///
    /// Nothing is stored unless every path comes back 200.
    pub async fn install(&self) -> Result<(), OfflineError> {
        tracing::info!("Installing offline bundle {}", self.cache_name);

        let mut fetched = Vec::with_capacity(self.app_shell.len());
        for path in &self.app_shell {
            let url = self.origin.join(path)?;
            let response = self.network.fetch(&ProxyRequest::get(url.clone())).await?;
            if response.status != 200 {
                return Err(OfflineError::InstallFailed {
                    url: url.to_string(),
                    status: response.status,
                });
            }
            fetched.push((url.to_string(), response));
        }

        let bundle = self.cache_name.clone();
        let count = fetched.len();
        self.with_storage(move |storage| {
            for (url, response) in &fetched {
                storage.put(&bundle, url, response)?;
            }
            Ok(())
        })
        .await?;

        tracing::info!("Cached app shell ({} entries)", count);
        Ok(())
    }

    /// Drop every bundle but the current one and start intercepting.
    ///
    /// Returns the names of the deleted bundles.
    pub async fn activate(&self) -> Result<Vec<String>, OfflineError> {
        let current = self.cache_name.clone();
        let removed = self
            .with_storage(move |storage| {
                let mut removed = Vec::new();
                for name in storage.bundles()? {
                    if name != current && storage.delete_bundle(&name)? {
                        removed.push(name);
                    }
                }
                Ok(removed)
            })
            .await?;

        for name in &removed {
            tracing::info!("Removed old offline bundle {}", name);
        }

        self.active.store(true, Ordering::SeqCst);
        tracing::info!("Offline proxy active ({})", self.cache_name);
        Ok(removed)
    }

    /// How `request` would be handled right now.
    pub fn route(&self, request: &ProxyRequest) -> RouteDecision {
        if !self.is_active() {
            return RouteDecision::Passthrough(PassthroughReason::Inactive);
        }
        self.routes.decide(request)
    }

    pub async fn handle(&self, request: &ProxyRequest) -> Result<ProxyResponse, OfflineError> {
        let decision = self.route(request);
        tracing::debug!("{} {} -> {:?}", request.method, request.url, decision);

        match decision {
            RouteDecision::Passthrough(_) => {
                let response = self.network.fetch(request).await?;
                Ok(ProxyResponse::network(response))
            }
            RouteDecision::Intercept(Strategy::CacheFirst) => self.cache_first(request).await,
            RouteDecision::Intercept(Strategy::NetworkFirst | Strategy::NetworkFallback) => {
                self.network_first(request).await
            }
        }
    }

    /// Stored response for `url` in the current bundle.
    pub async fn cached(&self, url: &Url) -> Result<Option<StoredResponse>, OfflineError> {
        let bundle = self.cache_name.clone();
        let key = url.to_string();
        self.with_storage(move |storage| storage.get(&bundle, &key))
            .await
    }

    /// Names of all bundles in storage.
    pub async fn bundles(&self) -> Result<Vec<String>, OfflineError> {
        self.with_storage(|storage| storage.bundles()).await
    }

    async fn cache_first(&self, request: &ProxyRequest) -> Result<ProxyResponse, OfflineError> {
        if let Some(hit) = self.lookup(&request.url).await {
            tracing::debug!("Serving {} from cache", request.url);
            return Ok(ProxyResponse::cache(hit));
        }

        let response = self.network.fetch(request).await?;
        self.store(&request.url, &response).await;
        Ok(ProxyResponse::network(response))
    }

    async fn network_first(&self, request: &ProxyRequest) -> Result<ProxyResponse, OfflineError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(&request.url, &response).await;
                Ok(ProxyResponse::network(response))
            }
            Err(e) => {
                tracing::warn!("Network failed for {}: {}", request.url, e);
                match self.lookup(&request.url).await {
                    Some(hit) => Ok(ProxyResponse::cache(hit)),
                    None => Err(OfflineError::Unavailable(request.url.to_string())),
                }
            }
        }
    }

    /// Read from the current bundle. Storage faults read as a miss.
    async fn lookup(&self, url: &Url) -> Option<StoredResponse> {
        match self.cached(url).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::error!("Failed to read cached {}: {}", url, e);
                None
            }
        }
    }

    /// Write a 200 response into the current bundle. Failures are only logged.
    async fn store(&self, url: &Url, response: &StoredResponse) {
        if response.status != 200 {
            tracing::debug!("Not caching {} (status {})", url, response.status);
            return;
        }

        let bundle = self.cache_name.clone();
        let key = url.to_string();
        let copy = response.clone();
        if let Err(e) = self
            .with_storage(move |storage| storage.put(&bundle, &key, &copy))
            .await
        {
            tracing::error!("Failed to cache {}: {}", url, e);
        }
    }

    async fn with_storage<R, F>(&self, op: F) -> Result<R, OfflineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> Result<R, OfflineError> + Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || op(&mut storage.lock()))
            .await
            .map_err(|e| OfflineError::Task(e.to_string()))?
    }
}

impl<N: Network, S: CacheStorage> Transport for OfflineProxy<N, S> {
    async fn get(&self, url: &Url) -> Result<TransportResponse, WeatherError> {
        let result = self.handle(&ProxyRequest::get(url.clone())).await;
        match result {
            Ok(proxied) => Ok(TransportResponse {
                status: proxied.response.status,
                body: proxied.response.body,
            }),
            Err(e) => Err(WeatherError::Transport(e.to_string())),
        }
    }
}
