//! Request classification for the offline proxy.

use reqwest::Method;
use url::{Origin, Url};

use crate::network::ProxyRequest;

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve the stored copy if there is one, otherwise fetch and store.
    CacheFirst,
    /// Fetch and store; fall back to the stored copy when offline.
    NetworkFirst,
    /// Same as `NetworkFirst`, used for everything not matched by a route.
    NetworkFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Same-origin path, compared exactly
    ExactPath(String),
    /// Same-origin path prefix
    PathPrefix(String),
    /// Host of any origin, see [`host_matches`]
    Host(String),
}

impl RoutePattern {
    fn matches(&self, url: &Url, same_origin: bool) -> bool {
        match self {
            Self::ExactPath(path) => same_origin && url.path() == path,
            Self::PathPrefix(prefix) => same_origin && url.path().starts_with(prefix.as_str()),
            Self::Host(pattern) => url.host_str().is_some_and(|h| host_matches(pattern, h)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRoute {
    pub pattern: RoutePattern,
    pub strategy: Strategy,
}

impl RequestRoute {
    pub fn new(pattern: RoutePattern, strategy: Strategy) -> Self {
        Self { pattern, strategy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// The proxy has not been activated yet
    Inactive,
    /// Only GET requests are intercepted
    NotGet,
    /// Cross-origin request to a host that is not allow-listed
    NotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Intercept(Strategy),
    Passthrough(PassthroughReason),
}

/// Ordered routes plus the third-party allow-list. Immutable once built.
#[derive(Debug, Clone)]
pub struct RouteTable {
    origin: Origin,
    routes: Vec<RequestRoute>,
    allowed_hosts: Vec<String>,
}

impl RouteTable {
    pub fn new(origin: &Url) -> Self {
        Self {
            origin: origin.origin(),
            routes: Vec::new(),
            allowed_hosts: Vec::new(),
        }
    }

    /// Append a route. Earlier routes win.
    pub fn with_route(mut self, route: RequestRoute) -> Self {
        // Host routes also open the host for interception
        if let RoutePattern::Host(host) = &route.pattern {
            self.allowed_hosts.push(host.clone());
        }
        self.routes.push(route);
        self
    }

    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.push(host.into());
        self
    }

    pub fn routes(&self) -> &[RequestRoute] {
        &self.routes
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    fn is_allowed(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            self.allowed_hosts
                .iter()
                .any(|pattern| host_matches(pattern, host))
        })
    }

    /// Classify a request. The first matching rule wins.
    pub fn decide(&self, request: &ProxyRequest) -> RouteDecision {
        if request.method != Method::GET {
            return RouteDecision::Passthrough(PassthroughReason::NotGet);
        }

        let same_origin = self.is_same_origin(&request.url);
        if !same_origin && !self.is_allowed(&request.url) {
            return RouteDecision::Passthrough(PassthroughReason::NotAllowed);
        }

        let strategy = self
            .routes
            .iter()
            .find(|route| route.pattern.matches(&request.url, same_origin))
            .map_or(Strategy::NetworkFallback, |route| route.strategy);

        RouteDecision::Intercept(strategy)
    }
}

/// Match a host against a pattern.
///
/// A pattern with a dot matches that host or any subdomain of it. A pattern
/// without one matches any host containing it (`cdn` matches `cdn.jsdelivr.net`).
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    if pattern.contains('.') {
        host == pattern || host.ends_with(&format!(".{}", pattern))
    } else {
        host.contains(&pattern)
    }
}
