//! Outbound fetches made by the proxy.

use std::future::Future;
use std::time::Duration;

use reqwest::{header, Client, Method};
use url::Url;

use crate::error::OfflineError;

/// A request seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}

/// A response as fetched or as stored in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn ok(content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(String::from),
            body: body.into(),
        }
    }
}

/// Performs real fetches on the proxy's behalf.
pub trait Network: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &ProxyRequest,
    ) -> impl Future<Output = Result<StoredResponse, OfflineError>> + Send;
}

/// `Network` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, OfflineError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("SkyCast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OfflineError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<StoredResponse, OfflineError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| OfflineError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response
            .bytes()
            .await
            .map_err(|e| OfflineError::Network(e.to_string()))?
            .to_vec();

        Ok(StoredResponse {
            status,
            content_type,
            body,
        })
    }
}
