//! The seam between the weather client and the network.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::types::WeatherError;

const USER_AGENT: &str = concat!("SkyCast/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can perform a GET for the weather client.
///
/// Implemented for plain HTTP here and for the offline caching proxy in
/// `skycast-offline`.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: &Url) -> impl Future<Output = Result<TransportResponse, WeatherError>> + Send;
}

/// Direct HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, WeatherError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}
