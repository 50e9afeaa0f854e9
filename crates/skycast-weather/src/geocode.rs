//! Forward and reverse geocoding through the provider's geo endpoints.

use tracing::instrument;

use crate::provider::WeatherClient;
use crate::transport::Transport;
use crate::types::{GeoLocation, WeatherError};

const DIRECT_LIMIT: u32 = 5;

impl GeoLocation {
    /// Place name with a state or country suffix for disambiguation (e.g. "Portland, Oregon").
    pub fn display_name(&self) -> String {
        let suffix = self
            .state
            .as_deref()
            .filter(|s| !s.is_empty() && *s != self.name)
            .or_else(|| {
                self.country
                    .as_deref()
                    .filter(|c| !c.is_empty() && *c != self.name)
            });

        match suffix {
            Some(s) => format!("{}, {}", self.name, s),
            None => self.name.clone(),
        }
    }
}

impl<T: Transport> WeatherClient<T> {
    /// Look up places matching `query`. No match is an empty list, not an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn geocode(&self, query: &str) -> Result<Vec<GeoLocation>, WeatherError> {
        let params = [
            ("q", query.to_string()),
            ("limit", DIRECT_LIMIT.to_string()),
        ];
        let url = self.url("/geo/1.0/direct", &params, false)?;
        let results: Vec<GeoLocation> = self.fetch_json("Geocoding", &url).await?;

        if results.is_empty() {
            tracing::warn!("No locations found for query: {}", query);
        }

        Ok(results)
    }

    /// Nearest named place for a coordinate, if the provider knows one.
    #[instrument(skip(self), level = "debug")]
    pub async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<GeoLocation>, WeatherError> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("limit", "1".to_string()),
        ];
        let url = self.url("/geo/1.0/reverse", &params, false)?;
        let results: Vec<GeoLocation> = self.fetch_json("Reverse geocoding", &url).await?;

        let place = results.into_iter().next();
        match &place {
            Some(p) => tracing::info!("Reverse geocoded to: {}", p.display_name()),
            None => tracing::debug!("Reverse geocode found nothing at {},{}", lat, lon),
        }
        Ok(place)
    }
}
