//! Sources of the user's current position.

use std::future::Future;
use std::time::Duration;

use crate::types::{Location, LocationError};

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Something that can report where the user is.
pub trait LocationProvider: Send + Sync + 'static {
    fn current_location(&self) -> impl Future<Output = Result<Location, LocationError>> + Send;
}

/// A position fixed in configuration.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    location: Location,
}

impl FixedLocation {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Result<Location, LocationError> {
        Ok(self.location.clone())
    }
}

/// No positioning available on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    async fn current_location(&self) -> Result<Location, LocationError> {
        Err(LocationError::ServiceUnavailable)
    }
}

/// Ask `provider` for a position, giving up after `timeout`.
pub async fn locate_with_timeout<P: LocationProvider>(
    provider: &P,
    timeout: Duration,
) -> Result<Location, LocationError> {
    match tokio::time::timeout(timeout, provider.current_location()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Location lookup timed out after {:?}", timeout);
            Err(LocationError::Timeout)
        }
    }
}
