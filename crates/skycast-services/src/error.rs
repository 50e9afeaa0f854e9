use skycast_core::{AppError, NetworkError, ReqwestErrorExt};
use skycast_weather::WeatherError;
use thiserror::Error;

/// Preference store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        use skycast_core::StorageError;
        match err {
            StoreError::Io(e) => AppError::Storage(StorageError::WriteFailed(e.to_string())),
            StoreError::Serialization(e) => AppError::Storage(StorageError::Corrupt(e.to_string())),
        }
    }
}

/// Map a weather client error onto the application error hierarchy.
pub fn to_app_error(err: WeatherError) -> AppError {
    use skycast_core::WeatherError as Core;
    match err {
        WeatherError::Network(e) => AppError::Network(e.into_network_error()),
        WeatherError::Transport(message) => AppError::Network(NetworkError::Offline(message)),
        WeatherError::Status { endpoint, status } => AppError::Network(NetworkError::ServerError {
            status,
            message: format!("{} request failed", endpoint),
        }),
        WeatherError::InvalidApiKey => AppError::Weather(Core::InvalidApiKey),
        WeatherError::Parse { endpoint, message } => AppError::Network(
            NetworkError::InvalidResponse(format!("{}: {}", endpoint, message)),
        ),
        WeatherError::Url(e) => AppError::Weather(Core::ApiError(e.to_string())),
        WeatherError::Location(e) => AppError::Weather(Core::LocationNotFound(e.to_string())),
    }
}
