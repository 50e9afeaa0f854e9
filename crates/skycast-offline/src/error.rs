use thiserror::Error;

/// Offline proxy errors
#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Network unavailable and nothing cached for {0}")]
    Unavailable(String),

    #[error("Install failed: {url} returned status {status}")]
    InstallFailed { url: String, status: u16 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl OfflineError {
    /// True when the failure came from the network rather than local state.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unavailable(_))
    }
}
