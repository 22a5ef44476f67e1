use thiserror::Error;

/// Errors produced by the meteo core.
#[derive(Debug, Error)]
pub enum MeteoError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// The remote service answered with a non-success status.
    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Forecast payload could not be decoded or is structurally unusable.
    #[error("Malformed forecast: {0}")]
    MalformedForecast(String),

    /// Any other payload (e.g. geocoding) that could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A forecast series is shorter than the resolved hour index.
    #[error("Series '{series}' has {len} samples, index {index} is out of range")]
    IndexOutOfRange {
        series: &'static str,
        index: usize,
        len: usize,
    },

    /// The stored favorites blob exists but cannot be parsed.
    #[error("Stored favorites are corrupt: {0}")]
    PersistenceCorrupt(String),

    /// The key-value backend failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl MeteoError {
    /// True for failures caused by the remote side or the transport.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            MeteoError::Network(_)
                | MeteoError::Http { .. }
                | MeteoError::MalformedForecast(_)
                | MeteoError::MalformedResponse(_)
        )
    }
}

impl From<reqwest::Error> for MeteoError {
    fn from(err: reqwest::Error) -> Self {
        MeteoError::Network(err.to_string())
    }
}

pub type Result<T, E = MeteoError> = std::result::Result<T, E>;
