use thiserror::Error;

/// Failures seen by the transport-facing services.
///
/// None of these cross the controller boundary: REST failures become
/// "no change", channel failures become a `Disconnected` transition.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("push channel error: {0}")]
    Channel(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
