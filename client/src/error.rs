use shared::FrameError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("credential request failed: {0}")]
    CredentialFetch(#[from] reqwest::Error),
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("invalid origin header: {0}")]
    InvalidOrigin(#[from] tungstenite::http::header::InvalidHeaderValue),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server token expired")]
    TokenExpired,
    #[error(transparent)]
    Frame(#[from] FrameError),
}
