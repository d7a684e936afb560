use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid signaling URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Signaling connection closed")]
    SignalingClosed,

    #[error("Signaling handshake failed: {0}")]
    Handshake(String),

    #[error("Data channel to {0} is not open")]
    ChannelNotOpen(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),
}
