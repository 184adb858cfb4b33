//! Error types for AasanaIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// AasanaIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Configuration is well-formed but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Packet serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol or socket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// Collector closed the connection (or it was closed locally)
    #[error("Connection closed")]
    ConnectionClosed,

    /// Sensor read failed
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Error::ConnectionClosed
            }
            other => Error::WebSocket(Box::new(other)),
        }
    }
}
