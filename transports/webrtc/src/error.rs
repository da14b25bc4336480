//! Error types for the DBMeter WebRTC transport

/// Result type alias using WebRTC Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling and transport operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed or out-of-state signaling message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport creation failed or was refused
    #[error("Transport error: {0}")]
    Transport(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Cleanup failure while closing a session
    #[error("Teardown error: {0}")]
    Teardown(String),

    /// Session management error
    #[error("Session error: {0}")]
    SessionError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Frame pipeline or extractor error
    #[error(transparent)]
    Core(#[from] dbmeter_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error only concerns one signaling message
    ///
    /// Protocol errors are answered (or logged) and the connection stays open.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::SerializationError(_))
    }

    /// Check if this error must close the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::SdpError(_)
                | Error::WebRtcError(_)
                | Error::SessionError(_)
                | Error::Core(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocketError(err.to_string())
    }
}
