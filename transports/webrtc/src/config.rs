//! Configuration types for the DBMeter signaling server

use crate::peer::IceServer;
use dbmeter_core::{ExtractorConfig, ValidationRange};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Public STUN servers used when none are configured
pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// Main configuration for the signaling server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to (default: 0.0.0.0:8000)
    pub bind_address: String,

    /// Request path accepted for WebSocket upgrades (default: /webrtc-signaling)
    pub signaling_path: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Maximum concurrent sessions with a live transport (default: 64)
    pub max_sessions: usize,

    /// How long to wait for local ICE gathering before answering (default: 10s)
    pub ice_gathering_timeout_secs: u64,

    /// Per-connection number extraction settings
    pub extractor: ExtractorConfig,

    /// Tesseract executable used for recognition
    pub recognizer_program: String,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            signaling_path: "/webrtc-signaling".to_string(),
            stun_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            turn_servers: Vec::new(),
            max_sessions: 64,
            ice_gathering_timeout_secs: 10,
            extractor: ExtractorConfig::default(),
            recognizer_program: "tesseract".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `bind_address` is not a socket address
    /// - `signaling_path` does not start with `/`
    /// - no STUN server is configured, or a STUN/TURN URL has the wrong scheme
    /// - `max_sessions` is zero
    /// - the extractor configuration is invalid
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        self.socket_addr()?;

        if !self.signaling_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "signaling_path must start with '/', got {}",
                self.signaling_path
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }
        for url in &self.stun_servers {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server URL must start with stun: or stuns:, got {}",
                    url
                )));
            }
        }
        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server URL must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        if self.max_sessions == 0 {
            return Err(Error::InvalidConfig(
                "max_sessions must be at least 1".to_string(),
            ));
        }

        if self.recognizer_program.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "recognizer_program must not be empty".to_string(),
            ));
        }

        self.extractor.validate()?;

        Ok(())
    }

    /// Parsed listener address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        self.bind_address.parse().map_err(|e| {
            crate::Error::InvalidConfig(format!(
                "bind_address {} is not a socket address: {}",
                self.bind_address, e
            ))
        })
    }

    /// ICE gathering timeout as a `Duration`
    pub fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_secs(self.ice_gathering_timeout_secs)
    }

    /// STUN and TURN servers in the form handed to every new transport
    pub fn ice_servers(&self) -> Vec<IceServer> {
        self.stun_servers
            .iter()
            .map(|url| IceServer::stun(url.clone()))
            .chain(self.turn_servers.iter().map(|turn| IceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
            }))
            .collect()
    }

    /// Add TURN servers to the configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the accepted numeric range for every pipeline
    pub fn with_valid_range(mut self, range: ValidationRange) -> Self {
        self.extractor.valid_range = range;
        self
    }

    /// Set the detection interval for every pipeline
    pub fn with_detection_interval(mut self, interval: Duration) -> Self {
        self.extractor.detection_interval_secs = interval.as_secs_f64();
        self
    }

    /// Set the maximum number of concurrent sessions
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }
}
