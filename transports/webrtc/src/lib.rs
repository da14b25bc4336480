//! WebRTC transport and signaling server for DBMeter
//!
//! A browser streams camera video over WebRTC; the server reads the numbers
//! shown on a meter display and streams them back over the signaling
//! WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Browser                                               │
//! │  ↓ WebSocket (JSON signaling)    ↓ WebRTC (video)      │
//! │  WebSocketSignalingServer                              │
//! │  └─ SignalingSession (one per WebSocket)               │
//! │     └─ ConnectionRegistry::create                      │
//! │        ├─ RtcTransport (WebRtcPeer)                    │
//! │        │   └─ video track → H.264 decode → frames      │
//! │        └─ dbmeter_core::FramePipeline                  │
//! │           └─ NumberExtractor → `numbers` message       │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use dbmeter_webrtc::ServerConfig;
//!
//! let config = ServerConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.signaling_path, "/webrtc-signaling");
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use dbmeter_core::TesseractCli;
//! use dbmeter_webrtc::{ConnectionRegistry, ServerConfig, WebRtcTransportFactory, WebSocketSignalingServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> dbmeter_webrtc::Result<()> {
//! let config = Arc::new(ServerConfig::default());
//! let registry = Arc::new(ConnectionRegistry::new(
//!     Arc::new(WebRtcTransportFactory::new(config.ice_gathering_timeout())),
//!     Arc::new(TesseractCli::new(&config.recognizer_program)),
//!     config.ice_servers(),
//!     config.extractor.clone(),
//!     config.max_sessions,
//! ));
//!
//! let server = WebSocketSignalingServer::new(config, registry).start().await?;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;

pub use config::{ServerConfig, TurnServerConfig, DEFAULT_STUN_SERVERS};
pub use error::{Error, Result};
pub use peer::{
    ConnectionHandle, ConnectionRegistry, IceServer, IncomingTrack, RtcTransport, SessionChannels,
    TrackKind, TransportFactory, TransportObserver, TransportState, WebRtcTransportFactory,
};
pub use signaling::{
    SessionState, SignalingMessage, SignalingSession, WebSocketServerHandle,
    WebSocketSignalingServer,
};
