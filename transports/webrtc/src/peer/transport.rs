//! RTC transport capability
//!
//! The media transport (ICE, DTLS, SRTP, SDP) is consumed through these
//! traits. A transport reports back through a [`TransportObserver`], which it
//! may call from any task but never concurrently for the same connection.

use crate::signaling::protocol::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use dbmeter_core::FrameReceiver;
use std::sync::Arc;

/// Media kind of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Connection state reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    /// Temporarily lost; may still recover
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// The transport will never carry media again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

/// A remote track announced by the transport
#[derive(Debug)]
pub struct IncomingTrack {
    /// Track identifier from the remote description
    pub id: String,
    /// Audio or video
    pub kind: TrackKind,
    /// Decoded frames, present for video tracks only
    pub frames: Option<FrameReceiver>,
}

impl IncomingTrack {
    /// A video track delivering `frames`
    pub fn video(id: impl Into<String>, frames: FrameReceiver) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
            frames: Some(frames),
        }
    }

    /// An audio track (no frames are delivered)
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
            frames: None,
        }
    }
}

/// STUN/TURN server handed to a transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl IceServer {
    /// Unauthenticated STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Receives transport events for one connection
pub trait TransportObserver: Send + Sync {
    /// A remote track was received
    fn on_track(&self, track: IncomingTrack);

    /// The connection state changed
    fn on_state_change(&self, state: TransportState);
}

/// One negotiated media connection
#[async_trait]
pub trait RtcTransport: Send + Sync {
    /// Apply the remote offer and produce the local answer
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Add a trickled remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// Builds transports for new sessions
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport for `session_id` that reports to `observer`
    async fn create(
        &self,
        session_id: &str,
        ice_servers: &[IceServer],
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn RtcTransport>>;
}
