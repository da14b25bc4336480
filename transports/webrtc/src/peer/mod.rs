//! Media transport for signaling sessions
//!
//! The capability traits, their webrtc-rs implementation, and the registry
//! that pairs each session's transport with its frame pipeline.

pub mod connection;
pub mod registry;
pub mod transport;

pub use connection::{WebRtcPeer, WebRtcTransportFactory};
pub use registry::{ConnectionHandle, ConnectionRegistry, SessionChannels};
pub use transport::{
    IceServer, IncomingTrack, RtcTransport, TrackKind, TransportFactory, TransportObserver,
    TransportState,
};
