//! Browser signaling
//!
//! JSON messages over a WebSocket bootstrap the media transport and carry
//! recognized readings back to the browser.

pub mod protocol;
pub mod session;
pub mod websocket;

pub use protocol::{IceCandidate, Inbound, SessionDescription, SignalingMessage};
pub use session::{SessionState, SignalingSession};
pub use websocket::{WebSocketServerHandle, WebSocketSignalingServer};
