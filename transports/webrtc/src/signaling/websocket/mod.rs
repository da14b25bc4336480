//! WebSocket signaling server
//!
//! Accepts WebSocket upgrades on the configured path and runs one
//! [`SignalingSession`](super::SignalingSession) per connection.

mod handler;
mod server;

pub use handler::SharedState;
pub use server::{WebSocketServerHandle, WebSocketSignalingServer};
