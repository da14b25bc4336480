//! Media handling for received tracks
//!
//! Video tracks are turned into decoded frames for the frame pipeline; audio
//! is never decoded.

pub mod video;

pub use video::{run_decoder, spawn_video_source, DecodedFrame, FrameDecoder};
