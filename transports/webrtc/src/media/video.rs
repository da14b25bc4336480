//! Video frame source (H.264)
//!
//! RTP packets read from a remote video track are reassembled into access
//! units with `SampleBuilder` and handed to a decoder thread, which numbers
//! every decoded picture and pushes it into the pipeline's frame channel.
//!
//! ```text
//!  TrackRemote ──read_rtp──► SampleBuilder ──access units──► decoder thread ──► FrameSample
//!  (async task)                                              (owns decoder)
//! ```
//!
//! The reader never waits for the decoder: at most `MAX_PENDING_UNITS`
//! access units are queued, later ones are dropped until the decoder catches
//! up, and decoding resumes cleanly at the next keyframe.
//!
//! Decoding needs the `h264` feature (openh264). Without it the track is
//! still drained so the transport's buffers never fill, but no frames are
//! produced.

use bytes::Bytes;
use dbmeter_core::{Error as CoreError, FrameReceiver, FrameSample, FrameSender, PixelFormat};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::track::track_remote::TrackRemote;

/// RTP clock rate for video
const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Packets the sample builder waits for a missing sequence number
const MAX_LATE_PACKETS: u16 = 256;

/// Access units queued ahead of a slow decoder
pub const MAX_PENDING_UNITS: usize = 32;

/// One decoded picture
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Video decoder driven by the decoder thread
///
/// Not required to be `Send`: decoders are built on the thread that uses them.
pub trait FrameDecoder {
    /// Decode one access unit; `Ok(None)` when no picture is ready yet
    fn decode(&mut self, access_unit: &[u8]) -> dbmeter_core::Result<Option<DecodedFrame>>;
}

/// Start reading `track` and return its frame sequence
///
/// Must be called within a Tokio runtime.
pub fn spawn_video_source(track: Arc<TrackRemote>, session_id: &str) -> FrameReceiver {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let units_tx = if cfg!(feature = "h264") {
        let (units_tx, units_rx) = mpsc::channel(MAX_PENDING_UNITS);
        let thread_frames = frames_tx.clone();
        let thread_session = session_id.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("h264-{}", session_id))
            .spawn(move || match create_decoder() {
                Ok(decoder) => run_decoder(decoder, units_rx, thread_frames),
                Err(e) => {
                    error!("Failed to start decoder for session {}: {}", thread_session, e);
                    let _ = thread_frames.send(Err(e));
                }
            });
        match spawned {
            Ok(_) => Some(units_tx),
            Err(e) => {
                let _ = frames_tx.send(Err(CoreError::Source(format!(
                    "failed to spawn decoder thread: {}",
                    e
                ))));
                None
            }
        }
    } else {
        warn!(
            "Built without the h264 feature; video of session {} will not be processed",
            session_id
        );
        None
    };

    tokio::spawn(read_rtp(track, units_tx, frames_tx, session_id.to_string()));
    frames_rx
}

async fn read_rtp(
    track: Arc<TrackRemote>,
    units: Option<mpsc::Sender<Bytes>>,
    frames: FrameSender,
    session_id: String,
) {
    info!("Starting video reception for session {}", session_id);

    let mut builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), VIDEO_CLOCK_RATE);
    let mut packets: u64 = 0;
    let mut dropped_units: u64 = 0;

    loop {
        let packet = match track.read_rtp().await {
            Ok((packet, _)) => packet,
            Err(e) => {
                if frames.is_closed() {
                    debug!("RTP read ended for session {}: {}", session_id, e);
                } else {
                    warn!("RTP read failed for session {}: {}", session_id, e);
                    let _ = frames.send(Err(CoreError::Source(format!(
                        "RTP read failed on track {}: {}",
                        track.id(),
                        e
                    ))));
                }
                break;
            }
        };
        packets += 1;

        let Some(units) = units.as_ref() else {
            continue;
        };

        builder.push(packet);
        while let Some(sample) = builder.pop() {
            match forward_unit(units, sample.data) {
                Forward::Queued => {}
                Forward::Dropped => {
                    dropped_units += 1;
                    trace!(
                        "Decoder for session {} is behind, dropped access unit ({} so far)",
                        session_id, dropped_units
                    );
                }
                Forward::Stopped => {
                    debug!("Decoder for session {} has stopped", session_id);
                    return;
                }
            }
        }
    }

    info!(
        "Video reception for session {} ended after {} packets ({} access units dropped)",
        session_id, packets, dropped_units
    );
}

/// Outcome of handing one access unit to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forward {
    Queued,
    /// The decoder's queue is full
    Dropped,
    /// The decoder is gone
    Stopped,
}

fn forward_unit(units: &mpsc::Sender<Bytes>, unit: Bytes) -> Forward {
    match units.try_send(unit) {
        Ok(()) => Forward::Queued,
        Err(TrySendError::Full(_)) => Forward::Dropped,
        Err(TrySendError::Closed(_)) => Forward::Stopped,
    }
}

/// Decode access units until `units` closes or nobody listens for frames
///
/// Every decoded picture gets the next frame number, starting at 1, so the
/// numbering counts frames the pipeline later drops. Blocking; run it on a
/// dedicated thread.
pub fn run_decoder(
    mut decoder: Box<dyn FrameDecoder>,
    mut units: mpsc::Receiver<Bytes>,
    frames: FrameSender,
) {
    let mut frame_count: u64 = 0;

    while let Some(unit) = units.blocking_recv() {
        match decoder.decode(&unit) {
            Ok(Some(decoded)) => {
                frame_count += 1;
                let frame = FrameSample::new(
                    decoded.data,
                    decoded.width,
                    decoded.height,
                    decoded.format,
                    frame_count,
                );
                if frames.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            // Recovers at the next keyframe
            Err(e) => debug!("Dropping undecodable access unit: {}", e),
        }
    }

    debug!("Decoder stopped after {} frames", frame_count);
}

#[cfg(feature = "h264")]
fn create_decoder() -> dbmeter_core::Result<Box<dyn FrameDecoder>> {
    Ok(Box::new(h264::OpenH264Decoder::new()?))
}

#[cfg(not(feature = "h264"))]
fn create_decoder() -> dbmeter_core::Result<Box<dyn FrameDecoder>> {
    Err(CoreError::Source(
        "H.264 decoding requires the 'h264' feature flag".to_string(),
    ))
}

#[cfg(feature = "h264")]
mod h264 {
    use super::{DecodedFrame, FrameDecoder};
    use dbmeter_core::{Error, PixelFormat, Result};
    use openh264::decoder::Decoder;
    use openh264::formats::YUVSource;

    pub struct OpenH264Decoder {
        decoder: Decoder,
    }

    impl OpenH264Decoder {
        pub fn new() -> Result<Self> {
            let decoder = Decoder::new()
                .map_err(|e| Error::Source(format!("openh264 init failed: {}", e)))?;
            Ok(Self { decoder })
        }
    }

    impl FrameDecoder for OpenH264Decoder {
        fn decode(&mut self, access_unit: &[u8]) -> Result<Option<DecodedFrame>> {
            let Some(yuv) = self
                .decoder
                .decode(access_unit)
                .map_err(|e| Error::InvalidFrame(format!("H.264 decode failed: {}", e)))?
            else {
                return Ok(None);
            };

            let (width, height) = yuv.dimensions();
            let mut rgb = vec![0u8; width * height * 3];
            yuv.write_rgb8(&mut rgb);

            Ok(Some(DecodedFrame {
                data: rgb,
                width: width as u32,
                height: height as u32,
                format: PixelFormat::Rgb24,
            }))
        }
    }
}
