//! Decoded video frames and extraction results

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit luma, one byte per pixel
    Gray8,
    /// Packed RGB, three bytes per pixel
    Rgb24,
    /// Packed BGR, three bytes per pixel
    Bgr24,
    /// YUV 4:2:0 planar (Y plane first)
    I420,
}

impl PixelFormat {
    /// Expected buffer size for a frame of the given dimensions
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Gray8 => w * h,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => w * h * 3,
            PixelFormat::I420 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
        }
    }
}

/// One decoded frame as delivered by a video track
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Pixel data
    pub data: Bytes,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Arrival time, seconds since the Unix epoch
    pub timestamp: f64,
    /// Position of this frame in its track (1-based, counts dropped frames too)
    pub frame_count: u64,
}

impl FrameSample {
    /// Create a frame stamped with the current wall-clock time
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_count: u64,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            timestamp: unix_timestamp(),
            frame_count,
        }
    }

    /// Check the buffer length against the declared dimensions
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame {} has empty dimensions {}x{}",
                self.frame_count, self.width, self.height
            )));
        }

        let expected = self.format.buffer_len(self.width, self.height);
        if self.data.len() < expected {
            return Err(Error::InvalidFrame(format!(
                "{:?} frame {} ({}x{}) needs {} bytes, got {}",
                self.format,
                self.frame_count,
                self.width,
                self.height,
                expected,
                self.data.len()
            )));
        }

        Ok(())
    }
}

/// Validated numbers recognized in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Numbers in first-seen order, without duplicates
    pub values: Vec<String>,
    /// Frame the numbers were read from
    pub frame_count: u64,
    /// Arrival time of that frame, seconds since the Unix epoch
    pub timestamp: f64,
}

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
