//! ROI placement and luma crop

use crate::config::RoiPolicy;
use crate::frame::{FrameSample, PixelFormat};
use crate::{Error, Result};
use image::GrayImage;

/// Rectangle inside a frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// The whole frame
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Diagnostic label, e.g. `ROI_256x129`
    pub fn label(&self) -> String {
        format!("ROI_{}x{}", self.width, self.height)
    }
}

impl RoiPolicy {
    /// Place the ROI in a `width × height` frame, clipped to the frame bounds
    pub fn region(&self, width: u32, height: u32) -> Region {
        let half_w = (f64::from(width) * self.width_ratio) as i64 / 2;
        let half_h = (f64::from(height) * self.height_ratio) as i64 / 2;
        let (cx, cy) = (i64::from(width / 2), i64::from(height / 2));
        let pad = i64::from(self.padding_px);

        let x1 = (cx - half_w - pad).max(0);
        let y1 = (cy - half_h - pad).max(0);
        let x2 = (cx + half_w + pad).min(i64::from(width));
        let y2 = (cy + half_h + pad).min(i64::from(height));

        Region {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1).max(0) as u32,
            height: (y2 - y1).max(0) as u32,
        }
    }
}

/// Copy `region` out of `frame` as an 8-bit luma image
pub fn crop_luma(frame: &FrameSample, region: Region) -> Result<GrayImage> {
    frame.validate()?;

    if region.width == 0 || region.height == 0 {
        return Err(Error::InvalidFrame(format!(
            "empty ROI {} in {}x{} frame",
            region.label(),
            frame.width,
            frame.height
        )));
    }
    if region.x + region.width > frame.width || region.y + region.height > frame.height {
        return Err(Error::InvalidFrame(format!(
            "ROI {} at ({}, {}) exceeds {}x{} frame",
            region.label(),
            region.x,
            region.y,
            frame.width,
            frame.height
        )));
    }

    let data = &frame.data;
    let stride = frame.width as usize;
    let mut luma = Vec::with_capacity(region.width as usize * region.height as usize);

    for y in region.y..region.y + region.height {
        let row = y as usize * stride;
        for x in region.x..region.x + region.width {
            let offset = row + x as usize;
            let value = match frame.format {
                // I420 luma is the leading Y plane
                PixelFormat::Gray8 | PixelFormat::I420 => data[offset],
                PixelFormat::Rgb24 => {
                    let p = offset * 3;
                    rec601_luma(data[p], data[p + 1], data[p + 2])
                }
                PixelFormat::Bgr24 => {
                    let p = offset * 3;
                    rec601_luma(data[p + 2], data[p + 1], data[p])
                }
            };
            luma.push(value);
        }
    }

    GrayImage::from_raw(region.width, region.height, luma)
        .ok_or_else(|| Error::Image("luma buffer does not match ROI size".to_string()))
}

fn rec601_luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
}
