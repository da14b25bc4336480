//! Extractor configuration
//!
//! One `ExtractorConfig` is owned by each pipeline. The signaling layer only
//! flips `roi_enabled`; everything else is fixed when the pipeline is built
//! (the detection interval can also be changed at runtime).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tesseract arguments: LSTM engine, single text line, digits and separators only
pub const DEFAULT_ENGINE_ARGS: &str = "--oem 3 --psm 7 -c tessedit_char_whitelist=0123456789.,";

/// Region-of-interest sizing policy
///
/// The ROI is `width_ratio × width` by `height_ratio × height`, centered on the
/// frame midpoint, grown by `padding_px` on every side and clipped to the
/// frame. Ratio-only sizing is `padding_px = 0`; the fixed-padding layout used
/// by the browser overlay is `RoiPolicy::overlay()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiPolicy {
    /// Fraction of the frame width covered by the ROI (0, 1]
    pub width_ratio: f64,
    /// Fraction of the frame height covered by the ROI (0, 1]
    pub height_ratio: f64,
    /// Extra pixels added around the ratio-sized rectangle
    pub padding_px: u32,
}

impl Default for RoiPolicy {
    fn default() -> Self {
        Self {
            width_ratio: 0.2,
            height_ratio: 0.18,
            padding_px: 0,
        }
    }
}

impl RoiPolicy {
    /// Center 60% of the frame plus 40px of padding
    pub fn overlay() -> Self {
        Self {
            width_ratio: 0.6,
            height_ratio: 0.6,
            padding_px: 40,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, ratio) in [("width_ratio", self.width_ratio), ("height_ratio", self.height_ratio)] {
            if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
                return Err(Error::InvalidConfig(format!(
                    "roi.{} must be in range (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive range a recognized number must fall in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationRange {
    /// Lowest accepted value
    pub lower: f64,
    /// Highest accepted value
    pub upper: f64,
}

impl ValidationRange {
    /// Sound level meter display (0–200)
    pub const METER: ValidationRange = ValidationRange {
        lower: 0.0,
        upper: 200.0,
    };

    /// Generic six-digit counter display (0–999999)
    pub const WIDE: ValidationRange = ValidationRange {
        lower: 0.0,
        upper: 999_999.0,
    };

    /// Create a range, rejecting inverted or non-finite bounds
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    /// Check whether a value lies within the range (bounds included)
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.lower && value <= self.upper
    }

    fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.lower > self.upper {
            return Err(Error::InvalidConfig(format!(
                "valid range must be finite with lower <= upper, got {}..{}",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

impl Default for ValidationRange {
    fn default() -> Self {
        Self::METER
    }
}

impl std::str::FromStr for ValidationRange {
    type Err = Error;

    /// Parse `lower:upper` (e.g. `0:200`)
    fn from_str(s: &str) -> Result<Self> {
        let (lower, upper) = s.split_once(':').ok_or_else(|| {
            Error::InvalidConfig(format!("valid range must look like lower:upper, got {}", s))
        })?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| Error::InvalidConfig(format!("invalid range bound {:?}: {}", v, e)))
        };
        Self::new(parse(lower)?, parse(upper)?)
    }
}

/// Configuration for one pipeline's number extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// ROI sizing
    pub roi: RoiPolicy,

    /// When false the whole frame is submitted for recognition
    pub roi_enabled: bool,

    /// Minimum spacing between extraction starts, in seconds
    pub detection_interval_secs: f64,

    /// Accepted numeric range
    pub valid_range: ValidationRange,

    /// Minimum length of a bare integer candidate
    pub min_integer_digits: usize,

    /// Engine configuration string handed to the recognizer
    pub engine_args: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            roi: RoiPolicy::default(),
            roi_enabled: true,
            detection_interval_secs: 0.5,
            valid_range: ValidationRange::METER,
            min_integer_digits: 2,
            engine_args: DEFAULT_ENGINE_ARGS.to_string(),
        }
    }
}

impl ExtractorConfig {
    /// Detection interval as a `Duration`
    ///
    /// Saturates at `Duration::MAX`; negative or NaN values read as zero.
    pub fn detection_interval(&self) -> Duration {
        let secs = self.detection_interval_secs;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a ROI ratio is outside (0, 1]
    /// - `detection_interval_secs` is negative, not finite or too large for a `Duration`
    /// - `valid_range` is inverted or not finite
    /// - `min_integer_digits` is zero
    pub fn validate(&self) -> Result<()> {
        self.roi.validate()?;

        if !self.detection_interval_secs.is_finite()
            || self.detection_interval_secs < 0.0
            || Duration::try_from_secs_f64(self.detection_interval_secs).is_err()
        {
            return Err(Error::InvalidConfig(format!(
                "detection_interval_secs must be a non-negative number of seconds a Duration can hold, got {}",
                self.detection_interval_secs
            )));
        }

        self.valid_range.validate()?;

        if self.min_integer_digits == 0 {
            return Err(Error::InvalidConfig(
                "min_integer_digits must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the accepted numeric range
    pub fn with_valid_range(mut self, range: ValidationRange) -> Self {
        self.valid_range = range;
        self
    }

    /// Set the detection interval
    pub fn with_detection_interval(mut self, interval: Duration) -> Self {
        self.detection_interval_secs = interval.as_secs_f64();
        self
    }

    /// Set the ROI policy
    pub fn with_roi(mut self, roi: RoiPolicy) -> Self {
        self.roi = roi;
        self
    }
}
