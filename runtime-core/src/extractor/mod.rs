//! Number extraction from video frames
//!
//! `extract` crops the ROI, hands it to the text-recognition capability and
//! turns the raw text into validated numeric strings. Apart from the
//! processed-frame counter it is a pure function of `(frame, config)`.

mod parse;
mod recognizer;
mod roi;

pub use parse::{validate, Candidate, CandidateKind, NumberParser};
pub use recognizer::{TesseractCli, TextRecognizer};
pub use roi::{crop_luma, Region};

use crate::config::ExtractorConfig;
use crate::frame::FrameSample;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Reads numbers out of frames using an external recognizer
pub struct NumberExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    parser: NumberParser,
    processed: AtomicU64,
}

impl NumberExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Result<Self> {
        Ok(Self {
            recognizer,
            parser: NumberParser::new()?,
            processed: AtomicU64::new(0),
        })
    }

    /// Number of frames submitted so far (diagnostic only)
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Validated numbers in `frame`, in first-seen order
    ///
    /// Never fails: preprocessing and recognition errors are logged and
    /// produce an empty list.
    pub async fn extract(&self, frame: &FrameSample, config: &ExtractorConfig) -> Vec<String> {
        match self.try_extract(frame, config).await {
            Ok(values) => values,
            Err(e) => {
                error!(
                    "Error in number extraction for frame {}: {}",
                    frame.frame_count, e
                );
                Vec::new()
            }
        }
    }

    /// Like [`extract`](Self::extract) but reports failures to the caller
    pub async fn try_extract(
        &self,
        frame: &FrameSample,
        config: &ExtractorConfig,
    ) -> Result<Vec<String>> {
        let started = Instant::now();
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;

        let region = if config.roi_enabled {
            config.roi.region(frame.width, frame.height)
        } else {
            Region::full(frame.width, frame.height)
        };
        let image = crop_luma(frame, region)?;

        let text = self
            .recognizer
            .recognize(&image, &config.engine_args)
            .await?;

        info!(
            "{}: Frame {}, {:.1}ms, Found: {}",
            region.label(),
            processed,
            started.elapsed().as_secs_f64() * 1000.0,
            text
        );

        Ok(self.parser.parse(&text, config))
    }
}

impl std::fmt::Debug for NumberExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumberExtractor")
            .field("processed", &self.processed_count())
            .finish_non_exhaustive()
    }
}
