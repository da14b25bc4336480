//! Per-connection frame pipeline
//!
//! A `FramePipeline` consumes an unbounded, push-based frame sequence and runs
//! at most one extraction at a time. Frames arriving during the detection
//! cooldown or while an extraction is in flight are dropped, never buffered,
//! so a slow recognizer or a fast camera cannot grow memory or latency.
//!
//! ```text
//!  video track ──frames──► consumer ──admit──► extraction task ──► PipelineEvent
//!                            │ (drop)               (one at a time)
//!                            ▼
//!                         discarded
//! ```

mod throttle;

pub use throttle::{decide, Admission, ThrottleState};

use crate::config::ExtractorConfig;
use crate::extractor::NumberExtractor;
use crate::frame::{ExtractionResult, FrameSample};
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Frames pushed by a video source; an `Err` is a permanent source failure
pub type FrameReceiver = mpsc::UnboundedReceiver<Result<FrameSample>>;

/// Sending half of a [`FrameReceiver`]
pub type FrameSender = mpsc::UnboundedSender<Result<FrameSample>>;

/// Output of a pipeline, consumed by the owning session
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An extraction completed
    Result(ExtractionResult),
    /// The frame source failed permanently; the session must close
    SourceFailed(String),
}

/// Throttled extraction unit owned by one session
pub struct FramePipeline {
    id: String,
    extractor: Arc<NumberExtractor>,
    config: RwLock<ExtractorConfig>,
    throttle: Mutex<ThrottleState>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    closed: AtomicBool,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl FramePipeline {
    /// Create a pipeline that reports to `events`
    pub fn new(
        id: impl Into<String>,
        extractor: NumberExtractor,
        config: ExtractorConfig,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            extractor: Arc::new(extractor),
            config: RwLock::new(config),
            throttle: Mutex::new(ThrottleState::default()),
            events,
            closed: AtomicBool::new(false),
            consumers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the current extractor configuration
    pub fn config(&self) -> ExtractorConfig {
        self.config.read().clone()
    }

    pub fn extractor(&self) -> &NumberExtractor {
        &self.extractor
    }

    /// Switch between ROI crop and whole-frame recognition
    pub fn set_roi_enabled(&self, enabled: bool) {
        self.config.write().roi_enabled = enabled;
        info!("Pipeline {} ROI mode toggled: {}", self.id, enabled);
    }

    /// Change the minimum spacing between extraction starts
    pub fn set_detection_interval(&self, interval: Duration) {
        self.config.write().detection_interval_secs = interval.as_secs_f64();
        info!(
            "Pipeline {} detection interval set to: {:?}",
            self.id, interval
        );
    }

    /// Whether an extraction is currently running
    pub fn in_flight(&self) -> bool {
        self.throttle.lock().in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Start consuming a frame source
    ///
    /// Several sources may be attached; they share one throttle, so the
    /// one-extraction-at-a-time guarantee holds across all of them.
    pub fn attach(self: &Arc<Self>, frames: FrameReceiver) {
        if self.is_closed() {
            debug!("Pipeline {} is closed, ignoring frame source", self.id);
            return;
        }

        info!("Video track received, starting processing on pipeline {}", self.id);
        let handle = tokio::spawn(Arc::clone(self).consume(frames));
        self.consumers.lock().push(handle);
    }

    async fn consume(self: Arc<Self>, mut frames: FrameReceiver) {
        while let Some(item) = frames.recv().await {
            if self.is_closed() {
                break;
            }
            match item {
                Ok(frame) => {
                    self.offer(frame, Instant::now());
                }
                Err(e) => {
                    error!("Error in video track processing on pipeline {}: {}", self.id, e);
                    self.emit(PipelineEvent::SourceFailed(e.to_string()));
                    return;
                }
            }
        }
        debug!("Frame source for pipeline {} ended", self.id);
    }

    /// Apply the admission policy to one frame arriving at `now`
    ///
    /// Admitted frames are handed to a spawned extraction task; everything
    /// else is dropped on the spot. Must be called within a Tokio runtime.
    pub fn offer(self: &Arc<Self>, frame: FrameSample, now: Instant) -> Admission {
        if self.is_closed() {
            return Admission::Busy;
        }

        let config = self.config();
        let admission = self
            .throttle
            .lock()
            .try_admit(now, config.detection_interval());

        match admission {
            Admission::Admit => {
                info!(
                    "Processing frame {}: {}x{} {:?}",
                    frame.frame_count, frame.width, frame.height, frame.format
                );
                tokio::spawn(Arc::clone(self).run_extraction(frame, config));
            }
            Admission::Cooldown | Admission::Busy => {
                trace!("Dropping frame {} ({:?})", frame.frame_count, admission);
            }
        }

        admission
    }

    async fn run_extraction(self: Arc<Self>, frame: FrameSample, config: ExtractorConfig) {
        let frame_count = frame.frame_count;
        let timestamp = frame.timestamp;

        // Run on its own task so a panicking recognizer is contained
        let extractor = Arc::clone(&self.extractor);
        let outcome =
            tokio::spawn(async move { extractor.try_extract(&frame, &config).await }).await;

        match outcome {
            Ok(Ok(values)) if !self.is_closed() => {
                self.emit(PipelineEvent::Result(ExtractionResult {
                    values,
                    frame_count,
                    timestamp,
                }));
            }
            Ok(Ok(_)) => {
                debug!(
                    "Discarding result of frame {} from closed pipeline {}",
                    frame_count, self.id
                );
            }
            Ok(Err(e)) => {
                error!("Error processing video frame {}: {}", frame_count, e);
            }
            Err(e) => {
                error!("Extraction task for frame {} aborted: {}", frame_count, e);
            }
        }

        // Cleared after emitting so results leave in admission order
        self.throttle.lock().finish();
    }

    fn emit(&self, event: PipelineEvent) {
        if let PipelineEvent::Result(ref result) = event {
            debug!(
                "Frame {} processed, sending: {:?}",
                result.frame_count, result.values
            );
        }
        if self.events.send(event).is_err() {
            debug!("Pipeline {} has no listener, event dropped", self.id);
        }
    }

    /// Stop consuming frames
    ///
    /// An extraction already running is abandoned, not cancelled: it finishes
    /// in the background and its result is discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for handle in self.consumers.lock().drain(..) {
            handle.abort();
        }
        if self.in_flight() {
            warn!("Pipeline {} closed with an extraction in flight", self.id);
        }
        info!("Pipeline {} closed", self.id);
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
