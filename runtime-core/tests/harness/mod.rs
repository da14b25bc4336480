//! Pipeline test harness
//!
//! Fake recognizers and synthetic frame sources for driving a
//! `FramePipeline` under paused Tokio time.

#![allow(dead_code)]

use async_trait::async_trait;
use dbmeter_core::{
    Error, ExtractionResult, FrameSample, FrameSender, PipelineEvent, PixelFormat, Result,
    TextRecognizer,
};
use image::GrayImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Recognizer that takes `delay` to return `text`
///
/// Records when each call started, the image sizes it was given and the
/// highest number of calls that were running at once.
pub struct SlowRecognizer {
    text: String,
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl SlowRecognizer {
    pub fn new(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            delay,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
            sizes: Mutex::new(Vec::new()),
        })
    }

    pub fn starts(&self) -> Vec<Instant> {
        self.starts.lock().clone()
    }

    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.sizes.lock().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.starts.lock().len()
    }
}

#[async_trait]
impl TextRecognizer for SlowRecognizer {
    async fn recognize(&self, image: &GrayImage, _engine_args: &str) -> Result<String> {
        self.starts.lock().push(Instant::now());
        self.sizes.lock().push((image.width(), image.height()));

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Solid gray frame
pub fn gray_frame(width: u32, height: u32, frame_count: u64) -> FrameSample {
    FrameSample::new(
        vec![200u8; (width * height) as usize],
        width,
        height,
        PixelFormat::Gray8,
        frame_count,
    )
}

/// Push `count` frames spaced `spacing` apart, numbered from 1
pub async fn feed_frames(frames: &FrameSender, count: u64, spacing: Duration) {
    for n in 1..=count {
        if frames.send(Ok(gray_frame(160, 120, n))).is_err() {
            return;
        }
        tokio::time::sleep(spacing).await;
    }
}

/// Route logs to the test output; `RUST_LOG` selects the level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Push a permanent source failure
pub fn fail_source(frames: &FrameSender, reason: &str) {
    let _ = frames.send(Err(Error::Source(reason.to_string())));
}

/// Everything the pipeline has emitted so far
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Only the extraction results among `events`
pub fn results(events: &[PipelineEvent]) -> Vec<ExtractionResult> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Result(result) => Some(result.clone()),
            PipelineEvent::SourceFailed(_) => None,
        })
        .collect()
}
