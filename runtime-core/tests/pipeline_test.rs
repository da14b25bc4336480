//! Frame pipeline behavior under paused time
//!
//! Frames are pushed at roughly 30 fps while a fake recognizer takes a fixed
//! amount of virtual time per call.

mod harness;

use dbmeter_core::{
    Admission, ExtractorConfig, FramePipeline, NumberExtractor, PipelineEvent, ValidationRange,
};
use harness::{
    drain_events, fail_source, feed_frames, gray_frame, init_logging, results, SlowRecognizer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

const FRAME_SPACING: Duration = Duration::from_millis(33);

fn pipeline_with(
    recognizer: Arc<SlowRecognizer>,
    config: ExtractorConfig,
) -> (
    Arc<FramePipeline>,
    mpsc::UnboundedReceiver<PipelineEvent>,
) {
    init_logging();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let extractor = NumberExtractor::new(recognizer).expect("extractor");
    let pipeline = FramePipeline::new("test", extractor, config, events_tx);
    (pipeline, events_rx)
}

#[tokio::test(start_paused = true)]
async fn test_extraction_starts_respect_interval() {
    let recognizer = SlowRecognizer::new("87.5", Duration::from_millis(200));
    let (pipeline, mut events) = pipeline_with(recognizer.clone(), ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 90, FRAME_SPACING).await;
    sleep(Duration::from_secs(1)).await;

    let starts = recognizer.starts();
    assert!(starts.len() >= 5, "only {} extractions ran", starts.len());
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }

    let found = results(&drain_events(&mut events));
    assert_eq!(found.len(), starts.len());
    assert!(found.iter().all(|r| r.values == vec!["87.5"]));
}

#[tokio::test(start_paused = true)]
async fn test_slow_recognizer_never_overlaps() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(1500));
    let (pipeline, mut events) = pipeline_with(recognizer.clone(), ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 150, FRAME_SPACING).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(recognizer.max_running(), 1);
    let starts = recognizer.starts();
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1500));
    }

    // Most frames were dropped, not queued
    let found = results(&drain_events(&mut events));
    assert!(found.len() < 10);
    assert_eq!(found.len(), recognizer.calls());
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_frame_order() {
    let recognizer = SlowRecognizer::new("12 12 34", Duration::from_millis(300));
    let (pipeline, mut events) = pipeline_with(recognizer, ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 120, FRAME_SPACING).await;
    sleep(Duration::from_secs(1)).await;

    let found = results(&drain_events(&mut events));
    assert!(!found.is_empty());
    for pair in found.windows(2) {
        assert!(pair[0].frame_count < pair[1].frame_count);
    }
    // Frame counters include dropped frames
    assert_eq!(found[0].frame_count, 1);
    assert!(found.last().map(|r| r.frame_count).unwrap_or_default() > found.len() as u64);
    assert!(found.iter().all(|r| r.values == vec!["12", "34"]));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_readings_are_empty() {
    let recognizer = SlowRecognizer::new("350", Duration::from_millis(10));
    let config = ExtractorConfig::default().with_valid_range(ValidationRange::METER);
    let (pipeline, mut events) = pipeline_with(recognizer, config);

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 1, FRAME_SPACING).await;
    sleep(Duration::from_millis(100)).await;

    let found = results(&drain_events(&mut events));
    assert_eq!(found.len(), 1);
    assert!(found[0].values.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_is_reported() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(10));
    let (pipeline, mut events) = pipeline_with(recognizer, ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    fail_source(&frames_tx, "rtp read failed");

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event")
        .expect("channel closed");
    match event {
        PipelineEvent::SourceFailed(reason) => assert!(reason.contains("rtp read failed")),
        other => panic!("expected SourceFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_abandons_in_flight_extraction() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(800));
    let (pipeline, mut events) = pipeline_with(recognizer.clone(), ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 1, FRAME_SPACING).await;
    assert!(pipeline.in_flight());

    pipeline.close();
    pipeline.close();
    assert!(pipeline.is_closed());

    feed_frames(&frames_tx, 30, FRAME_SPACING).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(recognizer.calls(), 1);
    assert!(drain_events(&mut events).is_empty());
    assert_eq!(
        pipeline.offer(gray_frame(8, 8, 99), Instant::now()),
        Admission::Busy
    );
}

#[tokio::test(start_paused = true)]
async fn test_roi_toggle_keeps_pipeline_running() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(50));
    let (pipeline, mut events) = pipeline_with(recognizer.clone(), ExtractorConfig::default());

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 20, FRAME_SPACING).await;

    pipeline.set_roi_enabled(false);
    assert!(!pipeline.config().roi_enabled);
    feed_frames(&frames_tx, 20, FRAME_SPACING).await;
    sleep(Duration::from_secs(1)).await;

    let sizes = recognizer.sizes();
    assert_eq!(sizes.first(), Some(&(32, 20)));
    assert_eq!(sizes.last(), Some(&(160, 120)));
    assert!(!pipeline.is_closed());
    assert_eq!(results(&drain_events(&mut events)).len(), sizes.len());
}

#[tokio::test(start_paused = true)]
async fn test_detection_interval_changes_at_runtime() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(10));
    let (pipeline, _events) = pipeline_with(recognizer.clone(), ExtractorConfig::default());

    pipeline.set_detection_interval(Duration::from_secs(2));
    assert_eq!(pipeline.config().detection_interval(), Duration::from_secs(2));

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    pipeline.attach(frames_rx);
    feed_frames(&frames_tx, 90, FRAME_SPACING).await;

    let starts = recognizer.starts();
    assert!(starts.len() >= 2);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }
}

#[tokio::test(start_paused = true)]
async fn test_offer_reports_admission() {
    let recognizer = SlowRecognizer::new("42", Duration::from_millis(100));
    let (pipeline, _events) = pipeline_with(recognizer, ExtractorConfig::default());
    let start = Instant::now();

    assert_eq!(pipeline.offer(gray_frame(16, 16, 1), start), Admission::Admit);
    assert_eq!(
        pipeline.offer(gray_frame(16, 16, 2), start + Duration::from_millis(100)),
        Admission::Cooldown
    );
    assert_eq!(
        pipeline.offer(gray_frame(16, 16, 3), start + Duration::from_millis(600)),
        Admission::Busy
    );

    sleep(Duration::from_millis(200)).await;
    assert!(!pipeline.in_flight());
    tokio_test::assert_ok!(pipeline.config().validate());
}
