//! DBMeter Core - frame throttling and numeric text recognition
//!
//! This crate turns decoded video frames into validated numeric readings. It
//! has no knowledge of WebRTC or signaling; the transport crate feeds frames
//! in and forwards [`PipelineEvent`]s out.
//!
//! # Architecture
//!
//! - [`extractor`]: ROI crop, the [`TextRecognizer`] capability and number
//!   parsing/validation
//! - [`pipeline`]: a per-connection [`FramePipeline`] that samples an unbounded
//!   frame stream with a cooldown and at most one extraction in flight
//!
//! # Example
//!
//! ```ignore
//! use dbmeter_core::{ExtractorConfig, FramePipeline, NumberExtractor, TesseractCli};
//! use std::sync::Arc;
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let extractor = NumberExtractor::new(Arc::new(TesseractCli::default()))?;
//! let pipeline = FramePipeline::new("session-1", extractor, ExtractorConfig::default(), events_tx);
//! pipeline.attach(frames);
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod pipeline;

pub use config::{ExtractorConfig, RoiPolicy, ValidationRange, DEFAULT_ENGINE_ARGS};
pub use error::{Error, Result};
pub use extractor::{NumberExtractor, NumberParser, Region, TesseractCli, TextRecognizer};
pub use frame::{unix_timestamp, ExtractionResult, FrameSample, PixelFormat};
pub use pipeline::{Admission, FramePipeline, FrameReceiver, FrameSender, PipelineEvent};
