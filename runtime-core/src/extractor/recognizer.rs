//! Text-recognition capability
//!
//! The OCR engine is consumed as an opaque service: it takes a luma image and
//! an engine configuration string and returns raw text. `TesseractCli` drives
//! the `tesseract` executable over stdin/stdout.

use crate::{Error, Result};
use async_trait::async_trait;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// External text-recognition engine
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in `image`
    ///
    /// `engine_args` is the engine-specific configuration (for Tesseract,
    /// command-line options such as the page segmentation mode and the
    /// character whitelist).
    async fn recognize(&self, image: &GrayImage, engine_args: &str) -> Result<String>;
}

/// Tesseract command-line recognizer
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractCli {
    /// Use the given `tesseract` executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check that the executable runs; returns its version banner
    pub async fn probe(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Recognition(format!(
                "{} --version exited with {}",
                self.program.display(),
                output.status
            )));
        }

        // Older releases print the banner on stderr
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        let version = String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        info!("Tesseract OCR is available: {}", version);
        Ok(version)
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(&self, image: &GrayImage, engine_args: &str) -> Result<String> {
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;
        let png = png.into_inner();

        let mut command = Command::new(&self.program);
        command
            .args(["stdin", "stdout"])
            .args(engine_args.split_whitespace())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} on {}x{} image ({} bytes)",
            self.program.display(),
            image.width(),
            image.height(),
            png.len()
        );

        let mut child = command.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Recognition("tesseract stdin unavailable".to_string()))?;
        stdin.write_all(&png).await?;
        // Close stdin so tesseract sees EOF
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("tesseract exited with {}: {}", output.status, stderr.trim());
            return Err(Error::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
