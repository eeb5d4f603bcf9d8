//! OCR engine adapter.
//!
//! An engine turns an image file into text. While it works it reports
//! progress events on a channel; the job runner consumes that channel and
//! mirrors each event into the progress table.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::OcrError;

/// One progress report from an engine
#[derive(Debug, Clone, PartialEq)]
pub struct OcrProgress {
    /// Human-readable phase, e.g. "recognizing text"
    pub status: String,
    /// Completion in `0.0..=1.0`; engines report non-decreasing values
    pub fraction: f32,
}

impl OcrProgress {
    pub fn new(status: impl Into<String>, fraction: f32) -> Self {
        Self {
            status: status.into(),
            fraction,
        }
    }

    /// Fraction as a whole percentage clamped to `0..=100`
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Text recognition backend
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in `image`.
    ///
    /// Progress events go to `progress`; dropping the returned future must
    /// abandon the work.
    fn recognize<'a>(
        &'a self,
        image: &'a Path,
        language: &'a str,
        progress: mpsc::UnboundedSender<OcrProgress>,
    ) -> BoxFuture<'a, Result<String, OcrError>>;
}

/// Runs a tesseract-compatible CLI: `<command> <image> stdout -l <language>`
///
/// The CLI reports nothing while it works. Between start and exit the engine
/// emits estimates derived from elapsed time against `expected_secs`; they
/// approach but never pass 90%, and the final 100% only follows a successful
/// exit.
pub struct TesseractEngine {
    command: String,
    expected: Duration,
    interval: Duration,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            expected: config.expected(),
            interval: config.progress_interval(),
        }
    }
}

/// Estimated completion after `elapsed`, rising from 0.1 towards 0.9
fn estimated_fraction(elapsed: Duration, expected: Duration) -> f32 {
    if expected.is_zero() {
        return 0.9;
    }
    let ratio = elapsed.as_secs_f32() / expected.as_secs_f32();
    0.1 + 0.8 * (1.0 - (-ratio).exp())
}

impl OcrEngine for TesseractEngine {
    fn recognize<'a>(
        &'a self,
        image: &'a Path,
        language: &'a str,
        progress: mpsc::UnboundedSender<OcrProgress>,
    ) -> BoxFuture<'a, Result<String, OcrError>> {
        Box::pin(async move {
            // A closed receiver only means nobody is watching any more.
            let _ = progress.send(OcrProgress::new("initializing engine", 0.05));

            let child = Command::new(&self.command)
                .arg(image)
                .arg("stdout")
                .arg("-l")
                .arg(language)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| OcrError::Launch {
                    command: self.command.clone(),
                    source,
                })?;

            let _ = progress.send(OcrProgress::new("recognizing text", 0.1));
            debug!(image = %image.display(), language = %language, "OCR engine started");

            let started = Instant::now();
            let mut ticker = tokio::time::interval_at(started + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let wait = child.wait_with_output();
            tokio::pin!(wait);
            let output = loop {
                tokio::select! {
                    result = &mut wait => {
                        break result.map_err(|source| OcrError::Launch {
                            command: self.command.clone(),
                            source,
                        })?;
                    }
                    _ = ticker.tick() => {
                        let fraction = estimated_fraction(started.elapsed(), self.expected);
                        let _ = progress.send(OcrProgress::new("recognizing text", fraction));
                    }
                }
            };

            if !output.status.success() {
                return Err(OcrError::Engine {
                    status: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let text = String::from_utf8(output.stdout).map_err(OcrError::InvalidOutput)?;
            let _ = progress.send(OcrProgress::new("recognizing text", 1.0));

            // tesseract terminates each page with a form feed
            Ok(text
                .trim_end_matches(|c: char| c == '\u{c}' || c.is_whitespace())
                .to_string())
        })
    }
}
