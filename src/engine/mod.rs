//! Recognition engine boundary.
//!
//! The pipeline reaches the OCR engine only through the
//! [`RecognitionEngine`] trait: one synchronous call per page per pass.
//! Engine calls may be slow and may fail individually; the worker pool owns
//! timeout and retry policy, the engine just runs.

mod tesseract;

pub use tesseract::TesseractEngine;

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::models::{LanguageConfig, RecognitionResult};

/// Errors from a single recognition engine call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine not available: {0}")]
    NotAvailable(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synchronous boundary to an external OCR engine.
///
/// The call is treated as atomic and non-preemptible: cancellation never
/// interrupts a running call, it only discards the outcome.
pub trait RecognitionEngine: Send + Sync {
    /// Recognize one page image with the given language models.
    fn recognize(
        &self,
        image: &Path,
        languages: &LanguageConfig,
    ) -> Result<RecognitionResult, EngineError>;

    /// Whether the engine's dependencies are installed.
    fn is_available(&self) -> bool;

    /// What is needed to make this engine available.
    fn availability_hint(&self) -> String;
}

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
