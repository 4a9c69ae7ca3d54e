//! Image text recognition.
//!
//! The [`ImageExtractor`] asks an [`OcrBackend`] for recognized text fragments
//! and joins them with single spaces in the order the backend reports them.
//! Backends are initialized once per run; if initialization fails every image
//! degrades to `Error(BackendUnavailable)` instead of aborting the batch.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::converter::{ToolCommand, ToolRun};
use crate::extract::Extractor;
use crate::outcome::{ExtractionError, ExtractionOutcome};

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR backend not available: {0}")]
    Unavailable(String),

    #[error("OCR timed out after {0}s")]
    Timeout(u64),

    #[error("OCR failed: {0}")]
    Failed(String),
}

/// A text recognition engine.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize text in the image at `path`, returning fragments in reading order.
    async fn recognize(&self, path: &Path) -> Result<Vec<String>, OcrError>;
}

/// Tesseract via its command-line interface.
pub struct TesseractOcr {
    tool: ToolCommand,
    languages: String,
}

impl TesseractOcr {
    /// Check that the binary runs (`tesseract --version`) and build the backend.
    pub async fn probe(config: &OcrConfig) -> Result<Self, OcrError> {
        let tool = ToolCommand::new(
            config.command.clone(),
            Vec::new(),
            Duration::from_secs(config.timeout_secs),
        );
        match tool.run(["--version"]).await {
            ToolRun::Finished { success: true, .. } => Ok(Self {
                tool,
                languages: config.languages.clone(),
            }),
            ToolRun::Finished { code, .. } => Err(OcrError::Unavailable(format!(
                "{} --version exited with {:?}",
                config.command, code
            ))),
            ToolRun::NotFound => Err(OcrError::Unavailable(format!(
                "{} not found",
                config.command
            ))),
            ToolRun::TimedOut => Err(OcrError::Unavailable(format!(
                "{} did not respond",
                config.command
            ))),
            ToolRun::SpawnFailed(e) => Err(OcrError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, path: &Path) -> Result<Vec<String>, OcrError> {
        let args = [
            path.as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(&self.languages),
        ];
        match self.tool.run(args).await {
            ToolRun::Finished {
                success: true,
                stdout,
                ..
            } => Ok(split_fragments(&String::from_utf8_lossy(&stdout))),
            ToolRun::Finished { stderr, .. } => Err(OcrError::Failed(
                String::from_utf8_lossy(&stderr).trim().to_string(),
            )),
            ToolRun::NotFound => Err(OcrError::Unavailable(self.tool.program.clone())),
            ToolRun::TimedOut => Err(OcrError::Timeout(self.tool.timeout_secs())),
            ToolRun::SpawnFailed(e) => Err(OcrError::Failed(e.to_string())),
        }
    }
}

/// Non-blank output lines, trimmed, in order.
fn split_fragments(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extractor for raster images.
pub struct ImageExtractor {
    backend: Result<Arc<dyn OcrBackend>, String>,
}

impl ImageExtractor {
    pub fn new(backend: Arc<dyn OcrBackend>) -> Self {
        Self {
            backend: Ok(backend),
        }
    }

    /// An extractor whose backend failed to initialize.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: Err(reason.into()),
        }
    }

    /// Build from configuration, probing the OCR engine once.
    pub async fn from_config(config: &OcrConfig) -> Self {
        if !config.enabled {
            return Self::unavailable("OCR disabled in configuration");
        }
        match TesseractOcr::probe(config).await {
            Ok(backend) => Self::new(Arc::new(backend)),
            Err(e) => {
                warn!(error = %e, "OCR backend failed to initialize; images will not be recognized");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_ok()
    }
}

#[async_trait]
impl Extractor for ImageExtractor {
    fn name(&self) -> &str {
        match &self.backend {
            Ok(b) => b.name(),
            Err(_) => "ocr-unavailable",
        }
    }

    async fn extract(&self, path: &Path) -> ExtractionOutcome {
        let backend = match &self.backend {
            Ok(b) => b,
            Err(reason) => return ExtractionError::BackendUnavailable(reason.clone()).into(),
        };
        match backend.recognize(path).await {
            Ok(fragments) => ExtractionOutcome::from_text(fragments.join(" ")),
            Err(OcrError::Unavailable(r)) => ExtractionError::BackendUnavailable(r).into(),
            Err(OcrError::Timeout(secs)) => ExtractionError::Timeout(secs).into(),
            Err(OcrError::Failed(r)) => {
                debug!(file = %path.display(), reason = %r, "OCR failed");
                ExtractionError::Failed(format!("OCR: {}", r)).into()
            }
        }
    }
}
