//! Extraction outcomes and the per-attachment error taxonomy.
//!
//! Every attempt to turn an attachment into text ends in an [`ExtractionOutcome`].
//! Failures are values, not `Err`s: nothing below the record aggregator is allowed
//! to abort a batch, so extractors convert their internal failures into
//! [`ExtractionError`] at their own boundary.

use serde::Serialize;
use thiserror::Error;

/// Why an attachment produced no text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("corrupt or encrypted archive")]
    CorruptOrEncrypted,

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("missing or unreadable")]
    Unreadable,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("archive too large: {0}")]
    ArchiveTooLarge(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

impl ExtractionError {
    /// Short machine-readable label used in reports and run statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::ToolUnavailable(_) => "tool_unavailable",
            ExtractionError::CorruptOrEncrypted => "corrupt_or_encrypted",
            ExtractionError::Timeout(_) => "timeout",
            ExtractionError::Unreadable => "unreadable",
            ExtractionError::BackendUnavailable(_) => "backend_unavailable",
            ExtractionError::ArchiveTooLarge(_) => "archive_too_large",
            ExtractionError::Failed(_) => "failed",
        }
    }
}

/// Result of converting one file's bytes to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Text(String),
    /// Nothing extractable, but nothing went wrong either (scanned PDF, unsupported extension).
    Empty,
    Error(ExtractionError),
}

impl ExtractionOutcome {
    /// Wraps extracted text, collapsing whitespace-only output to [`ExtractionOutcome::Empty`].
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            ExtractionOutcome::Empty
        } else if trimmed.len() == text.len() {
            ExtractionOutcome::Text(text)
        } else {
            ExtractionOutcome::Text(trimmed.to_string())
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionOutcome::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        match self {
            ExtractionOutcome::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self {
            ExtractionOutcome::Text(_) => OutcomeStatus::Text,
            ExtractionOutcome::Empty => OutcomeStatus::Empty,
            ExtractionOutcome::Error(_) => OutcomeStatus::Error,
        }
    }

    /// Whether this outcome is a pure function of the file's bytes.
    ///
    /// Archive budget violations depend on where the archive sits in an
    /// expansion, so the same bytes may succeed elsewhere.
    pub fn is_cacheable(&self) -> bool {
        !matches!(
            self,
            ExtractionOutcome::Error(ExtractionError::ArchiveTooLarge(_))
        )
    }
}

impl From<ExtractionError> for ExtractionOutcome {
    fn from(e: ExtractionError) -> Self {
        ExtractionOutcome::Error(e)
    }
}

/// Coarse outcome tag written to attachment reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Text,
    Empty,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_text_is_empty() {
        assert_eq!(ExtractionOutcome::from_text("  \n\t "), ExtractionOutcome::Empty);
        assert_eq!(
            ExtractionOutcome::from_text("\n hello \n"),
            ExtractionOutcome::Text("hello".to_string())
        );
    }

    #[test]
    fn budget_errors_are_not_cacheable() {
        let too_large: ExtractionOutcome =
            ExtractionError::ArchiveTooLarge("depth".to_string()).into();
        assert!(!too_large.is_cacheable());
        assert!(ExtractionOutcome::Empty.is_cacheable());
        assert!(ExtractionOutcome::Error(ExtractionError::CorruptOrEncrypted).is_cacheable());
    }

    #[test]
    fn error_messages_name_the_failure() {
        assert_eq!(
            ExtractionError::CorruptOrEncrypted.to_string(),
            "corrupt or encrypted archive"
        );
        assert_eq!(ExtractionError::Timeout(180).to_string(), "timeout after 180s");
        assert_eq!(ExtractionError::Unreadable.kind(), "unreadable");
    }
}
