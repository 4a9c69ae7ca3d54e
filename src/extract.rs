//! File-type classification and the extractor capability.
//!
//! Attachments are classified by extension (case-insensitive), never by
//! sniffing content. Each [`FileKind`] except [`FileKind::Unsupported`] maps to
//! an extractor; archives are handled by the [`archive`](crate::archive) walker
//! because they re-enter the router.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::outcome::{ExtractionError, ExtractionOutcome};

/// Extension-derived attachment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `.zip`
    Archive,
    /// `.hwp`, `.hwpx`
    LegacyDocument,
    /// `.pdf`
    Document,
    /// `.jpg`, `.jpeg`, `.png`, `.bmp`
    Image,
    Unsupported,
}

impl FileKind {
    pub fn classify(path: &Path) -> FileKind {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return FileKind::Unsupported,
        };
        match ext.as_str() {
            "zip" => FileKind::Archive,
            "hwp" | "hwpx" => FileKind::LegacyDocument,
            "pdf" => FileKind::Document,
            "jpg" | "jpeg" | "png" | "bmp" => FileKind::Image,
            _ => FileKind::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Archive => "archive",
            FileKind::LegacyDocument => "legacy-document",
            FileKind::Document => "document",
            FileKind::Image => "image",
            FileKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts one file to text.
///
/// Implementations must never panic or return early with an error type: every
/// failure becomes an [`ExtractionOutcome::Error`] so a single bad attachment
/// cannot abort the batch.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in logs (e.g. `"pdf"`, `"hwp5txt"`, `"tesseract"`).
    fn name(&self) -> &str;

    async fn extract(&self, path: &Path) -> ExtractionOutcome;
}

/// PDF text-layer extractor backed by `pdf-extract`.
///
/// Pages are concatenated in document order. A PDF without a text layer
/// (scanned pages) yields [`ExtractionOutcome::Empty`], not an error.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn extract(&self, path: &Path) -> ExtractionOutcome {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "pdf read failed");
                return ExtractionError::Unreadable.into();
            }
        };

        // pdf-extract is CPU bound and can panic on malformed input; a panic
        // surfaces here as a JoinError.
        match tokio::task::spawn_blocking(move || extract_pdf_text(&bytes)).await {
            Ok(Ok(text)) => ExtractionOutcome::from_text(text),
            Ok(Err(e)) => ExtractionError::Failed(format!("PDF: {}", e)).into(),
            Err(e) => ExtractionError::Failed(format!("PDF task aborted: {}", e)).into(),
        }
    }
}

/// Extract the text layer of every page from in-memory PDF bytes.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classify_by_extension_case_insensitive() {
        let cases = [
            ("a.zip", FileKind::Archive),
            ("A.ZIP", FileKind::Archive),
            ("guide.hwp", FileKind::LegacyDocument),
            ("guide.HWPX", FileKind::LegacyDocument),
            ("report.pdf", FileKind::Document),
            ("scan.JPG", FileKind::Image),
            ("scan.jpeg", FileKind::Image),
            ("scan.png", FileKind::Image),
            ("scan.bmp", FileKind::Image),
            ("notes.txt", FileKind::Unsupported),
            ("archive.tar.gz", FileKind::Unsupported),
            ("no_extension", FileKind::Unsupported),
        ];
        for (name, kind) in cases {
            assert_eq!(FileKind::classify(&PathBuf::from(name)), kind, "{}", name);
        }
    }

    #[test]
    fn classification_ignores_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("looks_like.txt");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(FileKind::classify(&path), FileKind::Unsupported);
    }

    #[tokio::test]
    async fn invalid_pdf_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let out = PdfExtractor::new().extract(&path).await;
        assert!(matches!(
            out,
            ExtractionOutcome::Error(ExtractionError::Failed(_))
        ));
    }

    /// Single-page PDF whose page draws `content`, with byte-exact xref offsets.
    fn single_page_pdf(content: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >> stream\n{}\nendstream",
                content.len(),
                content
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    #[tokio::test]
    async fn pdf_without_text_layer_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanned.pdf");
        std::fs::write(&path, single_page_pdf("")).unwrap();
        assert_eq!(
            PdfExtractor::new().extract(&path).await,
            ExtractionOutcome::Empty
        );
    }

    #[tokio::test]
    async fn missing_pdf_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let out = PdfExtractor::new().extract(&dir.path().join("gone.pdf")).await;
        assert_eq!(out, ExtractionOutcome::Error(ExtractionError::Unreadable));
    }
}
