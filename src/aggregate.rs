//! Record aggregation: one composite text per record.
//!
//! Attachments are routed one after another so the `[Attachments]` block
//! always follows the record's attachment order. Failed or textless
//! attachments stay visible as `[no content]` markers.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::archive::no_content_marker;
use crate::config::InputConfig;
use crate::models::{AttachmentReport, ProcessedRecord, Record};
use crate::outcome::ExtractionOutcome;
use crate::router::ExtractionRouter;

const NO_CONTENT: &str = "no content";

/// Routes a record's attachments and renders its aggregated text.
#[derive(Clone)]
pub struct RecordAggregator {
    router: Arc<ExtractionRouter>,
    input: InputConfig,
}

impl RecordAggregator {
    pub fn new(router: Arc<ExtractionRouter>, input: InputConfig) -> Self {
        Self { router, input }
    }

    pub async fn process(&self, record: Record) -> ProcessedRecord {
        let mut outcomes = Vec::with_capacity(record.attachments.len());
        for attachment in &record.attachments {
            let path = self.input.resolve_attachment(attachment);
            outcomes.push(self.router.route(&path).await);
        }

        let reports = record
            .attachments
            .iter()
            .zip(&outcomes)
            .map(|(path, outcome)| AttachmentReport::new(path.display().to_string(), outcome))
            .collect();
        let labeled: Vec<(String, ExtractionOutcome)> = record
            .attachments
            .iter()
            .map(|p| attachment_label(p))
            .zip(outcomes)
            .collect();

        let text = render(&record, &labeled);
        ProcessedRecord::new(record, text, reports)
    }
}

fn attachment_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Render the aggregated text for `record` given its labeled attachment outcomes.
pub fn render(record: &Record, attachments: &[(String, ExtractionOutcome)]) -> String {
    let mut out = String::new();

    out.push_str("[Overview]\n");
    let _ = writeln!(out, "Name: {}", record.name);
    let _ = writeln!(out, "Department: {}", record.department);
    let _ = writeln!(out, "Summary: {}", record.summary);

    for section in &record.sections {
        let body = section.body.trim();
        let _ = write!(
            out,
            "\n[{}]\n{}\n",
            section.title,
            if body.is_empty() { NO_CONTENT } else { body }
        );
    }

    if !attachments.is_empty() {
        out.push_str("\n[Attachments]\n");
        for (i, (label, outcome)) in attachments.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "=== [Attachment: {}] ===", label);
            match outcome {
                ExtractionOutcome::Text(text) => out.push_str(text),
                ExtractionOutcome::Empty => {
                    let _ = write!(out, "[{}]", NO_CONTENT);
                }
                ExtractionOutcome::Error(e) => out.push_str(&no_content_marker(e)),
            }
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;
    use crate::outcome::ExtractionError;

    fn record() -> Record {
        Record {
            id: "1".into(),
            name: "Youth Rent Support".into(),
            department: "Housing".into(),
            summary: "Monthly rent aid".into(),
            sections: vec![
                Section::new("Eligibility", "Ages 19 to 34"),
                Section::new("How to apply", "   "),
            ],
            ..Record::default()
        }
    }

    #[test]
    fn record_without_attachments_has_only_structured_fields() {
        let text = render(&record(), &[]);
        assert_eq!(
            text,
            "[Overview]\nName: Youth Rent Support\nDepartment: Housing\nSummary: Monthly rent aid\n\
             \n[Eligibility]\nAges 19 to 34\n\
             \n[How to apply]\nno content\n"
        );
        assert!(!text.contains("[Attachments]"));
    }

    #[test]
    fn attachments_render_in_order_with_markers() {
        let text = render(
            &record(),
            &[
                ("a.pdf".into(), ExtractionOutcome::Text("alpha".into())),
                ("b.jpg".into(), ExtractionOutcome::Empty),
                (
                    "c.zip".into(),
                    ExtractionOutcome::Error(ExtractionError::CorruptOrEncrypted),
                ),
            ],
        );
        let tail = text.split("[Attachments]\n").nth(1).unwrap();
        assert_eq!(
            tail,
            "=== [Attachment: a.pdf] ===\nalpha\n\
             \n=== [Attachment: b.jpg] ===\n[no content]\n\
             \n=== [Attachment: c.zip] ===\n[no content: corrupt or encrypted archive]\n"
        );
    }

    #[test]
    fn labels_use_file_names() {
        assert_eq!(attachment_label(Path::new("dl/2024/notice.hwp")), "notice.hwp");
    }
}
