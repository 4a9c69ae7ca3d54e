//! Run statistics and the end-of-run summary.
//!
//! Counts what a batch produced: records, attachment outcomes by kind, and
//! how much work the content cache saved. Printed to stdout by `atx run`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheStats;
use crate::models::ProcessedRecord;
use crate::outcome::OutcomeStatus;
use crate::progress::format_number;

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub records: u64,
    pub attachments: u64,
    pub with_text: u64,
    pub empty: u64,
    /// Failed attachments by error reason kind.
    pub errors: BTreeMap<String, u64>,
    /// Characters of attachment text across all records.
    pub chars: u64,
    pub cache: CacheStats,
    pub output: Option<PathBuf>,
    pub output_bytes: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn record(&mut self, processed: &ProcessedRecord) {
        self.records += 1;
        for report in &processed.attachment_reports {
            self.attachments += 1;
            self.chars += report.chars as u64;
            match report.status {
                OutcomeStatus::Text => self.with_text += 1,
                OutcomeStatus::Empty => self.empty += 1,
                OutcomeStatus::Error => {
                    let kind = report.error_kind.clone().unwrap_or_else(|| "failed".to_string());
                    *self.errors.entry(kind).or_default() += 1;
                }
            }
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors.values().sum()
    }

    pub fn print_summary(&self) {
        println!("run");
        println!("  records:              {}", format_number(self.records));
        println!("  attachments:          {}", format_number(self.attachments));
        println!("    with text:          {}", format_number(self.with_text));
        println!("    empty:              {}", format_number(self.empty));
        println!("    failed:             {}", format_number(self.error_count()));
        for (kind, n) in &self.errors {
            println!("      {:<18} {}", kind, format_number(*n));
        }
        println!("  unique contents:      {}", format_number(self.cache.entries as u64));
        println!("  extractions run:      {}", format_number(self.cache.misses));
        println!("  duplicates reused:    {}", format_number(self.cache.hits));
        println!("  text extracted:       {} chars", format_number(self.chars));
        if let Some(path) = &self.output {
            println!(
                "  output:               {} ({})",
                path.display(),
                format_bytes(self.output_bytes)
            );
        }
        println!("  elapsed:              {:.1}s", self.elapsed.as_secs_f64());
        println!("ok");
    }
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttachmentReport, Record};
    use crate::outcome::{ExtractionError, ExtractionOutcome};
    use chrono::Utc;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn outcomes_are_counted_by_kind() {
        let processed = ProcessedRecord {
            record: Record::default(),
            aggregated_text: String::new(),
            attachment_reports: vec![
                AttachmentReport::new("a.pdf", &ExtractionOutcome::Text("abc".into())),
                AttachmentReport::new("b.jpg", &ExtractionOutcome::Empty),
                AttachmentReport::new("c.zip", &ExtractionError::CorruptOrEncrypted.into()),
                AttachmentReport::new("d.zip", &ExtractionError::CorruptOrEncrypted.into()),
                AttachmentReport::new("e.hwp", &ExtractionError::Timeout(180).into()),
            ],
            processed_at: Utc::now(),
        };
        let mut stats = RunStats::default();
        stats.record(&processed);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.attachments, 5);
        assert_eq!(stats.with_text, 1);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.chars, 3);
        assert_eq!(stats.errors.get("corrupt_or_encrypted"), Some(&2));
        assert_eq!(stats.errors.get("timeout"), Some(&1));
        assert_eq!(stats.error_count(), 3);
    }
}
