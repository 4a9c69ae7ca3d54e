//! Record types that flow through a batch run.
//!
//! Input records are read from JSON, their attachments are extracted, and
//! each is written back as a [`ProcessedRecord`] carrying the aggregated text
//! and one [`AttachmentReport`] per attachment.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::outcome::{ExtractionOutcome, OutcomeStatus};

/// A structured record owning zero or more attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    #[serde(default, alias = "service_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "service_name")]
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub summary: String,
    /// Free-text sections, rendered in order.
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Local attachment paths, in the order they should appear.
    #[serde(default, alias = "files")]
    pub attachments: Vec<PathBuf>,
    /// Keys this crate does not interpret. Written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl Section {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for record id, got {}",
            other
        ))),
    }
}

/// Parse a record list: either a JSON array of records or an object mapping
/// record id to record. Order is preserved in both forms; in the map form a
/// record without its own `id` takes the map key.
pub fn parse_records(json: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(json).context("record list is not valid JSON")?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                serde_json::from_value(v).with_context(|| format!("invalid record at index {}", i))
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, v)| {
                let mut record: Record = serde_json::from_value(v)
                    .with_context(|| format!("invalid record '{}'", key))?;
                if record.id.is_empty() {
                    record.id = key;
                }
                Ok(record)
            })
            .collect(),
        _ => bail!("record list must be a JSON array or object"),
    }
}

/// Per-attachment result written alongside the aggregated text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttachmentReport {
    pub path: String,
    pub status: OutcomeStatus,
    /// Characters of extracted text (0 unless `status` is `text`).
    pub chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Machine-readable error label (`timeout`, `corrupt_or_encrypted`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl AttachmentReport {
    pub fn new(path: impl Into<String>, outcome: &ExtractionOutcome) -> Self {
        Self {
            path: path.into(),
            status: outcome.status(),
            chars: outcome.text().map(|t| t.chars().count()).unwrap_or(0),
            reason: outcome.error().map(|e| e.to_string()),
            error_kind: outcome.error().map(|e| e.kind().to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }
}

/// Output keys written by a run. Stale copies carried in from a previous
/// run's output are dropped so each key appears once.
const DERIVED_KEYS: [&str; 3] = ["aggregated_text", "attachment_reports", "processed_at"];

/// An input record plus everything the run derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub aggregated_text: String,
    pub attachment_reports: Vec<AttachmentReport>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedRecord {
    pub fn new(
        mut record: Record,
        aggregated_text: String,
        attachment_reports: Vec<AttachmentReport>,
    ) -> Self {
        for key in DERIVED_KEYS {
            record.extra.remove(key);
        }
        Self {
            record,
            aggregated_text,
            attachment_reports,
            processed_at: Utc::now(),
        }
    }
}
