//! Batch run progress reporting.
//!
//! Reports which record is being processed and how many remain during
//! `atx run`. Progress is emitted on **stderr** so stdout stays parseable
//! for the run summary.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug)]
pub enum RunProgressEvent {
    /// The record list is being read. Total unknown.
    Loading { source: String },
    /// Record `n` of `total` finished.
    Processing {
        n: u64,
        total: u64,
        record_id: String,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "run  processing  1,234 / 5,000 records  (id 42)".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Loading { source } => format!("run  loading {}...\n", source),
            RunProgressEvent::Processing {
                n,
                total,
                record_id,
            } => format!(
                "run  processing  {} / {} records  (id {})\n",
                format_number(*n),
                format_number(*total),
                record_id
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Loading { source } => serde_json::json!({
                "event": "progress",
                "phase": "loading",
                "source": source
            }),
            RunProgressEvent::Processing {
                n,
                total,
                record_id,
            } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "record_id": record_id
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn modes_parse_from_cli_values() {
        use clap::ValueEnum;
        assert_eq!(ProgressMode::from_str("json", true), Ok(ProgressMode::Json));
        assert_eq!(ProgressMode::from_str("off", true), Ok(ProgressMode::Off));
        assert!(ProgressMode::from_str("loud", true).is_err());
    }
}
