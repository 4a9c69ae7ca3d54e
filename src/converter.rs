//! External command-line converters.
//!
//! Legacy word-processor documents (`.hwp`, `.hwpx`) are converted by an
//! externally installed tool (by default `hwp5txt`) invoked with the attachment
//! path as its last argument. Success is exit code zero with text on stdout.
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | binary not found | `Error(ToolUnavailable)` |
//! | exceeded `timeout_secs` | `Error(Timeout)` (child is killed) |
//! | non-zero exit | `Empty` (usually password-protected or corrupt input) |
//! | exit zero | sanitized stdout, `Empty` if blank |

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::ConverterConfig;
use crate::extract::Extractor;
use crate::outcome::{ExtractionError, ExtractionOutcome};

/// A program plus fixed leading arguments, run under a deadline.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// How a tool invocation ended.
#[derive(Debug)]
pub enum ToolRun {
    Finished {
        success: bool,
        code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    NotFound,
    TimedOut,
    SpawnFailed(io::Error),
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Run the tool with `extra` appended to the configured arguments.
    pub async fn run<I, S>(&self, extra: I) -> ToolRun
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ToolRun::NotFound,
            Err(e) => return ToolRun::SpawnFailed(e),
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ToolRun::Finished {
                success: output.status.success(),
                code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Ok(Err(e)) => ToolRun::SpawnFailed(e),
            Err(_) => ToolRun::TimedOut,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

/// Remove control characters and normalize Unicode line/paragraph separators
/// to `\n`. Tabs, newlines and carriage returns are kept.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2028}' | '\u{2029}' => out.push('\n'),
            '\t' | '\n' | '\r' => out.push(c),
            c if c.is_ascii_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Extractor for legacy word-processor documents via an external converter.
pub struct LegacyDocumentExtractor {
    tool: ToolCommand,
}

impl LegacyDocumentExtractor {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(ToolCommand::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }
}

#[async_trait]
impl Extractor for LegacyDocumentExtractor {
    fn name(&self) -> &str {
        &self.tool.program
    }

    async fn extract(&self, path: &Path) -> ExtractionOutcome {
        match self.tool.run([path.as_os_str()]).await {
            ToolRun::Finished {
                success: true,
                stdout,
                ..
            } => ExtractionOutcome::from_text(sanitize_text(&String::from_utf8_lossy(&stdout))),
            ToolRun::Finished { code, stderr, .. } => {
                debug!(
                    file = %path.display(),
                    code = ?code,
                    stderr = %String::from_utf8_lossy(&stderr).trim(),
                    "converter exited non-zero; treating as empty"
                );
                ExtractionOutcome::Empty
            }
            ToolRun::NotFound => ExtractionError::ToolUnavailable(self.tool.program.clone()).into(),
            ToolRun::TimedOut => ExtractionError::Timeout(self.tool.timeout_secs()).into(),
            ToolRun::SpawnFailed(e) => {
                ExtractionError::Failed(format!("{}: {}", self.tool.program, e)).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_controls_and_normalizes_separators() {
        let raw = "a\u{0}b\u{7}c\u{b}\u{c}d\u{1f}e\u{7f}f\u{2028}g\u{2029}h\ti\r\nj";
        assert_eq!(sanitize_text(raw), "abcdef\ng\nh\ti\r\nj");
    }

    #[test]
    fn sanitize_keeps_non_ascii_text() {
        assert_eq!(sanitize_text("정신건강 사업 안내"), "정신건강 사업 안내");
    }

    fn tool(program: &str, args: &[&str], secs: u64) -> LegacyDocumentExtractor {
        LegacyDocumentExtractor::new(ToolCommand::new(
            program,
            args.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(secs),
        ))
    }

    #[tokio::test]
    async fn missing_tool_is_tool_unavailable() {
        let ex = tool("atx-no-such-converter-binary", &[], 5);
        let out = ex.extract(Path::new("doc.hwp")).await;
        assert!(matches!(
            out,
            ExtractionOutcome::Error(ExtractionError::ToolUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_output_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.hwp");
        std::fs::write(&doc, "line one\u{2028}line\u{1}two\n").unwrap();
        // `cat <path>` stands in for a converter that prints the document text.
        let out = tool("cat", &[], 5).extract(&doc).await;
        assert_eq!(out, ExtractionOutcome::Text("line one\nlinetwo".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_empty() {
        let out = tool("sh", &["-c", "echo partial; exit 3", "sh"], 5)
            .extract(Path::new("locked.hwp"))
            .await;
        assert_eq!(out, ExtractionOutcome::Empty);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let out = tool("sh", &["-c", "sleep 5", "sh"], 1)
            .extract(Path::new("huge.hwp"))
            .await;
        assert_eq!(out, ExtractionOutcome::Error(ExtractionError::Timeout(1)));
    }
}
