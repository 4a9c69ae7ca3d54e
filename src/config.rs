use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InputConfig {
    /// JSON file with the record list.
    #[serde(default)]
    pub records: Option<PathBuf>,
    /// Base directory for relative attachment paths. Defaults to the working directory.
    #[serde(default)]
    pub attachments_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            pretty: true,
        }
    }
}

fn default_pretty() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Records processed at once. Attachments within a record are always sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// External converter for `.hwp` / `.hwpx` documents.
#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default = "default_converter_command")]
    pub command: String,
    /// Arguments placed before the attachment path (e.g. a script path when
    /// `command` is an interpreter).
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
            args: Vec::new(),
            timeout_secs: default_converter_timeout(),
        }
    }
}

fn default_converter_command() -> String {
    "hwp5txt".to_string()
}
fn default_converter_timeout() -> u64 {
    180
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ocr_command")]
    pub command: String,
    /// Tesseract languages, e.g. `kor+eng`.
    #[serde(default = "default_ocr_languages")]
    pub languages: String,
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_ocr_command(),
            languages: default_ocr_languages(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ocr_command() -> String {
    "tesseract".to_string()
}
fn default_ocr_languages() -> String {
    "kor+eng".to_string()
}
fn default_ocr_timeout() -> u64 {
    120
}

/// Limits applied to one top-level attachment's archive expansion.
#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Nested archive levels that may be expanded (a top-level zip is level 1).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Total bytes that may be unpacked across all nesting levels.
    #[serde(default = "default_max_expanded_bytes")]
    pub max_expanded_bytes: u64,
    /// Where archives are unpacked. Defaults to the system temporary directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_expanded_bytes: default_max_expanded_bytes(),
            work_dir: None,
        }
    }
}

fn default_max_depth() -> usize {
    8
}
fn default_max_expanded_bytes() -> u64 {
    512 * 1024 * 1024
}

impl Config {
    /// All-defaults configuration for commands that can run without a file.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Resolve an attachment path against `input.attachments_root`.
    pub fn resolve_attachment(&self, path: &Path) -> PathBuf {
        self.input.resolve_attachment(path)
    }
}

impl InputConfig {
    pub fn resolve_attachment(&self, path: &Path) -> PathBuf {
        match &self.attachments_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be >= 1");
    }

    if config.converter.command.trim().is_empty() {
        anyhow::bail!("converter.command must not be empty");
    }
    if config.converter.timeout_secs == 0 {
        anyhow::bail!("converter.timeout_secs must be >= 1");
    }

    if config.ocr.command.trim().is_empty() {
        anyhow::bail!("ocr.command must not be empty");
    }
    if config.ocr.timeout_secs == 0 {
        anyhow::bail!("ocr.timeout_secs must be >= 1");
    }

    if config.archive.max_depth == 0 {
        anyhow::bail!("archive.max_depth must be >= 1");
    }
    if config.archive.max_expanded_bytes == 0 {
        anyhow::bail!("archive.max_expanded_bytes must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atx.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_dir, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.pipeline.concurrency, 1);
        assert_eq!(cfg.converter.command, "hwp5txt");
        assert_eq!(cfg.converter.timeout_secs, 180);
        assert_eq!(cfg.ocr.languages, "kor+eng");
        assert_eq!(cfg.archive.max_depth, 8);
        assert!(cfg.output.pretty);
    }

    #[test]
    fn full_file_parses() {
        let (_dir, path) = write_config(
            r#"
[input]
records = "data/records.json"
attachments_root = "data"

[output]
path = "data/out.json"
pretty = false

[pipeline]
concurrency = 4

[converter]
command = "python3"
args = ["/usr/local/bin/hwp5txt"]
timeout_secs = 60

[ocr]
enabled = false
languages = "eng"

[archive]
max_depth = 3
max_expanded_bytes = 1048576
work_dir = "/var/tmp/atx"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.input.records, Some(PathBuf::from("data/records.json")));
        assert_eq!(cfg.converter.args, vec!["/usr/local/bin/hwp5txt".to_string()]);
        assert_eq!(cfg.pipeline.concurrency, 4);
        assert!(!cfg.ocr.enabled);
        assert_eq!(cfg.archive.max_expanded_bytes, 1_048_576);
        assert_eq!(cfg.archive.work_dir, Some(PathBuf::from("/var/tmp/atx")));
        assert!(!cfg.output.pretty);
    }

    #[test]
    fn example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/atx.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.archive.max_expanded_bytes, 512 * 1024 * 1024);
        assert_eq!(cfg.ocr.command, "tesseract");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let (_dir, path) = write_config("[pipeline]\nconcurrency = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let (_dir, path) = write_config("[archive]\nmax_depth = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/definitely/not/here.toml"));
    }

    #[test]
    fn relative_attachments_resolve_against_root() {
        let mut cfg = Config::minimal();
        assert_eq!(
            cfg.resolve_attachment(Path::new("a/b.pdf")),
            PathBuf::from("a/b.pdf")
        );
        cfg.input.attachments_root = Some(PathBuf::from("/data"));
        assert_eq!(
            cfg.resolve_attachment(Path::new("a/b.pdf")),
            PathBuf::from("/data/a/b.pdf")
        );
        assert_eq!(
            cfg.resolve_attachment(Path::new("/abs/c.pdf")),
            PathBuf::from("/abs/c.pdf")
        );
    }
}
