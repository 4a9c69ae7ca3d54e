//! # Attach Harness CLI (`atx`)
//!
//! The `atx` binary runs the attachment extraction pipeline over a record
//! list and offers single-file tools for checking how an attachment converts.
//!
//! ## Usage
//!
//! ```bash
//! atx --config ./config/atx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `atx run` | Extract every record's attachments and write aggregated text |
//! | `atx probe <file>` | Route one attachment and show what it produced |
//! | `atx classify <file>...` | Show how files are classified by extension |
//!
//! ## Examples
//!
//! ```bash
//! # Full batch with paths from the config file
//! atx run --config ./config/atx.toml
//!
//! # Override input/output and process four records at a time
//! atx run --input data/records.json --output data/records_rag.json --concurrency 4
//!
//! # Check that an HWP converts (warns on suspiciously short output)
//! atx probe downloads/notice.hwp
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use attach_harness::config::{self, Config};
use attach_harness::extract::FileKind;
use attach_harness::hasher::hash_file;
use attach_harness::ingest;
use attach_harness::outcome::ExtractionOutcome;
use attach_harness::progress::ProgressMode;
use attach_harness::router::ExtractionRouter;

const DEFAULT_CONFIG: &str = "./config/atx.toml";
const PREVIEW_CHARS: usize = 200;
const SHORT_TEXT_CHARS: usize = 100;

/// Attach Harness CLI: content-addressed attachment text extraction.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/atx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "atx",
    about = "Attach Harness: turn record attachments into aggregated text for RAG ingestion",
    version,
    long_about = "Attach Harness converts archives, HWP documents, PDFs, and images attached to \
    structured records into one aggregated text per record. Byte-identical attachments are \
    extracted once per run, nested archives are expanded recursively under depth and size limits, \
    and failed attachments are reported inline instead of aborting the batch."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/atx.toml`. When the default file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every record in the record list.
    ///
    /// Routes each attachment through the content-addressed cache, builds the
    /// aggregated text, writes the output collection, and prints a summary.
    Run {
        /// Record list (JSON). Overrides `[input] records`.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output file (JSON). Overrides `[output] path`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Records processed at once. Overrides `[pipeline] concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Progress on stderr. Defaults to `human` on a terminal, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Extract one attachment and show the result.
    ///
    /// Prints the classification, fingerprint, outcome, character count, and
    /// the first and last characters of the text. Warns when the text is very
    /// short, which usually means an image-only document.
    Probe {
        /// Attachment to extract.
        file: PathBuf,
    },

    /// Show the extension classification of each file.
    Classify {
        /// Files to classify.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { files } => {
            for file in &files {
                println!("{:<16} {}", FileKind::classify(file).as_str(), file.display());
            }
        }
        Commands::Probe { file } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            probe(&cfg, &file).await?;
        }
        Commands::Run {
            input,
            output,
            concurrency,
            progress,
        } => {
            let mut cfg = load_or_default(&cli.config)?;
            if input.is_some() {
                cfg.input.records = input;
            }
            if output.is_some() {
                cfg.output.path = output;
            }
            if let Some(n) = concurrency {
                cfg.pipeline.concurrency = n;
            }
            config::validate(&cfg)?;

            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let router = Arc::new(ExtractionRouter::from_config(&cfg).await);
            let stats = ingest::run_batch(&cfg, router, &*reporter).await?;
            stats.print_summary();
        }
    }

    Ok(())
}

/// Load the config file. A missing file at the default location means defaults.
fn load_or_default(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

async fn probe(cfg: &Config, file: &Path) -> Result<()> {
    let kind = FileKind::classify(file);
    println!("file:         {}", file.display());
    println!("kind:         {}", kind);

    let owned = file.to_path_buf();
    match tokio::task::spawn_blocking(move || hash_file(&owned)).await? {
        Ok(fp) => println!("fingerprint:  {}", fp),
        Err(e) => println!("fingerprint:  unavailable ({})", e),
    }

    let router = ExtractionRouter::from_config(cfg).await;
    let outcome = router.route(file).await;

    match &outcome {
        ExtractionOutcome::Text(text) => {
            let chars: Vec<char> = text.chars().collect();
            println!("outcome:      text");
            println!("chars:        {}", chars.len());
            println!();
            println!("--- head ---");
            println!("{}", chars.iter().take(PREVIEW_CHARS).collect::<String>());
            if chars.len() > PREVIEW_CHARS {
                println!("--- tail ---");
                println!(
                    "{}",
                    chars[chars.len().saturating_sub(PREVIEW_CHARS)..]
                        .iter()
                        .collect::<String>()
                );
            }
            if chars.len() < SHORT_TEXT_CHARS {
                println!();
                println!(
                    "warning: only {} characters extracted; the document may be image-only",
                    chars.len()
                );
            }
        }
        ExtractionOutcome::Empty => {
            println!("outcome:      empty");
            println!("chars:        0");
        }
        ExtractionOutcome::Error(e) => {
            println!("outcome:      error ({})", e.kind());
            println!("reason:       {}", e);
        }
    }

    Ok(())
}
