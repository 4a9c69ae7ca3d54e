//! Batch run orchestration.
//!
//! Coordinates the full run: read records → route every attachment through
//! the shared router → aggregate → write the output collection. Individual
//! attachment failures never abort the run; only an unreadable record list or
//! an unwritable output does.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::aggregate::RecordAggregator;
use crate::config::Config;
use crate::models::{parse_records, ProcessedRecord, Record};
use crate::progress::{RunProgressEvent, RunProgressReporter};
use crate::router::ExtractionRouter;
use crate::stats::RunStats;

/// Run a full batch as configured, returning what was produced.
pub async fn run_batch(
    config: &Config,
    router: Arc<ExtractionRouter>,
    progress: &dyn RunProgressReporter,
) -> Result<RunStats> {
    let started = Instant::now();

    let Some(input) = config.input.records.as_deref() else {
        bail!("No record list configured: set [input] records or pass --input");
    };
    let Some(output) = config.output.path.as_deref() else {
        bail!("No output path configured: set [output] path or pass --output");
    };

    progress.report(RunProgressEvent::Loading {
        source: input.display().to_string(),
    });
    let records = load_records(input).await?;
    info!(records = records.len(), input = %input.display(), "loaded record list");

    let aggregator = RecordAggregator::new(router.clone(), config.input.clone());
    let processed =
        process_records(&aggregator, records, config.pipeline.concurrency, progress).await?;

    let output_bytes = write_output(output, &processed, config.output.pretty).await?;

    let mut stats = RunStats::default();
    for p in &processed {
        stats.record(p);
    }
    stats.cache = router.cache().stats();
    stats.output = Some(output.to_path_buf());
    stats.output_bytes = output_bytes;
    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// Read and parse the record list. Any failure here is fatal to the run.
pub async fn load_records(path: &Path) -> Result<Vec<Record>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read record list: {}", path.display()))?;
    parse_records(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Process `records` with at most `concurrency` records in flight. Attachments
/// of one record are always routed sequentially. Output order matches input.
pub async fn process_records(
    aggregator: &RecordAggregator,
    records: Vec<Record>,
    concurrency: usize,
    progress: &dyn RunProgressReporter,
) -> Result<Vec<ProcessedRecord>> {
    if records.is_empty() {
        return Ok(vec![]);
    }

    let total = records.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, record) in records.into_iter().enumerate() {
        let aggregator = aggregator.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire().await.ok();
            (index, aggregator.process(record).await)
        });
    }

    let mut results: Vec<Option<ProcessedRecord>> = vec![None; total];
    let mut done = 0u64;
    while let Some(joined) = tasks.join_next().await {
        let (index, processed) = joined.context("record task panicked")?;
        done += 1;
        progress.report(RunProgressEvent::Processing {
            n: done,
            total: total as u64,
            record_id: processed.record.id.clone(),
        });
        results[index] = Some(processed);
    }

    Ok(results.into_iter().flatten().collect())
}

/// Serialize the processed records to `path` as a JSON array. Returns bytes written.
pub async fn write_output(path: &Path, records: &[ProcessedRecord], pretty: bool) -> Result<u64> {
    let json = if pretty {
        serde_json::to_string_pretty(records)?
    } else {
        serde_json::to_string(records)?
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    tokio::fs::write(path, &json)
        .await
        .with_context(|| format!("Failed to write output: {}", path.display()))?;

    info!(records = records.len(), output = %path.display(), "wrote output");
    Ok(json.len() as u64)
}
