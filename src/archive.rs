//! Recursive archive expansion.
//!
//! A `.zip` attachment is unpacked into its own temporary directory, every
//! member file is routed back through the [`ExtractionRouter`] (so nested
//! archives recurse and duplicate members hit the content cache), and the
//! member texts are joined into one labeled document. The temporary directory
//! is a [`tempfile::TempDir`] owned by the expansion and is removed on every
//! exit path when it drops.
//!
//! Each top-level attachment gets an [`ExpansionScope`] carrying a nesting
//! depth limit and a shared budget of unpacked bytes. Exceeding either, or
//! finding an archive inside itself, yields `Error(ArchiveTooLarge)`, which
//! propagates up to the top-level attachment.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ArchiveConfig;
use crate::hasher::Fingerprint;
use crate::outcome::{ExtractionError, ExtractionOutcome};
use crate::router::{ExtractionRouter, Routed};

/// Expansion limits and ancestry for one top-level attachment.
#[derive(Debug, Clone)]
pub struct ExpansionScope {
    depth: usize,
    max_depth: usize,
    budget: Arc<AtomicU64>,
    max_bytes: u64,
    ancestors: Vec<Fingerprint>,
    work_dir: Option<PathBuf>,
}

impl ExpansionScope {
    pub fn top_level(limits: &ArchiveConfig) -> Self {
        Self {
            depth: 0,
            max_depth: limits.max_depth,
            budget: Arc::new(AtomicU64::new(limits.max_expanded_bytes)),
            max_bytes: limits.max_expanded_bytes,
            ancestors: Vec::new(),
            work_dir: limits.work_dir.clone(),
        }
    }

    /// Archive nesting level of files routed in this scope (0 = top-level attachment).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether an archive needing `nesting` levels may be expanded from here.
    pub fn has_room_for(&self, nesting: usize) -> bool {
        self.depth + nesting <= self.max_depth
    }

    /// Whether an enclosing archive with this fingerprint is being expanded.
    pub fn is_expanding(&self, fingerprint: &Fingerprint) -> bool {
        self.ancestors.contains(fingerprint)
    }

    /// Bytes still available for unpacking.
    pub fn remaining_bytes(&self) -> u64 {
        self.budget.load(Ordering::Relaxed)
    }

    pub(crate) fn enter(&self, fingerprint: Option<Fingerprint>) -> Result<ExpansionScope, ExtractionError> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(ExtractionError::ArchiveTooLarge(format!(
                "nested deeper than {} levels",
                self.max_depth
            )));
        }
        let mut ancestors = self.ancestors.clone();
        ancestors.extend(fingerprint);
        Ok(ExpansionScope {
            depth,
            max_depth: self.max_depth,
            budget: self.budget.clone(),
            max_bytes: self.max_bytes,
            ancestors,
            work_dir: self.work_dir.clone(),
        })
    }
}

#[derive(Error, Debug)]
enum UnpackError {
    #[error("{0}")]
    Corrupt(String),

    #[error("expanded size exceeds {0} bytes")]
    OverBudget(u64),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Unpack `archive` into `dest`, charging every written byte to `budget`.
///
/// Entries whose names would escape `dest` are skipped.
fn unpack(archive: &Path, dest: &Path, budget: &AtomicU64, max_bytes: u64) -> Result<(), UnpackError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| UnpackError::Corrupt(e.to_string()))?;

    for i in 0..zip.len() {
        // Encrypted entries fail here with "password required".
        let mut entry = zip
            .by_index(i)
            .map_err(|e| UnpackError::Corrupt(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            debug!(entry = %entry.name(), "skipping archive entry outside extraction root");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let remaining = budget.load(Ordering::Relaxed);
        let mut out = File::create(&out_path)?;
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
            .map_err(|e| UnpackError::Corrupt(e.to_string()))?;
        if written > remaining {
            return Err(UnpackError::OverBudget(max_bytes));
        }
        budget.fetch_sub(written, Ordering::Relaxed);
    }
    Ok(())
}

/// An unpacked file and its label (path relative to the archive root, `/`-separated).
struct Member {
    path: PathBuf,
    label: String,
}

/// Regular files under `root`, depth-first, sorted by file name.
fn collect_members(root: &Path) -> Vec<Member> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                debug!(error = %e, "skipping unreadable archive member");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let label = e
                .path()
                .strip_prefix(root)
                .unwrap_or(e.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Member {
                path: e.into_path(),
                label,
            }
        })
        .collect()
}

/// Marker written in place of text for a failed extraction.
pub fn no_content_marker(error: &ExtractionError) -> String {
    format!("[no content: {}]", error)
}

/// Expand the archive at `path` and return the labeled text of its members.
///
/// The returned nesting counts this archive plus the deepest archive found
/// among its members.
pub(crate) async fn expand(
    router: &ExtractionRouter,
    path: &Path,
    fingerprint: Option<Fingerprint>,
    scope: &ExpansionScope,
) -> Routed {
    let inner = match scope.enter(fingerprint) {
        Ok(s) => s,
        Err(e) => return Routed::leaf(e.into()),
    };
    let failed = |e: ExtractionError| Routed {
        outcome: e.into(),
        nesting: 1,
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix("atx-archive-");
    let created = match &inner.work_dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    };
    let workdir = match created {
        Ok(d) => d,
        Err(e) => return failed(ExtractionError::Failed(format!("temporary directory: {}", e))),
    };

    let archive_path = path.to_path_buf();
    let dest = workdir.path().to_path_buf();
    let budget = inner.budget.clone();
    let max_bytes = inner.max_bytes;
    let unpacked =
        tokio::task::spawn_blocking(move || unpack(&archive_path, &dest, &budget, max_bytes)).await;

    match unpacked {
        Ok(Ok(())) => {}
        Ok(Err(UnpackError::Corrupt(reason))) => {
            debug!(file = %path.display(), %reason, "archive could not be read");
            return failed(ExtractionError::CorruptOrEncrypted);
        }
        Ok(Err(e @ UnpackError::OverBudget(_))) => {
            return Routed::leaf(ExtractionError::ArchiveTooLarge(e.to_string()).into());
        }
        Ok(Err(UnpackError::Io(e))) => {
            return failed(ExtractionError::Failed(format!("unpacking archive: {}", e)));
        }
        Err(e) => return failed(ExtractionError::Failed(format!("unpack task aborted: {}", e))),
    }

    let mut deepest = 0;
    let mut fragments = Vec::new();
    for member in collect_members(workdir.path()) {
        let routed = router.route_scoped(&member.path, &inner).await;
        deepest = deepest.max(routed.nesting);
        let body = match routed.outcome {
            ExtractionOutcome::Text(text) => text,
            ExtractionOutcome::Empty => continue,
            ExtractionOutcome::Error(e @ ExtractionError::ArchiveTooLarge(_)) => {
                return Routed::leaf(e.into())
            }
            ExtractionOutcome::Error(e) => no_content_marker(&e),
        };
        fragments.push(format!("[Archive member: {}]\n{}", member.label, body));
    }

    if let Err(e) = workdir.close() {
        debug!(error = %e, "failed to remove archive workdir");
    }

    let outcome = if fragments.is_empty() {
        ExtractionOutcome::Empty
    } else {
        ExtractionOutcome::Text(fragments.join("\n\n"))
    };
    Routed {
        outcome,
        nesting: deepest + 1,
    }
}
