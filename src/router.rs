//! Attachment routing: fingerprint, consult the cache, dispatch by kind.
//!
//! ```text
//! route(path)
//!   ├─ missing / not a file ──────────────▶ Error(Unreadable), cache untouched
//!   ├─ unsupported extension ─────────────▶ Empty, no extractor runs
//!   ├─ cannot open ───────────────────────▶ Error(Unreadable), cache untouched
//!   ├─ hash fails otherwise ──────────────▶ dispatch, result not cached
//!   └─ fingerprint ─▶ ContentCache ─ hit ─▶ stored outcome (archives re-checked against depth)
//!                                  └ miss ─▶ dispatch ─▶ store ─▶ outcome
//!
//! dispatch: Archive ─▶ archive::expand ─▶ route(member) for each member
//!           LegacyDocument / Document / Image ─▶ Extractor::extract
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::archive::{self, ExpansionScope};
use crate::cache::ContentCache;
use crate::config::{ArchiveConfig, Config};
use crate::converter::LegacyDocumentExtractor;
use crate::extract::{Extractor, FileKind, PdfExtractor};
use crate::hasher::{hash_file, Fingerprint};
use crate::ocr::ImageExtractor;
use crate::outcome::{ExtractionError, ExtractionOutcome};

type RouteFuture<'a> = Pin<Box<dyn Future<Output = Routed> + Send + 'a>>;

/// An outcome plus the archive levels expanded below the routed file
/// (0 for anything that is not an archive, 1 for a zip without nested zips).
#[derive(Debug)]
pub(crate) struct Routed {
    pub outcome: ExtractionOutcome,
    pub nesting: usize,
}

impl Routed {
    pub(crate) fn leaf(outcome: ExtractionOutcome) -> Self {
        Self { outcome, nesting: 0 }
    }
}

/// One extractor per non-archive [`FileKind`].
#[derive(Clone)]
pub struct Extractors {
    pub document: Arc<dyn Extractor>,
    pub legacy_document: Arc<dyn Extractor>,
    pub image: Arc<dyn Extractor>,
}

impl Extractors {
    /// Build the production extractors. Probes the OCR engine once.
    pub async fn from_config(config: &Config) -> Self {
        Self {
            document: Arc::new(PdfExtractor::new()),
            legacy_document: Arc::new(LegacyDocumentExtractor::from_config(&config.converter)),
            image: Arc::new(ImageExtractor::from_config(&config.ocr).await),
        }
    }

    fn for_kind(&self, kind: FileKind) -> Option<&Arc<dyn Extractor>> {
        match kind {
            FileKind::Document => Some(&self.document),
            FileKind::LegacyDocument => Some(&self.legacy_document),
            FileKind::Image => Some(&self.image),
            FileKind::Archive | FileKind::Unsupported => None,
        }
    }
}

pub struct ExtractionRouter {
    extractors: Extractors,
    cache: Arc<ContentCache>,
    limits: ArchiveConfig,
    /// Nesting each cached archive outcome needed, so a reuse deeper in
    /// another archive hits the same depth limit a fresh expansion would.
    nesting: Mutex<HashMap<Fingerprint, usize>>,
}

impl ExtractionRouter {
    pub fn new(extractors: Extractors, cache: Arc<ContentCache>, limits: ArchiveConfig) -> Self {
        Self {
            extractors,
            cache,
            limits,
            nesting: Mutex::new(HashMap::new()),
        }
    }

    /// Production router with a fresh cache.
    pub async fn from_config(config: &Config) -> Self {
        Self::new(
            Extractors::from_config(config).await,
            Arc::new(ContentCache::new()),
            config.archive.clone(),
        )
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Convert a top-level attachment to text.
    pub async fn route(&self, path: &Path) -> ExtractionOutcome {
        let scope = ExpansionScope::top_level(&self.limits);
        self.route_scoped(path, &scope).await.outcome
    }

    fn nesting(&self) -> MutexGuard<'_, HashMap<Fingerprint, usize>> {
        self.nesting.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn nesting_of(&self, fingerprint: &Fingerprint) -> usize {
        self.nesting().get(fingerprint).copied().unwrap_or(0)
    }

    /// Route a file found at any nesting level. Boxed because archive
    /// expansion recurses back into the router.
    pub(crate) fn route_scoped<'a>(
        &'a self,
        path: &'a Path,
        scope: &'a ExpansionScope,
    ) -> RouteFuture<'a> {
        Box::pin(async move {
            let file = display_name(path);

            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => {}
                _ => {
                    warn!(file = %path.display(), "attachment missing or unreadable");
                    return Routed::leaf(ExtractionError::Unreadable.into());
                }
            }

            let kind = FileKind::classify(path);
            if kind == FileKind::Unsupported {
                debug!(%file, "unsupported extension; no extraction");
                return Routed::leaf(ExtractionOutcome::Empty);
            }

            let owned = path.to_path_buf();
            let hashed = tokio::task::spawn_blocking(move || hash_file(&owned))
                .await
                .map_err(io::Error::other)
                .and_then(|r| r);

            self.route_hashed(path, kind, hashed, scope).await
        })
    }

    async fn route_hashed(
        &self,
        path: &Path,
        kind: FileKind,
        hashed: io::Result<Fingerprint>,
        scope: &ExpansionScope,
    ) -> Routed {
        let file = display_name(path);

        let fingerprint = match hashed {
            Ok(fp) => fp,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                warn!(%file, error = %e, "attachment cannot be opened");
                return Routed::leaf(ExtractionError::Unreadable.into());
            }
            Err(e) => {
                warn!(%file, error = %e, "could not fingerprint; extracting without cache");
                return self.dispatch(path, kind, None, scope).await;
            }
        };

        if scope.is_expanding(&fingerprint) {
            return Routed::leaf(
                ExtractionError::ArchiveTooLarge("archive contains itself".to_string()).into(),
            );
        }

        let (outcome, reused) = self
            .cache
            .get_or_extract(fingerprint, || async {
                let routed = self.dispatch(path, kind, Some(fingerprint), scope).await;
                if kind == FileKind::Archive && routed.outcome.is_cacheable() {
                    self.nesting().insert(fingerprint, routed.nesting);
                }
                routed.outcome
            })
            .await;

        let nesting = if kind == FileKind::Archive {
            self.nesting_of(&fingerprint)
        } else {
            0
        };

        if reused {
            if scope.depth() == 0 {
                info!(%file, fingerprint = %fingerprint.short(), "duplicate content; reusing extracted text");
            } else {
                debug!(%file, fingerprint = %fingerprint.short(), "duplicate archive member; reusing extracted text");
            }
            if !scope.has_room_for(nesting) {
                return Routed::leaf(
                    ExtractionError::ArchiveTooLarge(format!(
                        "nested deeper than {} levels",
                        scope.max_depth()
                    ))
                    .into(),
                );
            }
        }
        Routed { outcome, nesting }
    }

    async fn dispatch(
        &self,
        path: &Path,
        kind: FileKind,
        fingerprint: Option<Fingerprint>,
        scope: &ExpansionScope,
    ) -> Routed {
        let file = display_name(path);
        if scope.depth() == 0 {
            info!(%file, %kind, "extracting");
        } else {
            debug!(%file, %kind, depth = scope.depth(), "extracting archive member");
        }

        let routed = match self.extractors.for_kind(kind) {
            Some(extractor) => {
                debug!(%file, extractor = extractor.name(), "dispatching");
                Routed::leaf(extractor.extract(path).await)
            }
            None if kind == FileKind::Archive => {
                archive::expand(self, path, fingerprint, scope).await
            }
            None => Routed::leaf(ExtractionOutcome::Empty),
        };

        if let ExtractionOutcome::Error(e) = &routed.outcome {
            warn!(%file, %kind, kind_of_error = e.kind(), reason = %e, "extraction failed");
        }
        routed
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
