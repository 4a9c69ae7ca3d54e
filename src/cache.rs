//! Fingerprint-keyed cache of extraction outcomes.
//!
//! One [`ContentCache`] lives for one batch run and is passed explicitly to the
//! router. Entries are first-writer-wins: extraction is a pure function of the
//! bytes, so the first outcome stored for a fingerprint is authoritative.
//!
//! Each fingerprint owns a [`OnceCell`]. When two workers ask for the same
//! fingerprint concurrently, one runs the extraction and the other waits on
//! the cell, so every fingerprint is extracted at most once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use crate::hasher::Fingerprint;
use crate::outcome::ExtractionOutcome;

type Slot = Arc<OnceCell<ExtractionOutcome>>;

/// Hit/miss counters. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from an existing entry (duplicate content).
    pub hits: u64,
    /// Lookups that ran an extraction.
    pub misses: u64,
    /// Fingerprints with a stored outcome.
    pub entries: usize,
}

#[derive(Default)]
pub struct ContentCache {
    slots: Mutex<HashMap<Fingerprint, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        // Slot maps stay consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, fingerprint: Fingerprint) -> Slot {
        self.slots().entry(fingerprint).or_default().clone()
    }

    /// Look up a stored outcome. Counts a hit when one is found.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ExtractionOutcome> {
        let slot = self.slots().get(fingerprint).cloned()?;
        let outcome = slot.get().cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(outcome)
    }

    /// Store `outcome` unless the fingerprint already has one (or is being
    /// extracted right now). Returns whether the value was inserted.
    pub fn put(&self, fingerprint: Fingerprint, outcome: ExtractionOutcome) -> bool {
        self.slot(fingerprint).set(outcome).is_ok()
    }

    /// Return the stored outcome for `fingerprint`, running `extract` only if
    /// no outcome exists and no other caller is already extracting it.
    ///
    /// The flag is `true` when the outcome came from another extraction
    /// (duplicate content). Outcomes that are not cacheable (see
    /// [`ExtractionOutcome::is_cacheable`]) are returned to this caller without
    /// being stored.
    pub async fn get_or_extract<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        extract: F,
    ) -> (ExtractionOutcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExtractionOutcome>,
    {
        let slot = self.slot(fingerprint);
        if let Some(outcome) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (outcome.clone(), true);
        }

        let mut ran = false;
        let result = slot
            .get_or_try_init(|| {
                ran = true;
                let fut = extract();
                async move {
                    let outcome = fut.await;
                    if outcome.is_cacheable() {
                        Ok(outcome)
                    } else {
                        Err(outcome)
                    }
                }
            })
            .await;

        if ran {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        match result {
            Ok(outcome) => (outcome.clone(), !ran),
            Err(uncached) => (uncached, false),
        }
    }

    /// Number of fingerprints with a stored outcome.
    pub fn len(&self) -> usize {
        self.slots().values().filter(|s| s.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits(),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use crate::outcome::ExtractionError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn text(s: &str) -> ExtractionOutcome {
        ExtractionOutcome::Text(s.to_string())
    }

    #[test]
    fn empty_cache_misses() {
        let cache = ContentCache::new();
        assert!(cache.get(&hash_bytes(b"a")).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn first_writer_wins() {
        let cache = ContentCache::new();
        let fp = hash_bytes(b"a");
        assert!(cache.put(fp, text("first")));
        assert!(!cache.put(fp, text("second")));
        assert_eq!(cache.get(&fp), Some(text("first")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hits_are_counted() {
        let cache = ContentCache::new();
        let fp = hash_bytes(b"a");
        cache.put(fp, ExtractionOutcome::Empty);
        cache.get(&fp);
        cache.get(&fp);
        assert_eq!(cache.hits(), 2);
    }

    #[tokio::test]
    async fn get_or_extract_runs_once_per_fingerprint() {
        let cache = ContentCache::new();
        let fp = hash_bytes(b"doc");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let (out, _) = cache
                .get_or_extract(fp, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    text("hello")
                })
                .await;
            assert_eq!(out, text("hello"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn errors_and_empties_are_cached() {
        let cache = ContentCache::new();
        let bad = hash_bytes(b"bad");
        let blank = hash_bytes(b"blank");
        cache
            .get_or_extract(bad, || async {
                ExtractionOutcome::Error(ExtractionError::CorruptOrEncrypted)
            })
            .await;
        cache
            .get_or_extract(blank, || async { ExtractionOutcome::Empty })
            .await;
        assert_eq!(
            cache.get(&bad),
            Some(ExtractionOutcome::Error(ExtractionError::CorruptOrEncrypted))
        );
        assert_eq!(cache.get(&blank), Some(ExtractionOutcome::Empty));
    }

    #[tokio::test]
    async fn budget_errors_are_returned_but_not_stored() {
        let cache = ContentCache::new();
        let fp = hash_bytes(b"bomb");
        let (out, reused) = cache
            .get_or_extract(fp, || async {
                ExtractionOutcome::Error(ExtractionError::ArchiveTooLarge("depth".to_string()))
            })
            .await;
        assert!(!reused);
        assert!(matches!(
            out,
            ExtractionOutcome::Error(ExtractionError::ArchiveTooLarge(_))
        ));
        assert!(cache.get(&fp).is_none());

        // A later caller gets to try again.
        let (out, reused) = cache.get_or_extract(fp, || async { text("fine") }).await;
        assert_eq!(out, text("fine"));
        assert!(!reused);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_extraction() {
        let cache = Arc::new(ContentCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let fp = hash_bytes(b"shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_extract(fp, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        text("winner")
                    })
                    .await
            }));
        }
        let mut reused = 0;
        for h in handles {
            let (out, hit) = h.await.unwrap();
            assert_eq!(out, text("winner"));
            reused += hit as usize;
        }
        assert_eq!(reused, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 7);
    }
}
