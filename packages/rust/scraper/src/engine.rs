//! Concurrent resource discovery across all source adapters.
//!
//! Concepts are processed in fixed-size batches. Batches run one after
//! another with a pause between them; concepts inside a batch run
//! concurrently under a semaphore. Each concept fans out to every adapter,
//! and a failing or slow adapter only costs its own results.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use mathprereq_shared::{DiscoveryConfig, EducationalResource, MathPrereqError, Result};
use mathprereq_storage::Storage;

use crate::adapters::{SearchTarget, SourceAdapter, default_adapters};
use crate::postprocess::post_process;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// What happened to one concept.
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptOutcome {
    /// Resources were discovered recently; no sources were contacted.
    Skipped,
    Searched {
        /// Resources returned by all adapters before cleanup.
        found: usize,
        /// Resources persisted after dedup and the quality filter.
        saved: usize,
        /// Adapters that errored or timed out.
        failed_sources: usize,
    },
}

/// Summary of a discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub concepts_searched: usize,
    pub concepts_skipped: usize,
    pub resources_found: usize,
    pub resources_saved: usize,
    pub failed_sources: usize,
    /// Concepts whose processing failed outright (concept, error).
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

impl DiscoveryReport {
    fn record(&mut self, outcome: &ConceptOutcome) {
        match outcome {
            ConceptOutcome::Skipped => self.concepts_skipped += 1,
            ConceptOutcome::Searched {
                found,
                saved,
                failed_sources,
            } => {
                self.concepts_searched += 1;
                self.resources_found += found;
                self.resources_saved += saved;
                self.failed_sources += failed_sources;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoveryEngine
// ---------------------------------------------------------------------------

/// Finds and persists learning resources for concepts.
#[derive(Clone)]
pub struct DiscoveryEngine {
    storage: Arc<Storage>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: DiscoveryConfig,
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DiscoveryEngine {
    /// Engine over an explicit adapter set.
    pub fn new(
        storage: Arc<Storage>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            storage,
            adapters,
            config,
        }
    }

    /// Engine over the four standard sources.
    pub fn with_default_adapters(storage: Arc<Storage>, config: DiscoveryConfig) -> Result<Self> {
        let adapters = default_adapters(&config)?;
        Ok(Self::new(storage, adapters, config))
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover resources for every named concept.
    ///
    /// Never fails as a whole: per-concept errors are logged and listed in
    /// the report. Names that normalize to the same concept are searched once.
    #[instrument(skip_all, fields(concepts = names.len()))]
    pub async fn discover(&self, names: &[String]) -> DiscoveryReport {
        let start = Instant::now();
        let targets = unique_targets(names);
        let batch_size = self.config.batch_size.max(1);
        let total_batches = targets.len().div_ceil(batch_size);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut report = DiscoveryReport::default();

        info!(
            concepts = targets.len(),
            batches = total_batches,
            "starting resource discovery"
        );

        for (index, batch) in targets.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
            debug!(batch = index + 1, total_batches, "processing batch");

            let mut handles = Vec::with_capacity(batch.len());
            for target in batch {
                let engine = self.clone();
                let sem = semaphore.clone();
                let target = target.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|_| MathPrereqError::Network("discovery cancelled".into()))?;
                    engine.discover_concept(&target).await
                }));
            }

            for (target, handle) in batch.iter().zip(handles) {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(MathPrereqError::Network(format!("discovery task failed: {e}")))
                });
                match result {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => {
                        warn!(concept = %target.concept_name, error = %e, "concept discovery failed");
                        report
                            .errors
                            .push((target.concept_name.clone(), e.to_string()));
                    }
                }
            }
        }

        report.duration = start.elapsed();
        info!(
            searched = report.concepts_searched,
            skipped = report.concepts_skipped,
            saved = report.resources_saved,
            failed_sources = report.failed_sources,
            elapsed_ms = report.duration.as_millis() as u64,
            "resource discovery complete"
        );
        report
    }

    /// Search all adapters for one concept and persist the filtered results.
    ///
    /// New candidates compete with the concept's stored resources under the
    /// quality policy, and the survivors replace the stored set, so the
    /// per-concept caps hold across refreshes.
    #[instrument(skip_all, fields(concept = %target.concept_name))]
    pub async fn discover_concept(&self, target: &SearchTarget) -> Result<ConceptOutcome> {
        let since = Utc::now() - self.config.recent_window;
        let recent = self
            .storage
            .has_recent_resources(&target.concept_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "recency check failed, searching anyway");
                false
            });
        if recent {
            debug!("resources are recent, skipping");
            return Ok(ConceptOutcome::Skipped);
        }

        let (merged, failed_sources) = self.search_all(target).await;
        let found = merged.len();
        if found == 0 {
            info!(failed_sources, "no resources found, stored set unchanged");
            return Ok(ConceptOutcome::Searched {
                found,
                saved: 0,
                failed_sources,
            });
        }

        let fresh_urls: HashSet<String> = merged.iter().map(|r| r.url.clone()).collect();
        let stored = self
            .storage
            .resources_for_concept(&target.concept_id, u32::MAX)
            .await?;
        let previously_stored = stored.len();

        // Fresh copies come first so they win the URL dedup.
        let mut pool = merged;
        pool.extend(stored);
        let kept = post_process(pool, &self.config.quality);
        let saved = kept.iter().filter(|r| fresh_urls.contains(&r.url)).count();
        let removed = self
            .storage
            .replace_concept_resources(&target.concept_id, &kept)
            .await?;

        info!(
            found,
            saved,
            previously_stored,
            removed,
            failed_sources,
            "concept resources stored"
        );
        Ok(ConceptOutcome::Searched {
            found,
            saved,
            failed_sources,
        })
    }

    /// Fan out to every adapter. Results are merged in adapter order.
    async fn search_all(&self, target: &SearchTarget) -> (Vec<EducationalResource>, usize) {
        let timeout = self.config.source_timeout;
        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = adapter.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    let name = adapter.name();
                    let result = match tokio::time::timeout(timeout, adapter.search(&target)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(MathPrereqError::timeout(name, timeout)),
                    };
                    (name, result)
                })
            })
            .collect();

        let mut merged = Vec::new();
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok((name, Ok(resources))) => {
                    debug!(source = name, count = resources.len(), "source returned");
                    merged.extend(resources);
                }
                Ok((name, Err(e))) => {
                    warn!(source = name, error = %e, "source search failed");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "source task panicked");
                    failed += 1;
                }
            }
        }
        (merged, failed)
    }
}

/// Trimmed, non-empty targets with duplicate concept ids removed.
fn unique_targets(names: &[String]) -> Vec<SearchTarget> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| SearchTarget::new(n))
        .filter(|t| !t.concept_id.is_empty() && seen.insert(t.concept_id.clone()))
        .collect()
}
