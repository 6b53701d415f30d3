//! Resolution routing: retrieval first, generation when retrieval is not
//! trustworthy, static fallback when generation fails.
//!
//! ```text
//! query ─▶ KnowledgeBase::evaluate ─┬─ high  ─▶ stored records
//!                                   ├─ low   ─▶ stored records (+ generated, if escalating)
//!                                   └─ none  ─▶ GenerationBackend ──(timeout/error/empty)──▶ fallback table
//! ```
//!
//! Every call to the backend runs under the configured timeout. Backend
//! failures never escape [`Router::resolve`]; they are logged and turned
//! into a degraded response. Only invalid input and storage errors are
//! returned to the caller.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use remedy_core::fallback::fallback_solutions;
use remedy_core::{
    Error, GeneratedSolution, KnowledgeBase, QueryResult, RecordId, Result, RetrievedRecord,
    Strategy,
};

use crate::config::RouterConfig;
use crate::generation::{GenerationBackend, MAX_GENERATED};

/// Length of the error-text prefix used to describe a retrieved record.
const DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub generation_timeout: Duration,
    pub batch_concurrency: usize,
    pub escalate_low_confidence: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RouterOptions {
    fn from(config: &RouterConfig) -> Self {
        Self {
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            batch_concurrency: config.batch_concurrency.max(1),
            escalate_low_confidence: config.escalate_low_confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceCounts {
    pub retrieval: usize,
    pub generation: usize,
}

/// Where a [`Solution`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionSource {
    Rag,
    Claude,
    Fallback,
}

/// Flattened solution as presented to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Record id for retrieved solutions.
    pub id: Option<RecordId>,
    pub description: String,
    pub solution_text: String,
    pub confidence: f64,
    pub source: SolutionSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub strategy: Strategy,
    pub matched_records: Vec<RetrievedRecord>,
    pub generated_solutions: Vec<GeneratedSolution>,
    pub provenance_counts: ProvenanceCounts,
    /// True when `generated_solutions` came from the static fallback table.
    pub degraded: bool,
    pub query_result: QueryResult,
}

impl Resolution {
    /// Retrieved records first, then generated solutions.
    pub fn solutions(&self) -> Vec<Solution> {
        let generated_source = if self.degraded {
            SolutionSource::Fallback
        } else {
            SolutionSource::Claude
        };

        self.matched_records
            .iter()
            .map(|m| Solution {
                id: Some(m.record.id),
                description: describe(&m.record.error_text),
                solution_text: m.record.solution_text.clone(),
                confidence: m.record.confidence,
                source: SolutionSource::Rag,
            })
            .chain(self.generated_solutions.iter().map(|g| Solution {
                id: None,
                description: g.description.clone(),
                solution_text: g.solution_text.clone(),
                confidence: g.confidence,
                source: generated_source,
            }))
            .collect()
    }

    pub fn solution_count(&self) -> usize {
        self.matched_records.len() + self.generated_solutions.len()
    }
}

fn describe(error_text: &str) -> String {
    let first_line = error_text.lines().next().unwrap_or("").trim();
    match first_line.char_indices().nth(DESCRIPTION_CHARS) {
        Some((idx, _)) => format!("{}...", &first_line[..idx]),
        None => first_line.to_string(),
    }
}

/// One input of [`Router::resolve_batch`].
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Resolved { label: String, resolution: Resolution },
    Failed { label: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResolution {
    /// One outcome per input, in input order.
    pub results: Vec<BatchOutcome>,
    pub total: usize,
    pub failed: usize,
}

/// Point-in-time routing counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RouterMetrics {
    pub queries: u64,
    pub high_confidence: u64,
    pub low_confidence: u64,
    pub fallback: u64,
    pub degraded: u64,
}

#[derive(Default)]
struct Counters {
    queries: AtomicU64,
    high_confidence: AtomicU64,
    low_confidence: AtomicU64,
    fallback: AtomicU64,
    degraded: AtomicU64,
}

impl Counters {
    fn record(&self, resolution: &Resolution) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let tier = match resolution.strategy {
            Strategy::HighConfidenceRetrieval => &self.high_confidence,
            Strategy::LowConfidenceRetrieval => &self.low_confidence,
            Strategy::GenerationFallback => &self.fallback,
        };
        tier.fetch_add(1, Ordering::Relaxed);
        if resolution.degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> RouterMetrics {
        RouterMetrics {
            queries: self.queries.load(Ordering::Relaxed),
            high_confidence: self.high_confidence.load(Ordering::Relaxed),
            low_confidence: self.low_confidence.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

pub struct Router {
    kb: Arc<KnowledgeBase>,
    backend: Arc<dyn GenerationBackend>,
    options: RouterOptions,
    counters: Counters,
}

impl Router {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        backend: Arc<dyn GenerationBackend>,
        options: RouterOptions,
    ) -> Self {
        Self {
            kb,
            backend,
            options,
            counters: Counters::default(),
        }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn metrics(&self) -> RouterMetrics {
        self.counters.snapshot()
    }

    /// Resolves one block of error text. Performs no writes.
    pub async fn resolve(&self, query: &str) -> Result<Resolution> {
        if query.trim().is_empty() {
            return Err(Error::invalid("log content must not be empty"));
        }

        let evaluation = self.kb.evaluate(query).await?;
        let query_result = evaluation.query_result();
        let strategy = evaluation.decision.strategy;
        let matched_records = evaluation.records;

        let mut generated_solutions = Vec::new();
        let mut degraded = false;

        let must_generate = matched_records.is_empty();
        let may_generate = strategy == Strategy::LowConfidenceRetrieval
            && self.options.escalate_low_confidence;

        if must_generate || may_generate {
            match self.generate(query).await {
                Ok(solutions) if !solutions.is_empty() => generated_solutions = solutions,
                Ok(_) => warn!(%strategy, "generation backend returned no solutions"),
                Err(e) => warn!(%strategy, error = %e, "generation backend failed"),
            }
            if must_generate && generated_solutions.is_empty() {
                generated_solutions = fallback_solutions(query);
                degraded = true;
            }
        }

        let resolution = Resolution {
            strategy,
            provenance_counts: ProvenanceCounts {
                retrieval: matched_records.len(),
                generation: generated_solutions.len(),
            },
            matched_records,
            generated_solutions,
            degraded,
            query_result,
        };
        debug!(
            %strategy,
            retrieval = resolution.provenance_counts.retrieval,
            generation = resolution.provenance_counts.generation,
            degraded,
            "resolved query"
        );
        self.counters.record(&resolution);
        Ok(resolution)
    }

    /// Resolves every item independently with bounded concurrency.
    ///
    /// Results keep input order. A failing item becomes
    /// [`BatchOutcome::Failed`] and does not affect the others.
    pub async fn resolve_batch(&self, items: Vec<BatchItem>) -> BatchResolution {
        let results: Vec<BatchOutcome> = stream::iter(items)
            .map(|item| async move {
                match self.resolve(&item.text).await {
                    Ok(resolution) => BatchOutcome::Resolved {
                        label: item.label,
                        resolution,
                    },
                    Err(e) => {
                        warn!(label = %item.label, error = %e, "batch item failed");
                        BatchOutcome::Failed {
                            label: item.label,
                            error: e.to_string(),
                        }
                    }
                }
            })
            .buffered(self.options.batch_concurrency)
            .collect()
            .await;

        let failed = results
            .iter()
            .filter(|r| matches!(r, BatchOutcome::Failed { .. }))
            .count();
        BatchResolution {
            total: results.len(),
            failed,
            results,
        }
    }

    async fn generate(&self, text: &str) -> Result<Vec<GeneratedSolution>> {
        let timeout = self.options.generation_timeout;
        match tokio::time::timeout(timeout, self.backend.generate(text)).await {
            Ok(Ok(mut solutions)) => {
                solutions.truncate(MAX_GENERATED);
                Ok(solutions)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::BackendUnavailable(format!(
                "generation timed out after {:?}",
                timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remedy_core::{InMemoryRecordStore, NewRecord, RelevanceGate, SimilarityEngine};

    struct Canned(Vec<GeneratedSolution>);

    #[async_trait]
    impl GenerationBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn generate(&self, _error_text: &str) -> Result<Vec<GeneratedSolution>> {
            Ok(self.0.clone())
        }
        async fn validate(&self) -> bool {
            true
        }
    }

    struct Slow;

    #[async_trait]
    impl GenerationBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _error_text: &str) -> Result<Vec<GeneratedSolution>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
        async fn validate(&self) -> bool {
            true
        }
    }

    struct Failing;

    #[async_trait]
    impl GenerationBackend for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _error_text: &str) -> Result<Vec<GeneratedSolution>> {
            Err(Error::BackendUnavailable("connection refused".to_string()))
        }
        async fn validate(&self) -> bool {
            false
        }
    }

    fn solution(text: &str) -> GeneratedSolution {
        GeneratedSolution {
            description: "generated".to_string(),
            solution_text: text.to_string(),
            confidence: 0.7,
        }
    }

    fn router(backend: Arc<dyn GenerationBackend>, options: RouterOptions) -> Router {
        let kb = KnowledgeBase::new(
            Arc::new(InMemoryRecordStore::new()),
            SimilarityEngine::default(),
            RelevanceGate::default(),
        );
        Router::new(Arc::new(kb), backend, options)
    }

    const DISK_FULL: &str = "write /var/lib/docker: no space left on device";

    /// A router holding one record that can only ever reach the low tier.
    async fn low_tier_router(backend: Arc<dyn GenerationBackend>, escalate: bool) -> Router {
        let kb = KnowledgeBase::new(
            Arc::new(InMemoryRecordStore::new()),
            SimilarityEngine::default(),
            RelevanceGate::default().with_min_record_confidence(0.5),
        );
        kb.ingest(NewRecord::new(DISK_FULL, "docker system prune", 0.3, "seed"))
            .await
            .unwrap();
        let options = RouterOptions {
            escalate_low_confidence: escalate,
            ..RouterOptions::default()
        };
        Router::new(Arc::new(kb), backend, options)
    }

    #[tokio::test]
    async fn test_low_confidence_escalates_to_generation() {
        let r = low_tier_router(Arc::new(Canned(vec![solution("free disk space")])), true).await;
        let res = r.resolve(DISK_FULL).await.unwrap();
        assert_eq!(res.strategy, Strategy::LowConfidenceRetrieval);
        assert!(!res.degraded);
        assert_eq!(res.provenance_counts, ProvenanceCounts { retrieval: 1, generation: 1 });
        let sources: Vec<SolutionSource> = res.solutions().iter().map(|s| s.source).collect();
        assert_eq!(sources, vec![SolutionSource::Rag, SolutionSource::Claude]);
        assert_eq!(r.metrics().low_confidence, 1);
    }

    #[tokio::test]
    async fn test_low_confidence_without_escalation_skips_generation() {
        let r = low_tier_router(Arc::new(Canned(vec![solution("free disk space")])), false).await;
        let res = r.resolve(DISK_FULL).await.unwrap();
        assert_eq!(res.strategy, Strategy::LowConfidenceRetrieval);
        assert_eq!(res.matched_records.len(), 1);
        assert!(res.generated_solutions.is_empty());
        assert!(!res.degraded);
    }

    #[tokio::test]
    async fn test_low_confidence_generation_failure_keeps_retrieval_only() {
        let r = low_tier_router(Arc::new(Failing), true).await;
        let res = r.resolve(DISK_FULL).await.unwrap();
        assert_eq!(res.strategy, Strategy::LowConfidenceRetrieval);
        assert_eq!(res.matched_records.len(), 1);
        assert!(res.generated_solutions.is_empty());
        assert!(!res.degraded);
        assert_eq!(r.metrics().degraded, 0);
    }

    #[tokio::test]
    async fn test_empty_store_uses_generation() {
        let r = router(
            Arc::new(Canned(vec![solution("increase heap")])),
            RouterOptions::default(),
        );
        let res = r.resolve("java.lang.OutOfMemoryError").await.unwrap();
        assert_eq!(res.strategy, Strategy::GenerationFallback);
        assert!(!res.degraded);
        assert_eq!(res.provenance_counts, ProvenanceCounts { retrieval: 0, generation: 1 });
        assert_eq!(res.solutions()[0].source, SolutionSource::Claude);
    }

    #[tokio::test]
    async fn test_empty_generation_degrades_to_fallback() {
        let r = router(Arc::new(Canned(vec![])), RouterOptions::default());
        let res = r.resolve("npm ERR! missing script").await.unwrap();
        assert!(res.degraded);
        assert!(!res.generated_solutions.is_empty());
        assert_eq!(r.metrics().degraded, 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_fallback() {
        let options = RouterOptions {
            generation_timeout: Duration::from_millis(50),
            ..RouterOptions::default()
        };
        let r = router(Arc::new(Slow), options);
        let res = r.resolve("connect ECONNREFUSED 10.0.0.1:5432").await.unwrap();
        assert!(res.degraded);
        assert!(res.generated_solutions[0].description.starts_with("Network"));
    }

    #[tokio::test]
    async fn test_high_confidence_skips_generation() {
        let r = router(Arc::new(Slow), RouterOptions::default());
        let id = r
            .knowledge_base()
            .ingest(NewRecord::new(
                "npm ERR! Test failed with exit code 1",
                "Check your test scripts",
                0.95,
                "user_verified",
            ))
            .await
            .unwrap();

        let res = r.resolve("npm ERR! Test failed with exit code 1").await.unwrap();
        assert_eq!(res.strategy, Strategy::HighConfidenceRetrieval);
        assert_eq!(res.matched_records[0].record.id, id);
        assert!(res.generated_solutions.is_empty());
        assert_eq!(res.solutions()[0].id, Some(id));
        assert_eq!(r.metrics().high_confidence, 1);
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let r = router(Arc::new(Canned(vec![])), RouterOptions::default());
        assert!(matches!(r.resolve("  \n").await, Err(Error::InvalidInput(_))));
        assert_eq!(r.metrics().queries, 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() {
        let r = router(
            Arc::new(Canned(vec![solution("x")])),
            RouterOptions {
                batch_concurrency: 2,
                ..RouterOptions::default()
            },
        );
        let items = vec![
            BatchItem { label: "a".into(), text: "docker build failed".into() },
            BatchItem { label: "b".into(), text: "   ".into() },
            BatchItem { label: "c".into(), text: "pip install error".into() },
        ];
        let batch = r.resolve_batch(items).await;
        assert_eq!(batch.total, 3);
        assert_eq!(batch.failed, 1);
        let labels: Vec<&str> = batch
            .results
            .iter()
            .map(|o| match o {
                BatchOutcome::Resolved { label, .. } | BatchOutcome::Failed { label, .. } => {
                    label.as_str()
                }
            })
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert!(matches!(batch.results[1], BatchOutcome::Failed { .. }));
    }

    #[test]
    fn test_describe_truncates_first_line() {
        let long = "x".repeat(150);
        assert_eq!(describe(&long).len(), DESCRIPTION_CHARS + 3);
        assert_eq!(describe("short\nsecond"), "short");
    }
}
