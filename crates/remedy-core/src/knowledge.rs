//! Knowledge base: the record store, its similarity index, and the gate.
//!
//! This is the single logical owner of the store and the derived index.
//! Feedback ingestion appends to the store and then bumps the engine's
//! generation; scoring rebuilds the index lazily when it is behind.
//!
//! Concurrent readers share one immutable index snapshot at a time. An
//! ingest that lands while a rebuild is running leaves that rebuild stale,
//! so the next reader rebuilds again; nothing is lost and no reader ever
//! sees a half-built index.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{NewRecord, QueryResult, Record, RecordId};
use crate::relevance::{Candidate, Decision, RelevanceGate};
use crate::similarity::{SimilarityEngine, SimilarityScore, TermIndex};
use crate::store::RecordStore;

/// A stored record together with the scores that selected it.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedRecord {
    pub record: Record,
    pub similarity: f64,
    pub term_overlap: f64,
}

/// Result of [`KnowledgeBase::evaluate`].
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    /// Records of the winning tier, in decision order.
    pub records: Vec<RetrievedRecord>,
}

impl Evaluation {
    pub fn query_result(&self) -> QueryResult {
        self.decision.query_result()
    }
}

/// Index freshness, for statistics endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexStatus {
    pub generation: u64,
    pub indexed_records: usize,
    pub stored_records: usize,
    pub stale: bool,
}

pub struct KnowledgeBase {
    store: Arc<dyn RecordStore>,
    engine: SimilarityEngine,
    gate: RelevanceGate,
}

impl KnowledgeBase {
    pub fn new(store: Arc<dyn RecordStore>, engine: SimilarityEngine, gate: RelevanceGate) -> Self {
        Self {
            store,
            engine,
            gate,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    pub fn gate(&self) -> &RelevanceGate {
        &self.gate
    }

    /// Feedback ingestion: append a confirmed (error, solution) pair.
    ///
    /// Not idempotent. Ingesting the same pair twice creates two records.
    /// The index is only invalidated here; the rebuild happens on the next
    /// read.
    pub async fn ingest(&self, record: NewRecord) -> Result<RecordId> {
        let source = record.source.clone();
        let id = self.store.append(record).await?;
        let generation = self.engine.invalidate();
        info!(record_id = id, %source, generation, "ingested record");
        Ok(id)
    }

    pub async fn get(&self, id: RecordId) -> Result<Record> {
        self.store.get(id).await
    }

    /// Scores `query` against every stored record, keyed by record id.
    pub async fn score_all(&self, query: &str) -> Result<BTreeMap<RecordId, SimilarityScore>> {
        let index = self.current_index().await?;
        Ok(self
            .engine
            .score(&index, query)
            .into_iter()
            .map(|s| (s.record_id, s))
            .collect())
    }

    /// Scores `query`, applies the relevance gate, and loads the matched
    /// records. Performs no writes.
    pub async fn evaluate(&self, query: &str) -> Result<Evaluation> {
        let index = self.current_index().await?;
        let candidates: Vec<Candidate> = self
            .engine
            .score(&index, query)
            .into_iter()
            .map(Candidate::from)
            .collect();
        let decision = self.gate.decide(&candidates);

        debug!(
            candidates = candidates.len(),
            strategy = %decision.strategy,
            best_similarity = decision.best.map(|c| c.similarity).unwrap_or(0.0),
            best_overlap = decision.best.map(|c| c.term_overlap).unwrap_or(0.0),
            "relevance decision"
        );

        let mut records = Vec::with_capacity(decision.matches.len());
        for m in &decision.matches {
            match self.store.get(m.record_id).await {
                Ok(record) => records.push(RetrievedRecord {
                    record,
                    similarity: m.similarity,
                    term_overlap: m.term_overlap,
                }),
                Err(Error::NotFound(id)) => {
                    warn!(record_id = id, "indexed record missing from store");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Evaluation { decision, records })
    }

    pub async fn index_status(&self) -> Result<IndexStatus> {
        let snapshot = self.engine.snapshot()?;
        let stored = self.store.count().await?;
        Ok(IndexStatus {
            generation: self.engine.generation(),
            indexed_records: snapshot.len(),
            stored_records: stored,
            stale: !self.engine.is_current(&snapshot) || snapshot.len() != stored,
        })
    }

    /// Returns a snapshot reflecting every completed ingest, rebuilding if
    /// the installed one is behind. The record count check also catches
    /// appends made directly on the store (e.g. by another process sharing
    /// a SQLite file).
    async fn current_index(&self) -> Result<Arc<TermIndex>> {
        let snapshot = self.engine.snapshot()?;
        if self.engine.is_current(&snapshot) && snapshot.len() == self.store.count().await? {
            return Ok(snapshot);
        }

        let generation = self.engine.generation();
        let records = self.store.all().await?;
        debug!(generation, records = records.len(), "rebuilding similarity index");
        self.engine.rebuild(&records, generation)
    }
}
