//! Similarity engine: TF-IDF cosine plus term-overlap corroboration.
//!
//! Every stored record is scored against the query on two independent
//! signals:
//!
//! 1. **similarity**: cosine between sublinear TF-IDF vectors
//!    (`tf = 1 + ln(count)`, `idf = ln((1 + n) / (1 + df)) + 1`). All
//!    weights are non-negative, so the cosine lies in `[0, 1]`.
//! 2. **term overlap**: `|Q ∩ R| / |Q|` where `Q` is the query's match set
//!    (see [`Tokenizer::match_terms`]) and `R` every token of the record's
//!    error text.
//!
//! A query whose normalized text equals a record's error text scores `1.0`
//! on both signals, so an identical error always retrieves its record even
//! when it is too short or too generic to carry weighted terms.
//!
//! The vector score alone is gameable by shared boilerplate (`npm ERR!`), so
//! the relevance gate needs both.
//!
//! # Index lifecycle
//!
//! The [`TermIndex`] is an immutable snapshot derived from the record store.
//! The [`SimilarityEngine`] holds the current snapshot behind an
//! `RwLock<Arc<_>>` and a generation counter. Ingestion bumps the counter
//! (O(1)); the next reader notices the snapshot is behind and rebuilds it in
//! `O(n·L)`. Readers clone the `Arc`, so they always score against one
//! complete snapshot, never a partially built one.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Record, RecordId};
use crate::text::Tokenizer;

/// Both relevance signals for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityScore {
    pub record_id: RecordId,
    /// Cosine similarity in `[0.0, 1.0]`.
    pub similarity: f64,
    /// Fraction of significant query terms found in the record, `[0.0, 1.0]`.
    pub term_overlap: f64,
    /// Stored confidence of the record, carried for the relevance gate.
    pub confidence: f64,
}

#[derive(Debug)]
struct IndexedRecord {
    id: RecordId,
    confidence: f64,
    /// Unit-length TF-IDF vector.
    weights: HashMap<String, f64>,
    vocabulary: HashSet<String>,
    normalized: String,
}

/// Immutable, rebuildable index over the record store.
#[derive(Debug)]
pub struct TermIndex {
    generation: u64,
    corpus_size: usize,
    records: Vec<IndexedRecord>,
    doc_freq: HashMap<String, usize>,
}

impl TermIndex {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            corpus_size: 0,
            records: Vec::new(),
            doc_freq: HashMap::new(),
        }
    }

    /// Builds an index over `records`, tagging it with `generation`.
    pub fn build(tokenizer: &Tokenizer, records: &[Record], generation: u64) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut staged = Vec::with_capacity(records.len());

        for record in records {
            let tf = term_frequencies(tokenizer.terms(&record.error_text));
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            staged.push((record, tf));
        }

        let mut index = Self {
            generation,
            corpus_size: staged.len(),
            records: Vec::with_capacity(staged.len()),
            doc_freq,
        };

        for (record, tf) in staged {
            let weights = index.weigh(tf);
            index.records.push(IndexedRecord {
                id: record.id,
                confidence: record.confidence,
                weights,
                vocabulary: tokenizer.vocabulary(&record.error_text),
                normalized: tokenizer.normalized(&record.error_text),
            });
        }

        index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Scores `query` against every indexed record, in insertion order.
    ///
    /// Returns an empty vector for an empty index. A query sharing no
    /// vocabulary with a record scores `0.0` on both signals.
    pub fn score_all(&self, tokenizer: &Tokenizer, query: &str) -> Vec<SimilarityScore> {
        if self.records.is_empty() {
            return Vec::new();
        }

        let query_vec = self.weigh(term_frequencies(tokenizer.terms(query)));
        let query_terms = tokenizer.match_terms(query);
        let query_norm = tokenizer.normalized(query);

        self.records
            .iter()
            .map(|rec| {
                let exact = !query_norm.is_empty() && rec.normalized == query_norm;
                let (similarity, term_overlap) = if exact {
                    (1.0, 1.0)
                } else {
                    (
                        cosine(&query_vec, &rec.weights),
                        overlap_ratio(&query_terms, &rec.vocabulary),
                    )
                };
                SimilarityScore {
                    record_id: rec.id,
                    similarity,
                    term_overlap,
                    confidence: rec.confidence,
                }
            })
            .collect()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.corpus_size as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }

    fn weigh(&self, tf: HashMap<String, f64>) -> HashMap<String, f64> {
        let mut weights: HashMap<String, f64> = tf
            .into_iter()
            .map(|(term, f)| {
                let w = f * self.idf(&term);
                (term, w)
            })
            .collect();
        let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for w in weights.values_mut() {
                *w /= norm;
            }
        }
        weights
    }
}

fn term_frequencies(terms: Vec<String>) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for term in terms {
        *counts.entry(term).or_insert(0.0) += 1.0;
    }
    for c in counts.values_mut() {
        *c = 1.0 + c.ln();
    }
    counts
}

/// Cosine of two unit-length sparse vectors, clamped to `[0, 1]`.
fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum();
    dot.clamp(0.0, 1.0)
}

fn overlap_ratio(query: &HashSet<String>, record: &HashSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.iter().filter(|t| record.contains(*t)).count();
    shared as f64 / query.len() as f64
}

/// Holds the current [`TermIndex`] snapshot and its invalidation state.
pub struct SimilarityEngine {
    tokenizer: Tokenizer,
    generation: AtomicU64,
    index: RwLock<Arc<TermIndex>>,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(Tokenizer::default())
    }
}

impl SimilarityEngine {
    /// Starts at generation 0 with an empty index, matching an empty store.
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            generation: AtomicU64::new(0),
            index: RwLock::new(Arc::new(TermIndex::empty(0))),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Marks the current snapshot stale. Returns the new generation.
    pub fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The installed snapshot, which may be stale.
    pub fn snapshot(&self) -> Result<Arc<TermIndex>> {
        self.index
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| Error::Storage("similarity index lock poisoned".to_string()))
    }

    /// True when `index` reflects every invalidation signalled so far.
    pub fn is_current(&self, index: &TermIndex) -> bool {
        index.generation() >= self.generation()
    }

    /// Builds a snapshot from `records` and installs it unless a newer one
    /// was installed concurrently. Returns the snapshot that was built.
    ///
    /// `generation` must be read *before* `records` were fetched, so that an
    /// append racing with the rebuild leaves the result stale rather than
    /// silently lost.
    pub fn rebuild(&self, records: &[Record], generation: u64) -> Result<Arc<TermIndex>> {
        let built = Arc::new(TermIndex::build(&self.tokenizer, records, generation));
        let mut slot = self
            .index
            .write()
            .map_err(|_| Error::Storage("similarity index lock poisoned".to_string()))?;
        if built.generation() >= slot.generation() {
            *slot = Arc::clone(&built);
        }
        Ok(built)
    }

    /// Scores `query` against a snapshot.
    pub fn score(&self, index: &TermIndex, query: &str) -> Vec<SimilarityScore> {
        index.score_all(&self.tokenizer, query)
    }
}
