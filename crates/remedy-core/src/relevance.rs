//! Relevance gate: decides whether a retrieved record is trustworthy.
//!
//! # Policy
//!
//! For each candidate `(similarity, overlap, stored confidence)`:
//!
//! 1. `similarity >= high_sim && overlap >= high_overlap` → high-confidence
//!    retrieval.
//! 2. `similarity >= low_sim && overlap >= low_overlap` → low-confidence
//!    retrieval.
//! 3. Otherwise the candidate does not qualify.
//!
//! The best tier reached by any candidate wins. Within a tier, candidates
//! are ranked by similarity (desc), then id (asc) so the earliest-ingested
//! record wins exact ties. If no candidate qualifies, the decision is
//! generation fallback.
//!
//! Defaults are deliberately high: a wrong retrieved solution costs more
//! than an extra generation call.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{QueryResult, RecordId, Strategy};
use crate::similarity::SimilarityScore;

/// Tunable thresholds, all in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high_sim_threshold: f64,
    pub high_overlap_threshold: f64,
    pub low_sim_threshold: f64,
    pub low_overlap_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_sim_threshold: 0.80,
            high_overlap_threshold: 0.60,
            low_sim_threshold: 0.55,
            low_overlap_threshold: 0.40,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("high_sim_threshold", self.high_sim_threshold),
            ("high_overlap_threshold", self.high_overlap_threshold),
            ("low_sim_threshold", self.low_sim_threshold),
            ("low_overlap_threshold", self.low_overlap_threshold),
        ];
        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid(format!(
                    "{} must be in [0.0, 1.0], got {}",
                    name, value
                )));
            }
        }
        if self.low_sim_threshold > self.high_sim_threshold {
            return Err(Error::invalid(
                "low_sim_threshold must not exceed high_sim_threshold",
            ));
        }
        if self.low_overlap_threshold > self.high_overlap_threshold {
            return Err(Error::invalid(
                "low_overlap_threshold must not exceed high_overlap_threshold",
            ));
        }
        Ok(())
    }
}

/// Input to the gate for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub record_id: RecordId,
    pub similarity: f64,
    pub term_overlap: f64,
    pub confidence: f64,
}

impl From<SimilarityScore> for Candidate {
    fn from(s: SimilarityScore) -> Self {
        Self {
            record_id: s.record_id,
            similarity: s.similarity,
            term_overlap: s.term_overlap,
            confidence: s.confidence,
        }
    }
}

/// Outcome of [`RelevanceGate::decide`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub strategy: Strategy,
    /// Qualifying candidates of the winning tier, best first. Empty for
    /// generation fallback.
    pub matches: Vec<Candidate>,
    /// Highest-ranked candidate overall, qualifying or not.
    pub best: Option<Candidate>,
}

impl Decision {
    pub fn query_result(&self) -> QueryResult {
        let scored = self.matches.first().or(self.best.as_ref());
        QueryResult {
            matched_record_id: self.matches.first().map(|c| c.record_id),
            similarity_score: scored.map(|c| c.similarity).unwrap_or(0.0),
            term_overlap_score: scored.map(|c| c.term_overlap).unwrap_or(0.0),
            strategy: self.strategy,
        }
    }
}

/// Default cap on records returned per decision.
pub const DEFAULT_MAX_MATCHES: usize = 3;

#[derive(Debug, Clone)]
pub struct RelevanceGate {
    thresholds: Thresholds,
    max_matches: usize,
    min_record_confidence: f64,
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl RelevanceGate {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            max_matches: DEFAULT_MAX_MATCHES,
            min_record_confidence: 0.0,
        }
    }

    /// Caps the number of records returned per decision (at least 1).
    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches.max(1);
        self
    }

    /// Records whose stored confidence is below `min` can only ever be a
    /// low-confidence match.
    pub fn with_min_record_confidence(mut self, min: f64) -> Self {
        self.min_record_confidence = min;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Tier a single candidate reaches on its own.
    pub fn classify(&self, c: &Candidate) -> Strategy {
        let t = &self.thresholds;
        if c.similarity >= t.high_sim_threshold
            && c.term_overlap >= t.high_overlap_threshold
            && c.confidence >= self.min_record_confidence
        {
            Strategy::HighConfidenceRetrieval
        } else if c.similarity >= t.low_sim_threshold && c.term_overlap >= t.low_overlap_threshold
        {
            Strategy::LowConfidenceRetrieval
        } else {
            Strategy::GenerationFallback
        }
    }

    pub fn decide(&self, candidates: &[Candidate]) -> Decision {
        let mut ranked: Vec<Candidate> = candidates.to_vec();
        ranked.sort_by(rank);

        let mut high = Vec::new();
        let mut low = Vec::new();
        for c in &ranked {
            match self.classify(c) {
                Strategy::HighConfidenceRetrieval => high.push(*c),
                Strategy::LowConfidenceRetrieval => low.push(*c),
                Strategy::GenerationFallback => {}
            }
        }

        let (strategy, mut matches) = if !high.is_empty() {
            (Strategy::HighConfidenceRetrieval, high)
        } else if !low.is_empty() {
            (Strategy::LowConfidenceRetrieval, low)
        } else {
            (Strategy::GenerationFallback, Vec::new())
        };
        matches.truncate(self.max_matches);

        Decision {
            strategy,
            matches,
            best: ranked.first().copied(),
        }
    }
}

/// Similarity descending, then id ascending.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then(a.record_id.cmp(&b.record_id))
}
