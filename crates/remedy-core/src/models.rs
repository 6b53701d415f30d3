//! Core data models for the resolution engine.
//!
//! [`Record`]s are the only persisted type. Everything else here is
//! transient and flows between the engine, the router, and the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Monotonically assigned record identifier. The first record gets `1`.
pub type RecordId = u64;

/// Provenance tag for records confirmed by a human.
pub const SOURCE_USER_VERIFIED: &str = "user_verified";
/// Provenance tag for records bulk-loaded at setup time.
pub const SOURCE_SEED: &str = "seed";
/// Provenance tag for generated solutions that were later accepted.
pub const SOURCE_GENERATED: &str = "generated";

/// A verified knowledge-base entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub error_text: String,
    pub solution_text: String,
    /// Author-asserted trust in the solution, in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Provenance tag such as `user_verified`, `generated`, or `seed`.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Input to [`RecordStore::append`](crate::store::RecordStore::append).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub error_text: String,
    pub solution_text: String,
    pub confidence: f64,
    pub source: String,
}

impl NewRecord {
    pub fn new(
        error_text: impl Into<String>,
        solution_text: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            error_text: error_text.into(),
            solution_text: solution_text.into(),
            confidence,
            source: source.into(),
        }
    }

    /// Checks the append preconditions shared by every store backend.
    ///
    /// Rejects empty (or whitespace-only) error and solution text, an empty
    /// source tag, and any confidence outside `[0.0, 1.0]` including NaN.
    pub fn validate(&self) -> Result<()> {
        if self.error_text.trim().is_empty() {
            return Err(Error::invalid("error_text must not be empty"));
        }
        if self.solution_text.trim().is_empty() {
            return Err(Error::invalid("solution_text must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::invalid(format!(
                "confidence must be in [0.0, 1.0], got {}",
                self.confidence
            )));
        }
        if self.source.trim().is_empty() {
            return Err(Error::invalid("source must not be empty"));
        }
        Ok(())
    }

    /// Materializes the record with its assigned id and the current time.
    pub fn into_record(self, id: RecordId) -> Record {
        Record {
            id,
            error_text: self.error_text,
            solution_text: self.solution_text,
            confidence: self.confidence,
            source: self.source,
            created_at: Utc::now(),
        }
    }
}

/// Which path produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    HighConfidenceRetrieval,
    LowConfidenceRetrieval,
    GenerationFallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::HighConfidenceRetrieval => "high_confidence_retrieval",
            Strategy::LowConfidenceRetrieval => "low_confidence_retrieval",
            Strategy::GenerationFallback => "generation_fallback",
        }
    }

    pub fn is_retrieval(&self) -> bool {
        !matches!(self, Strategy::GenerationFallback)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one query against the store. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Lookup key of the record judged relevant, if any qualified.
    pub matched_record_id: Option<RecordId>,
    pub similarity_score: f64,
    pub term_overlap_score: f64,
    pub strategy: Strategy,
}

/// A candidate solution produced by the generation backend or by the
/// static fallback table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSolution {
    pub description: String,
    pub solution_text: String,
    pub confidence: f64,
}

/// A failed CI run as reported by the pipeline inspector. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub workflow_name: String,
    pub run_id: String,
    pub failure_reason: String,
    pub logs: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl PipelineFailure {
    /// The text the router resolves for this failure.
    pub fn error_text(&self) -> String {
        if self.logs.trim().is_empty() {
            self.failure_reason.clone()
        } else {
            format!("{}\n{}", self.failure_reason, self.logs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_bounds() {
        assert!(NewRecord::new("e", "s", 0.0, "seed").validate().is_ok());
        assert!(NewRecord::new("e", "s", 1.0, "seed").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_confidence_out_of_range() {
        for c in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            let err = NewRecord::new("e", "s", c, "seed").validate().unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "confidence {}", c);
        }
    }

    #[test]
    fn test_validate_rejects_blank_text() {
        assert!(NewRecord::new("  ", "s", 0.5, "seed").validate().is_err());
        assert!(NewRecord::new("e", "\n", 0.5, "seed").validate().is_err());
        assert!(NewRecord::new("e", "s", 0.5, "").validate().is_err());
    }

    #[test]
    fn test_strategy_serializes_snake_case() {
        let json = serde_json::to_string(&Strategy::GenerationFallback).unwrap();
        assert_eq!(json, "\"generation_fallback\"");
        assert_eq!(
            Strategy::HighConfidenceRetrieval.to_string(),
            "high_confidence_retrieval"
        );
    }

    #[test]
    fn test_pipeline_failure_error_text() {
        let failure = PipelineFailure {
            workflow_name: "CI".into(),
            run_id: "1".into(),
            failure_reason: "Build failed".into(),
            logs: "npm ERR! code ENOENT".into(),
            created_at: None,
            html_url: None,
        };
        assert_eq!(failure.error_text(), "Build failed\nnpm ERR! code ENOENT");
    }
}
