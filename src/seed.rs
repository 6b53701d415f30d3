//! Bulk import of seed records from a JSON file.
//!
//! The file is an array of objects:
//!
//! ```json
//! [
//!   { "error_text": "npm ERR! code ENOENT", "solution_text": "Run npm install", "confidence": 0.9 }
//! ]
//! ```
//!
//! `confidence` defaults to 0.9 and `source` to `seed`. The whole file is
//! validated before anything is written.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use remedy_core::models::SOURCE_SEED;
use remedy_core::{KnowledgeBase, NewRecord, RecordId};

#[derive(Debug, Deserialize)]
struct SeedEntry {
    error_text: String,
    solution_text: String,
    #[serde(default = "default_seed_confidence")]
    confidence: f64,
    #[serde(default)]
    source: Option<String>,
}

fn default_seed_confidence() -> f64 {
    0.9
}

/// Parses and validates seed JSON.
pub fn parse_seed(json: &str) -> Result<Vec<NewRecord>> {
    let entries: Vec<SeedEntry> =
        serde_json::from_str(json).with_context(|| "Failed to parse seed file")?;

    let mut records = Vec::with_capacity(entries.len());
    for (i, e) in entries.into_iter().enumerate() {
        let record = NewRecord::new(
            e.error_text,
            e.solution_text,
            e.confidence,
            e.source.unwrap_or_else(|| SOURCE_SEED.to_string()),
        );
        if let Err(err) = record.validate() {
            bail!("seed entry {}: {}", i, err);
        }
        records.push(record);
    }
    Ok(records)
}

/// Imports every record in `path` into `kb`, returning the assigned ids.
pub async fn import_file(kb: &KnowledgeBase, path: &Path) -> Result<Vec<RecordId>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let records = parse_seed(&content)?;

    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        ids.push(kb.ingest(record).await?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::{InMemoryRecordStore, RelevanceGate, SimilarityEngine};
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let records =
            parse_seed(r#"[{"error_text": "e", "solution_text": "s"}]"#).unwrap();
        assert_eq!(records[0].confidence, 0.9);
        assert_eq!(records[0].source, "seed");
    }

    #[test]
    fn test_invalid_entry_reports_index() {
        let err = parse_seed(
            r#"[{"error_text": "e", "solution_text": "s"},
                {"error_text": "e", "solution_text": "s", "confidence": 2.0}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("seed entry 1"), "{}", err);
    }

    #[tokio::test]
    async fn test_import_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("seed.json");
        std::fs::write(
            &path,
            r#"[{"error_text": "a failed", "solution_text": "fix a"},
                {"error_text": "b failed", "solution_text": "fix b", "source": "user_verified"}]"#,
        )
        .unwrap();

        let kb = KnowledgeBase::new(
            Arc::new(InMemoryRecordStore::new()),
            SimilarityEngine::default(),
            RelevanceGate::default(),
        );
        let ids = import_file(&kb, &path).await.unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(kb.get(2).await.unwrap().source, "user_verified");
    }
}
