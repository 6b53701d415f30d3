//! In-memory [`RecordStore`] implementation.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Ids are dense: record `n` lives
//! at index `n - 1`. Contents are lost at process exit.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordId};

use super::RecordStore;

/// Process-local append-only record log. Starts empty.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("record store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: NewRecord) -> Result<RecordId> {
        record.validate()?;
        let mut records = self.records.write().map_err(poisoned)?;
        let id = records.len() as RecordId + 1;
        records.push(record.into_record(id));
        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Record> {
        let records = self.records.read().map_err(poisoned)?;
        id.checked_sub(1)
            .and_then(|idx| records.get(idx as usize))
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn all(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().map_err(poisoned)?.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_assigns_monotonic_ids() {
        let store = InMemoryRecordStore::new();
        let a = store
            .append(NewRecord::new("err a", "fix a", 0.9, "seed"))
            .await
            .unwrap();
        let b = store
            .append(NewRecord::new("err b", "fix b", 0.9, "seed"))
            .await
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.get(0).await.unwrap_err(), Error::NotFound(0));
        assert_eq!(store.get(7).await.unwrap_err(), Error::NotFound(7));
    }

    #[tokio::test]
    async fn test_invalid_append_leaves_store_untouched() {
        let store = InMemoryRecordStore::new();
        let err = store
            .append(NewRecord::new("err", "fix", 1.5, "seed"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_pairs_create_distinct_records() {
        let store = InMemoryRecordStore::new();
        let rec = NewRecord::new("same error", "same fix", 0.8, "user_verified");
        let a = store.append(rec.clone()).await.unwrap();
        let b = store.append(rec).await.unwrap();
        assert_ne!(a, b);
        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].error_text, all[1].error_text);
    }
}
