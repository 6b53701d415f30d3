//! Storage abstraction for verified records.
//!
//! The [`RecordStore`] trait is an append-only log: records are never
//! updated or deleted, and ids are assigned monotonically. Backends are
//! swappable without touching the engine, gate, or router.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewRecord, Record, RecordId};

/// Abstract record store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append`](RecordStore::append) | Validate and append a record, returning its id |
/// | [`get`](RecordStore::get) | Fetch one record, `NotFound` if absent |
/// | [`all`](RecordStore::all) | Every record in insertion order |
/// | [`count`](RecordStore::count) | Number of records |
///
/// `append` does not touch any similarity index. Callers that keep an index
/// go through [`KnowledgeBase::ingest`](crate::knowledge::KnowledgeBase::ingest),
/// which signals invalidation after the append succeeds.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record. Fails with `InvalidInput` when
    /// [`NewRecord::validate`] rejects it.
    async fn append(&self, record: NewRecord) -> Result<RecordId>;

    async fn get(&self, id: RecordId) -> Result<Record>;

    async fn all(&self) -> Result<Vec<Record>>;

    async fn count(&self) -> Result<usize>;
}
