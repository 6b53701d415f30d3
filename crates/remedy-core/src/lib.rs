//! # Remedy Core
//!
//! Runtime-free logic for Remedy: data models, the record store
//! abstraction, the similarity engine, the relevance gate, and the
//! last-resort fallback rule table.
//!
//! This crate contains no tokio, sqlx, reqwest, or filesystem I/O. The
//! application crate supplies the collaborators (generation backend,
//! pipeline inspector, durable store) and the transport.
//!
//! ## Data Flow
//!
//! ```text
//!  query ──▶ KnowledgeBase::evaluate
//!              │
//!              ├─▶ SimilarityEngine (lazy TermIndex snapshot)
//!              │     └─ per record: cosine + term overlap
//!              └─▶ RelevanceGate ──▶ Decision { strategy, matches }
//!
//!  feedback ──▶ KnowledgeBase::ingest ──▶ RecordStore::append
//!                                     └─▶ SimilarityEngine::invalidate
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Error taxonomy shared by every component |
//! | [`models`] | `Record`, `NewRecord`, `QueryResult`, `Strategy`, `PipelineFailure` |
//! | [`store`] | `RecordStore` trait and the in-memory implementation |
//! | [`text`] | Tokenizer and stopword handling |
//! | [`similarity`] | TF-IDF cosine and term-overlap scoring over a rebuildable index |
//! | [`relevance`] | Threshold policy deciding retrieval vs. generation |
//! | [`knowledge`] | Store + index + gate, including feedback ingestion |
//! | [`fallback`] | Static keyword-triggered solutions used when generation fails |

pub mod error;
pub mod fallback;
pub mod knowledge;
pub mod models;
pub mod relevance;
pub mod similarity;
pub mod store;
pub mod text;

pub use error::{Error, Result};
pub use knowledge::{Evaluation, IndexStatus, KnowledgeBase, RetrievedRecord};
pub use models::{
    GeneratedSolution, NewRecord, PipelineFailure, QueryResult, Record, RecordId, Strategy,
};
pub use relevance::{Candidate, Decision, RelevanceGate, Thresholds};
pub use similarity::{SimilarityEngine, SimilarityScore, TermIndex};
pub use store::{memory::InMemoryRecordStore, RecordStore};
pub use text::Tokenizer;
