//! # Remedy
//!
//! Retrieval-first error resolution for CI and application logs.
//!
//! Remedy keeps a log of verified (error → solution) pairs and, for each
//! new block of error text, decides whether a stored solution is relevant
//! enough to return directly or whether the text should go to a generative
//! backend. Confirmed answers are fed back into the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────────────────────┐   ┌──────────────┐
//! │ HTTP / CLI    │──▶│ Router                        │──▶│ Generation   │
//! │ (axum, clap)  │   │  KnowledgeBase (remedy-core)  │   │ (Anthropic)  │
//! └──────┬────────┘   │   store + TF-IDF index + gate │   └──────────────┘
//!        │            └──────────────┬───────────────┘
//!        ▼                           ▼
//! ┌───────────────┐          ┌──────────────┐
//! │ Pipeline      │          │ Record store │
//! │ (GitHub API)  │          │ memory/SQLite│
//! └───────────────┘          └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Wiring services from configuration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `RecordStore` |
//! | [`generation`] | Generation backend abstraction |
//! | [`pipeline`] | Repository URL parsing and CI failure listing |
//! | [`extract`] | Error-excerpt extraction for uploads |
//! | [`router`] | Retrieval/generation routing and batch resolution |
//! | [`stats`] | Knowledge-base statistics |
//! | [`server`] | HTTP server |
//! | [`seed`] | Bulk import of seed records |

pub mod app;
pub mod config;
pub mod db;
pub mod extract;
pub mod generation;
pub mod migrate;
pub mod pipeline;
pub mod router;
pub mod seed;
pub mod server;
pub mod sqlite_store;
pub mod stats;
