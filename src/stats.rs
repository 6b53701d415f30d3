//! Knowledge-base statistics.
//!
//! Summarizes what the engine has learned: record counts per provenance,
//! mean stored confidence, index freshness, and routing counters. Backs
//! `/rag-stats`, `/dashboard-data`, and `remedy stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use remedy_core::IndexStatus;

use crate::app::Services;
use crate::config::Config;
use crate::router::RouterMetrics;

#[derive(Debug, Clone, Serialize)]
pub struct RagStats {
    pub total_entries: usize,
    /// Mean stored confidence; 0 for an empty store.
    pub accuracy: f64,
    /// Identifies the index build the numbers refer to.
    pub model_version: String,
    pub by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_solutions: usize,
    pub by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingStatus {
    pub index_generation: u64,
    pub indexed_records: usize,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub overview: Overview,
    pub training_status: TrainingStatus,
    pub performance_metrics: RouterMetrics,
}

pub fn model_version(status: &IndexStatus) -> String {
    format!("tfidf-g{}", status.generation)
}

pub async fn rag_stats(services: &Services) -> remedy_core::Result<RagStats> {
    let kb = services.knowledge_base();
    let records = kb.store().all().await?;
    let status = kb.index_status().await?;

    let mut by_source = BTreeMap::new();
    let mut confidence_sum = 0.0;
    for r in &records {
        *by_source.entry(r.source.clone()).or_insert(0) += 1;
        confidence_sum += r.confidence;
    }
    let accuracy = if records.is_empty() {
        0.0
    } else {
        confidence_sum / records.len() as f64
    };

    Ok(RagStats {
        total_entries: records.len(),
        accuracy,
        model_version: model_version(&status),
        by_source,
    })
}

pub async fn dashboard(services: &Services) -> remedy_core::Result<DashboardData> {
    let stats = rag_stats(services).await?;
    let status = services.knowledge_base().index_status().await?;

    Ok(DashboardData {
        overview: Overview {
            total_solutions: stats.total_entries,
            by_source: stats.by_source,
        },
        training_status: TrainingStatus {
            index_generation: status.generation,
            indexed_records: status.indexed_records,
            stale: status.stale,
        },
        performance_metrics: services.router.metrics(),
    })
}

/// Run the stats command: open the configured store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let services = Services::from_config(config).await?;
    let stats = rag_stats(&services).await?;

    println!("Remedy Knowledge Base Stats");
    println!("===========================");
    println!();
    match config.store.backend {
        crate::config::StoreBackend::Sqlite => {
            let size = std::fs::metadata(&config.store.path)
                .map(|m| m.len())
                .unwrap_or(0);
            println!("  Store:       {} ({})", config.store.path.display(), format_bytes(size));
        }
        crate::config::StoreBackend::Memory => println!("  Store:       in-memory"),
    }
    println!("  Records:     {}", stats.total_entries);
    println!("  Confidence:  {:.2} (mean)", stats.accuracy);
    println!("  Index:       {}", stats.model_version);

    if !stats.by_source.is_empty() {
        println!();
        println!("  {:<20} {:>8}", "SOURCE", "RECORDS");
        for (source, count) in &stats.by_source {
            println!("  {:<20} {:>8}", source, count);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
