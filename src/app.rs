//! Process wiring: builds the store, knowledge base, collaborators, and
//! router from a [`Config`].
//!
//! Both the HTTP server and the one-shot CLI commands go through
//! [`Services::from_config`], so they always see the same engine.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use remedy_core::{
    InMemoryRecordStore, KnowledgeBase, RecordStore, RelevanceGate, SimilarityEngine, Tokenizer,
};

use crate::config::{Config, StoreBackend};
use crate::generation::{create_backend, GenerationBackend};
use crate::pipeline::{create_inspector, PipelineInspector};
use crate::router::{Router, RouterOptions};
use crate::sqlite_store::SqliteRecordStore;
use crate::{db, migrate};

/// Opens the configured record store. SQLite stores are migrated on open.
pub async fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryRecordStore::new())),
        StoreBackend::Sqlite => {
            let pool = db::connect(config).await?;
            migrate::apply(&pool).await?;
            info!(path = %config.store.path.display(), "opened sqlite record store");
            Ok(Arc::new(SqliteRecordStore::new(pool)))
        }
    }
}

/// Builds the engine over `store` with the configured relevance settings.
pub fn build_knowledge_base(config: &Config, store: Arc<dyn RecordStore>) -> KnowledgeBase {
    let relevance = &config.relevance;
    let tokenizer = Tokenizer::new(relevance.min_term_len, &relevance.extra_stopwords);
    let gate = RelevanceGate::new(relevance.thresholds())
        .with_max_matches(relevance.max_matches)
        .with_min_record_confidence(relevance.min_record_confidence);
    KnowledgeBase::new(store, SimilarityEngine::new(tokenizer), gate)
}

/// Everything a request handler or CLI command needs.
pub struct Services {
    pub config: Arc<Config>,
    pub router: Arc<Router>,
    pub inspector: Arc<dyn PipelineInspector>,
}

impl Services {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(config).await?;
        let backend = create_backend(&config.generation)?;
        let inspector = create_inspector(&config.pipeline)?;
        Ok(Self::new(config.clone(), store, backend, inspector))
    }

    /// Assembles services from explicit parts.
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn GenerationBackend>,
        inspector: Arc<dyn PipelineInspector>,
    ) -> Self {
        let kb = build_knowledge_base(&config, store);
        let router = Router::new(
            Arc::new(kb),
            backend,
            RouterOptions::from(&config.router),
        );
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
            inspector,
        }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        self.router.knowledge_base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::{NewRecord, Strategy};

    #[tokio::test]
    async fn test_default_config_builds_in_memory_services() {
        let services = Services::from_config(&Config::default()).await.unwrap();
        assert_eq!(services.knowledge_base().store().count().await.unwrap(), 0);
        assert!(!services.router.backend().validate().await);
    }

    #[tokio::test]
    async fn test_extra_stopwords_reach_the_engine() {
        let mut config = Config::default();
        config.relevance.extra_stopwords = vec!["gradle".to_string()];
        let kb = build_knowledge_base(&config, Arc::new(InMemoryRecordStore::new()));
        assert!(kb.engine().tokenizer().is_stopword("gradle"));

        kb.ingest(NewRecord::new("gradle daemon crashed", "restart", 0.9, "seed"))
            .await
            .unwrap();
        let eval = kb.evaluate("gradle daemon crashed").await.unwrap();
        assert_eq!(eval.decision.strategy, Strategy::HighConfidenceRetrieval);
    }

    #[tokio::test]
    async fn test_keyless_anthropic_still_resolves_with_fallback() {
        let mut config = Config::default();
        config.generation.provider = "anthropic".to_string();
        let backend = crate::generation::create_backend_with_key(&config.generation, None).unwrap();
        let inspector = create_inspector(&config.pipeline).unwrap();
        let services = Services::new(
            config,
            Arc::new(InMemoryRecordStore::new()),
            backend,
            inspector,
        );

        let res = services
            .router
            .resolve("npm ERR! code ENOENT")
            .await
            .unwrap();
        assert_eq!(res.strategy, Strategy::GenerationFallback);
        assert!(res.degraded);
        assert!(!res.generated_solutions.is_empty());
    }
}
