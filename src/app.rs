//! Wiring from configuration to a ready [`Router`].

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::{load_prompts, Config};
use crate::embedding::create_embedder;
use crate::ingest::{ingest_csv, IngestReport};
use crate::llm::create_generator;
use crate::router::Router;
use crate::sqlite_store::{SqliteSemanticStore, SqliteStructuredStore};
use crate::{db, migrate};

/// Everything one process needs to answer questions.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub semantic: Arc<SqliteSemanticStore>,
    pub router: Arc<Router>,
}

impl AppContext {
    /// Connect to the configured database, create missing tables, and build
    /// the router. Prompt templates are read once here.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool)
            .await
            .context("Failed to prepare database")?;

        let templates = load_prompts(&config.prompts)?;
        let generator = create_generator(&config.llm)?;
        let embedder = create_embedder(&config.embedding)?;

        let structured = Arc::new(SqliteStructuredStore::new(pool.clone()));
        let semantic = Arc::new(SqliteSemanticStore::new(pool.clone(), embedder));
        let table = config.dataset.table_name();

        info!(
            table = %table,
            llm = %config.llm.provider,
            embedding = %config.embedding.provider,
            "router ready"
        );

        let router = Router::new(
            generator,
            structured,
            semantic.clone(),
            &templates,
            table,
            config.retrieval.top_k,
        );

        Ok(Self {
            config: config.clone(),
            pool,
            semantic,
            router: Arc::new(router),
        })
    }

    /// Ingest the configured dataset through this context's pool.
    pub async fn ingest(&self, full: bool) -> Result<IngestReport> {
        ingest_csv(&self.config, &self.pool, &self.semantic, full).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
