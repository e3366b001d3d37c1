use crate::{
    app::service::MatchService,
    config::{self, Config},
    semantic::{load_reference_db, Embedder, EmbeddingModel},
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Load `config.yaml` from the base directory, creating both if missing
    pub fn load_config() -> Result<Config> {
        let base_path = config::base_path()?;
        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Config::load_with(&base_path)
            .with_context(|| format!("Failed to load config from {}", base_path.display()))
    }

    /// Create the embedding model named in the config.
    ///
    /// Models are cached under the base directory.
    pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
        let model = EmbeddingModel::new(
            &config.embedding.model,
            config.base_path().to_path_buf(),
            Some(Duration::from_secs(config.embedding.download_timeout_secs)),
        )
        .with_context(|| format!("Failed to load model '{}'", config.embedding.model))?;

        log::info!(
            "Embedding model '{}' ready ({} dimensions)",
            model.name(),
            model.dimensions()
        );

        Ok(Arc::new(model))
    }

    /// Create a match service over the reference database.
    ///
    /// `database` overrides the configured database path.
    pub fn create_match_service(config: &Config, database: Option<&Path>) -> Result<MatchService> {
        let embedder = Self::create_embedder(config)?;
        Self::create_match_service_with(config, embedder, database)
    }

    /// Same as [`AppFactory::create_match_service`] with a caller supplied embedder
    pub fn create_match_service_with(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        database: Option<&Path>,
    ) -> Result<MatchService> {
        let path = database
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.database_path());

        let (collection, report) = load_reference_db(&path)
            .with_context(|| format!("Failed to load reference database {}", path.display()))?;

        if report.rows_skipped > 0 {
            log::warn!(
                "{} rows of {} were skipped",
                report.rows_skipped,
                path.display()
            );
        }

        if let Some(dimensions) = collection.dimensions() {
            if dimensions != embedder.dimensions() {
                anyhow::bail!(
                    "Reference database has {}-dimensional embeddings but model '{}' produces {}",
                    dimensions,
                    embedder.name(),
                    embedder.dimensions()
                );
            }
        }

        Ok(MatchService::new(
            embedder,
            collection,
            config.matching.clone(),
            config.embedding.clone(),
        ))
    }
}
