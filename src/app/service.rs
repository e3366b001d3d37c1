//! Match service: embeds proposition text and ranks it against the current
//! reference snapshot.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::app::errors::AppError;
use crate::config::{EmbeddingConfig, MatchingConfig};
use crate::propositions::{self, AnnotateStats, Claim, ClaimMatches};
use crate::semantic::preprocess::prepare_input;
use crate::semantic::{
    load_reference_db, Embedder, LoadReport, Match, MatchError, ReferenceCollection,
    ReferenceStore,
};

/// Per-request overrides of the configured selection policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchParams {
    pub threshold: Option<f32>,
    pub top_k: Option<usize>,
    pub prefix: Option<String>,
}

pub struct MatchService {
    embedder: Arc<dyn Embedder>,
    references: ReferenceStore,
    matching: MatchingConfig,
    embedding: EmbeddingConfig,
}

impl MatchService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        references: ReferenceCollection,
        matching: MatchingConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            embedder,
            references: ReferenceStore::new(references),
            matching,
            embedding,
        }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn reference_count(&self) -> usize {
        self.references.snapshot().len()
    }

    pub fn reference_dimensions(&self) -> Option<usize> {
        self.references.snapshot().dimensions()
    }

    /// Rank the reference database against one text.
    pub fn match_text(&self, text: &str, params: &MatchParams) -> Result<Vec<Match>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::EmptyText);
        }

        let prefix = params
            .prefix
            .as_deref()
            .unwrap_or(&self.embedding.query_prefix);
        let input = prepare_input(prefix, text, self.embedding.max_input_chars);
        let query = self.embedder.embed(&input)?;

        let threshold = params.threshold.unwrap_or(self.matching.threshold);
        let top_k = params.top_k.unwrap_or(self.matching.top_k);

        Ok(self
            .references
            .snapshot()
            .find_matches(&query, threshold, top_k)?)
    }

    /// Attach `closest_database_matches` to every proposition in `data`.
    pub fn annotate_documents(
        &self,
        data: Value,
        params: &MatchParams,
    ) -> Result<(Vec<Value>, AnnotateStats), AppError> {
        let mut documents = propositions::into_documents(data)?;
        let stats = propositions::annotate_documents(&mut documents, |text| {
            self.match_text(text, params)
        })?;

        log::info!(
            "Annotated {} of {} propositions across {} documents ({} without text)",
            stats.matched,
            stats.propositions,
            stats.documents,
            stats.skipped_no_text
        );

        Ok((documents, stats))
    }

    /// Match every claim with non-empty `sourceText`.
    pub fn match_claims(
        &self,
        claims: &[Claim],
        params: &MatchParams,
    ) -> Result<Vec<ClaimMatches>, AppError> {
        let total = claims.len();
        let mut results = Vec::with_capacity(total);

        for (idx, claim) in claims.iter().enumerate() {
            let text = claim.source_text.trim();
            if text.is_empty() {
                log::debug!("Skipping claim {} without sourceText", idx + 1);
                continue;
            }
            log::debug!("Processing claim {}/{}", idx + 1, total);

            results.push(ClaimMatches {
                claim: text.to_string(),
                matches: self.match_text(text, params)?,
            });
        }

        Ok(results)
    }

    /// Load `path` and publish it as the new reference snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self, path: &Path) -> Result<LoadReport, AppError> {
        let (collection, report) = load_reference_db(path)?;
        self.check_dimensions(&collection)?;
        self.publish(collection);
        Ok(report)
    }

    fn check_dimensions(&self, collection: &ReferenceCollection) -> Result<(), AppError> {
        match collection.dimensions() {
            Some(got) if got != self.embedder.dimensions() => {
                Err(AppError::Match(MatchError::DimensionMismatch {
                    expected: self.embedder.dimensions(),
                    got,
                    index: 0,
                }))
            }
            _ => Ok(()),
        }
    }

    pub fn publish(&self, collection: ReferenceCollection) {
        let previous = self.references.replace(collection);
        log::info!(
            "Published reference snapshot: {} entries (was {})",
            self.reference_count(),
            previous.len()
        );
    }
}
