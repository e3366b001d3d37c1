use crate::propositions::PropositionError;
use crate::semantic::{EmbeddingError, MatchError, ReferenceDbError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("matching failed: {0}")]
    Match(#[from] MatchError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("reference database: {0}")]
    ReferenceDb(#[from] ReferenceDbError),

    #[error("{0}")]
    Proposition(#[from] PropositionError),

    #[error("empty text")]
    EmptyText,

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Errors caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Match(MatchError::InvalidTopK | MatchError::InvalidThreshold(_))
                | AppError::Proposition(_)
                | AppError::EmptyText
        )
    }
}
