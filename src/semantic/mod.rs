//! Semantic matching of propositions against a reference database.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed behind the `Embedder` trait
//! - `matcher`: Threshold-then-top-k cosine matcher
//! - `reference_db`: CSV load/write of the reference database
//! - `store`: Atomically swappable reference snapshot
//! - `preprocess`: Text preparation for embedding input

pub mod embeddings;
pub mod matcher;
pub mod preprocess;
pub mod reference_db;
pub mod store;

pub use embeddings::{Embedder, Embedding, EmbeddingError, EmbeddingModel};
pub use matcher::{find_matches, Match, MatchError, ReferenceCollection, ReferenceEntry};
pub use reference_db::{
    build_reference_db, load_reference_db, read_reference_db, LoadReport, ReferenceDbError,
};
pub use store::ReferenceStore;

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "nomic-embed-text-v1.5";

/// Default similarity threshold
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Default number of matches per proposition
pub const DEFAULT_TOP_K: usize = 3;

/// Default prefix for proposition text sent to the embedder
pub const DEFAULT_PREFIX: &str = "search_document:";
