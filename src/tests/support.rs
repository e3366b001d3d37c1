//! Shared fixtures: a deterministic embedder and reference databases built
//! with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::MatchService;
use crate::config::{EmbeddingConfig, MatchingConfig};
use crate::semantic::{
    build_reference_db, load_reference_db, Embedder, Embedding, EmbeddingError,
};

pub const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: every lowercase word bumps one hashed bucket.
///
/// Identical texts get identical vectors and texts sharing words score
/// higher than unrelated ones, which is all the matching tests rely on.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn shared() -> Arc<dyn Embedder> {
        Arc::new(Self::new(DIMENSIONS))
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash-bow"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut values = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            values[bucket] += 1.0;
        }
        Embedding::normalized(values)
    }
}

pub const SOURCE_CSV: &str = "\
id,text,file_name
p1,Cross laminated timber panels store carbon for decades,clt.pdf
p2,Kiln drying lowers the moisture content of sawn boards,drying.pdf
p3,Larch heartwood resists fungal decay outdoors,durability.pdf
p4,Glulam beams span long distances in halls,
";

/// Write `SOURCE_CSV` and embed it into `dir/reference.csv`.
pub fn build_fixture_db(dir: &Path, embedder: &dyn Embedder) -> PathBuf {
    let source = dir.join("source.csv");
    let output = dir.join("reference.csv");
    std::fs::write(&source, SOURCE_CSV).unwrap();

    let written = build_reference_db(&source, &output, embedder, "", 2048, 2).unwrap();
    assert_eq!(written, 4);

    output
}

/// A match service over the fixture database, with no prefixes.
pub fn fixture_service(dir: &Path) -> (MatchService, PathBuf) {
    let embedder = HashEmbedder::shared();
    let db_path = build_fixture_db(dir, embedder.as_ref());
    let (collection, _) = load_reference_db(&db_path).unwrap();

    let embedding = EmbeddingConfig {
        query_prefix: String::new(),
        document_prefix: String::new(),
        ..Default::default()
    };
    let service = MatchService::new(embedder, collection, MatchingConfig::default(), embedding);

    (service, db_path)
}
