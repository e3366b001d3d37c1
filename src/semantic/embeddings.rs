//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - Unit-normalized [`Embedding`] vectors, normalized once at creation
//! - The [`Embedder`] seam used by the match service
//! - Lazy model download into a configurable cache directory

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A dense vector with unit L2 norm.
///
/// The only way to build one is [`Embedding::normalized`], so every value of
/// this type has passed the finiteness and zero-norm checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize `values` to unit length.
    pub fn normalized(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::InvalidVector("empty vector".to_string()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidVector(
                "vector contains non-finite values".to_string(),
            ));
        }

        let norm = l2_norm(&values);
        if norm < f32::EPSILON {
            return Err(EmbeddingError::InvalidVector("zero-norm vector".to_string()));
        }

        Ok(Self(values.into_iter().map(|v| v / norm).collect()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Invalid embedding vector: {0}")]
    InvalidVector(String),

    #[error("Model initialization timed out after {0}s")]
    Timeout(u64),
}

/// Something that turns text into unit-normalized vectors.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    ///
    /// # Arguments
    /// * `model_name` - Name of the model (e.g., "nomic-embed-text-v1.5")
    /// * `cache_dir` - Directory to cache downloaded models
    /// * `download_timeout` - Optional timeout for model download
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!(
            "Loading embedding model '{}' (download timeout {}s)",
            model_name,
            timeout.as_secs()
        );

        let mut model = with_timeout(timeout, move || {
            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true);
            TextEmbedding::try_new(options).map_err(|e| e.to_string())
        })?
        .map_err(EmbeddingError::InitFailed)?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let raw = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))?;

        Embedding::normalized(raw)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .map(Embedding::normalized)
            .collect()
    }
}

/// Run `init` on its own thread and give up after `timeout`.
///
/// On timeout the thread is left to finish in the background; its result is
/// dropped.
fn with_timeout<T, F>(timeout: Duration, init: F) -> Result<T, EmbeddingError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("model-init".to_string())
        .spawn(move || {
            let _ = tx.send(init());
        })
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to spawn loader: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EmbeddingError::Timeout(timeout.as_secs())),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
            "Model loader exited without a result".to_string(),
        )),
    }
}

/// Parse model name string to fastembed enum.
pub fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "nomic-embed-text-v1.5" | "nomicembedtextv15" => {
            Ok(fastembed::EmbeddingModel::NomicEmbedTextV15)
        }
        "nomic-embed-text-v1.5-q" | "nomicembedtextv15q" => {
            Ok(fastembed::EmbeddingModel::NomicEmbedTextV15Q)
        }
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
            Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
        }
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => {
            Ok(fastembed::EmbeddingModel::BGELargeENV15Q)
        }
        "multilingual-e5-large" | "multilinguale5large" => {
            Ok(fastembed::EmbeddingModel::MultilingualE5Large)
        }
        _ => Err(EmbeddingError::InvalidModel(format!(
            "Unknown model: {}. Supported models: nomic-embed-text-v1.5, all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, multilingual-e5-large (add -q suffix for quantized, except e5)",
            name
        ))),
    }
}
