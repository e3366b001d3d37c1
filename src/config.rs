use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_MODEL, DEFAULT_PREFIX, DEFAULT_THRESHOLD, DEFAULT_TOP_K};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_DATABASE_PATH: &str = "propositions_rows.csv";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
/// Characters of proposition text sent to the embedder
const DEFAULT_MAX_INPUT_CHARS: usize = 2048;
const DEFAULT_BATCH_SIZE: usize = 32;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Selection policy defaults, overridable per request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum similarity for the threshold path [-1.0, 1.0]
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Matches returned per proposition
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "nomic-embed-text-v1.5")
    #[serde(default = "default_model")]
    pub model: String,

    /// Prefix for texts matched against the database
    #[serde(default = "default_prefix")]
    pub query_prefix: String,

    /// Prefix for texts stored in the database
    #[serde(default = "default_prefix")]
    pub document_prefix: String,

    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            query_prefix: default_prefix(),
            document_prefix: default_prefix(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            batch_size: DEFAULT_BATCH_SIZE,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Reference database CSV, relative paths resolve against the base dir
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            listen_addr: default_listen_addr(),
            matching: MatchingConfig::default(),
            embedding: EmbeddingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if !(-1.0..=1.0).contains(&m.threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.threshold must be between -1.0 and 1.0, got {}",
                m.threshold
            )));
        }
        if m.top_k == 0 {
            return Err(ConfigError::Invalid(
                "matching.top_k must be at least 1".to_string(),
            ));
        }

        let e = &self.embedding;
        if e.max_input_chars == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_input_chars must be greater than 0".to_string(),
            ));
        }
        if e.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if e.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults if missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE);
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path).map_err(io_err)?;
            let defaults = serde_yml::to_string(&Self::default())?;
            let temp_path = base_path.join(format!("{CONFIG_FILE}.tmp"));
            std::fs::write(&temp_path, defaults).map_err(io_err)?;
            std::fs::rename(&temp_path, &path).map_err(io_err)?;
            log::info!("Wrote default config to {}", path.display());
        }

        let config_str = std::fs::read_to_string(&path).map_err(io_err)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Database path with relative paths resolved against the base dir.
    pub fn database_path(&self) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            self.base_path.join(&self.database_path)
        }
    }
}

/// Directory holding config and cached models.
///
/// `PROPMATCH_BASE_PATH` wins, otherwise `~/.local/share/propmatch`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("PROPMATCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()?
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".local/share/propmatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.matching.top_k, DEFAULT_TOP_K);
        assert!((config.matching.threshold - DEFAULT_THRESHOLD).abs() < f32::EPSILON);
        assert_eq!(config.embedding.query_prefix, "search_document:");
        assert_eq!(config.database_path(), tmp.path().join(DEFAULT_DATABASE_PATH));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "database_path: /data/db.csv\nmatching:\n  threshold: 0.5\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/data/db.csv"));
        assert!((config.matching.threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.matching.top_k, DEFAULT_TOP_K);
        assert_eq!(config.embedding.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "matching:\n  threshold: 1.5\n").unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = Config::default();
        config.matching.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "matching: [unclosed\n").unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_defaults_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        Config::load_with(tmp.path()).unwrap();

        assert!(!tmp.path().join(format!("{CONFIG_FILE}.tmp")).exists());
        let written = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(written.contains("top_k: 3"));

        // an existing file is left alone
        std::fs::write(tmp.path().join(CONFIG_FILE), "matching:\n  top_k: 7\n").unwrap();
        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.matching.top_k, 7);
    }
}
