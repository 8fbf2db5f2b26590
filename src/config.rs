use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default corpus directory
const DEFAULT_CORPUS_DIR: &str = "data/sample";
/// Default index file location
const DEFAULT_INDEX_PATH: &str = "results/index.bin";
/// Number of neighbors to return
const DEFAULT_K: usize = 5;
/// Column width for printed paragraphs
const DEFAULT_WRAP_WIDTH: usize = 100;

const DEFAULT_ENDPOINT: &str = "https://api.cohere.com/v1/embed";
const DEFAULT_MODEL: &str = "embed-english-v3.0";
const DEFAULT_INPUT_TYPE: &str = "search_query";
/// Cohere's per-request text limit
const DEFAULT_BATCH_SIZE: usize = 96;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
const DEFAULT_MAX_BACKOFF_MS: u64 = 8000;

/// Environment variable holding the embedding API key
pub const DEFAULT_API_KEY_ENV: &str = "COHERE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Embedding service settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Full URL of the embed endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Cohere input type (e.g., "search_query", "search_document")
    #[serde(default = "default_input_type")]
    pub input_type: String,

    /// Paragraphs per embed request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent embed requests: "auto" or a positive integer
    #[serde(default = "default_parallelism")]
    pub parallelism: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            input_type: default_input_type(),
            batch_size: DEFAULT_BATCH_SIZE,
            parallelism: default_parallelism(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve `parallelism` to a worker count.
    pub fn worker_count(&self) -> Result<usize, ConfigError> {
        if self.parallelism == "auto" {
            return Ok(std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1));
        }

        match self.parallelism.parse::<usize>() {
            Ok(0) | Err(_) => Err(ConfigError::invalid(
                "embedding.parallelism",
                format!("must be 'auto' or a positive integer, got '{}'", self.parallelism),
            )),
            Ok(n) => Ok(n),
        }
    }
}

/// Retry behavior for transient embedding failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CORPUS_DIR)
}

fn default_index_path() -> PathBuf {
    PathBuf::from(DEFAULT_INDEX_PATH)
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_wrap_width() -> usize {
    DEFAULT_WRAP_WIDTH
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_input_type() -> String {
    DEFAULT_INPUT_TYPE.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_parallelism() -> String {
    "1".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the .pdf/.docx/.txt corpus
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,

    /// Where the vector index is written
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Number of nearest neighbors to return
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            index_path: default_index_path(),
            k: DEFAULT_K,
            wrap_width: DEFAULT_WRAP_WIDTH,
            embedding: EmbeddingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::invalid("k", "must be greater than 0"));
        }

        if self.wrap_width == 0 {
            return Err(ConfigError::invalid("wrap_width", "must be greater than 0"));
        }

        let emb = &self.embedding;
        if emb.batch_size == 0 {
            return Err(ConfigError::invalid(
                "embedding.batch_size",
                "must be greater than 0",
            ));
        }

        if emb.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "embedding.timeout_secs",
                "must be greater than 0",
            ));
        }

        if emb.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("embedding.endpoint", "must not be empty"));
        }

        emb.worker_count()?;

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms",
                format!(
                    "{} exceeds retry.max_backoff_ms {}",
                    self.retry.initial_backoff_ms, self.retry.max_backoff_ms
                ),
            ));
        }

        Ok(())
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml).map_err(|source| ConfigError::Malformed {
            path: origin.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file.
    pub fn load_with(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&config_str, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.k, 5);
        assert_eq!(config.corpus_dir, PathBuf::from("data/sample"));
        assert_eq!(config.embedding.model, "embed-english-v3.0");
        assert_eq!(config.embedding.batch_size, 96);
    }

    #[test]
    fn test_empty_yaml_yields_defaults() {
        let config = Config::from_yaml("{}", Path::new("inline")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = "k: 3\nembedding:\n  batch_size: 10\n  parallelism: auto\nretry:\n  max_retries: 0\n";
        let config = Config::from_yaml(yaml, Path::new("inline")).unwrap();

        assert_eq!(config.k, 3);
        assert_eq!(config.embedding.batch_size, 10);
        assert_eq!(config.embedding.parallelism, "auto");
        assert_eq!(config.embedding.model, "embed-english-v3.0");
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.max_backoff_ms, 8000);
    }

    #[test]
    fn test_malformed_yaml() {
        let result = Config::from_yaml("k: [not, a, number]", Path::new("bad.yaml"));
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_zero_k_rejected() {
        let result = Config::from_yaml("k: 0", Path::new("inline"));
        assert!(matches!(result, Err(ConfigError::Invalid { field: "k", .. })));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "embedding.batch_size",
                ..
            })
        ));
    }

    #[test]
    fn test_parallelism_parsing() {
        let mut emb = EmbeddingConfig::default();
        assert_eq!(emb.worker_count().unwrap(), 1);

        emb.parallelism = "4".into();
        assert_eq!(emb.worker_count().unwrap(), 4);

        emb.parallelism = "auto".into();
        assert!(emb.worker_count().unwrap() >= 1);

        emb.parallelism = "0".into();
        assert!(emb.worker_count().is_err());

        emb.parallelism = "many".into();
        assert!(emb.worker_count().is_err());
    }

    #[test]
    fn test_backoff_ordering_rejected() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_with_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "corpus_dir: /srv/docs\nindex_path: /srv/index.bin\n").unwrap();

        let config = Config::load_with(&path).unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("/srv/docs"));
        assert_eq!(config.index_path, PathBuf::from("/srv/index.bin"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_with(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed = Config::from_yaml(&yaml, Path::new("inline")).unwrap();
        assert_eq!(parsed, config);
    }
}
