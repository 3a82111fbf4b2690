//! Configuration for velociraptor.
//!
//! Supports both environment variables and a YAML config file.
//! Environment variables take precedence over config file values.

use crate::builder::BuilderOptions;
use crate::chunker::ChunkerOptions;
use crate::embeddings::EmbeddingScope;
use crate::error::{Result, VelociraptorError};
use crate::persistence::SaveFormat;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Chat completion settings used for summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Maximum tokens for a leaf summary
    pub max_tokens: u32,

    /// Maximum tokens for a summary synthesized from children
    pub max_synthesis_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 300,
            max_synthesis_tokens: 400,
            temperature: 0.3,
        }
    }
}

/// Embedding endpoint settings. Base URL and key fall back to the LLM ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Which nodes receive embeddings.
    pub scope: EmbeddingScope,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            model: "text-embedding-ada-002".to_string(),
            scope: EmbeddingScope::default(),
        }
    }
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    /// Minimum similarity for query hits.
    pub threshold: f32,
    /// Minimum similarity for related sections.
    pub related_threshold: f32,
    /// Maximum preview length in characters.
    pub preview_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.7,
            related_threshold: 0.5,
            preview_length: 200,
        }
    }
}

/// Where trees are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub format: SaveFormat,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Config::default_data_dir(),
            format: SaveFormat::Json,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkerOptions,
    pub builder: BuilderOptions,
    pub search: SearchConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (~/.config/velociraptor/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Config::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VelociraptorError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| VelociraptorError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Override values from environment-style lookups.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("LLM_API_BASE") {
            self.llm.api_base = v;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("EMBEDDING_API_BASE") {
            self.embedding.api_base = Some(v);
        }
        if let Some(v) = get("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("VELOCIRAPTOR_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(size) = get("VELOCIRAPTOR_MAX_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.chunking.max_chunk_size = size;
        }
        if let Some(overlap) = get("VELOCIRAPTOR_OVERLAP_PAGES").and_then(|v| v.parse().ok()) {
            self.chunking.overlap_pages = overlap;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "velociraptor")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Default directory for persisted trees.
    pub fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "velociraptor")
            .map(|dirs| dirs.data_dir().join("trees"))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Validate settings that every command depends on.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.search.top_k == 0 {
            return Err(VelociraptorError::InvalidConfig(
                "search.top_k must be greater than zero".to_string(),
            ));
        }

        for (name, value) in [
            ("search.threshold", self.search.threshold),
            ("search.related_threshold", self.search.related_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(VelociraptorError::InvalidConfig(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Validate that LLM credentials are present.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(VelociraptorError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(VelociraptorError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(VelociraptorError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Embedding base URL, falling back to the LLM one.
    pub fn embedding_api_base(&self) -> &str {
        self.embedding
            .api_base
            .as_deref()
            .unwrap_or(&self.llm.api_base)
    }

    /// Embedding key, falling back to the LLM one.
    pub fn embedding_api_key(&self) -> &str {
        self.embedding.api_key.as_deref().unwrap_or(&self.llm.api_key)
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert_eq!(config.chunking.max_chunk_size, 10);
        assert_eq!(config.chunking.overlap_pages, 1);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.threshold, 0.7);
        assert_eq!(config.search.preview_length, 200);
        assert!(config.builder.max_levels.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_llm_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate_llm().is_err());

        let config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert!(config.validate_llm().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.chunking.max_chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("LLM_API_KEY", "secret"),
            ("EMBEDDING_MODEL", "small-embed"),
            ("VELOCIRAPTOR_MAX_CHUNK_SIZE", "50"),
            ("VELOCIRAPTOR_OVERLAP_PAGES", "not a number"),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key, "secret");
        assert_eq!(config.embedding.model, "small-embed");
        assert_eq!(config.chunking.max_chunk_size, 50);
        assert_eq!(config.chunking.overlap_pages, 1);
    }

    #[test]
    fn test_embedding_falls_back_to_llm() {
        let mut config = Config::with_llm("https://llm.example.com", "k1", "m");
        assert_eq!(config.embedding_api_base(), "https://llm.example.com");
        assert_eq!(config.embedding_api_key(), "k1");

        config.embedding.api_base = Some("https://embed.example.com".to_string());
        assert_eq!(config.embedding_api_base(), "https://embed.example.com");
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "llm:\n  api_base: https://api.example.com\n  model: gpt-4\nchunking:\n  max_chunk_size: 25\nstorage:\n  data_dir: /tmp/trees\n  format: bincode\n"
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.max_tokens, 300);
        assert_eq!(config.chunking.max_chunk_size, 25);
        assert_eq!(config.chunking.overlap_pages, 1);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/trees"));
        assert_eq!(config.storage.format, SaveFormat::Bincode);
        assert_eq!(config.search.top_k, 5);
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chunking: [not, a, map]").unwrap();
        assert!(matches!(
            Config::load_from_file(file.path()),
            Err(VelociraptorError::Config(_))
        ));
    }
}
