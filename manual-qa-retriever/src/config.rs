//! Retriever settings, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! cache_dir = "/var/cache/manual-qa"
//! overfetch_factor = 8
//!
//! [embed]
//! model_name = "bge-small-en-v1.5"
//!
//! [group_aliases]
//! "MG Astor" = ["astor", "mg astor"]
//! "Tata Tiago" = ["tiago"]
//! ```

use crate::chunking::ChunkingConfig;
use crate::query_cache::DEFAULT_QUERY_CACHE_CAPACITY;
use manual_qa_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CACHE_DIR: &str = ".cache";
pub const DEFAULT_OVERFETCH_FACTOR: usize = 6;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Embedding model settings
    pub embed: EmbedConfig,
    /// Directory holding persisted indices
    pub cache_dir: PathBuf,
    /// Vector search fetches `top_k * overfetch_factor` candidates before
    /// applying the group filter
    pub overfetch_factor: usize,
    /// Maximum number of cached query embeddings, 0 to disable
    pub query_cache_capacity: usize,
    /// Ignore persisted indices and always re-encode
    pub force_rebuild: bool,
    /// How raw document text is split into chunks at ingest time
    pub chunking: ChunkingConfig,
    /// Extra phrases that identify a group in a free-text question
    pub group_aliases: BTreeMap<String, Vec<String>>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            embed: EmbedConfig::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            force_rebuild: false,
            chunking: ChunkingConfig::default(),
            group_aliases: BTreeMap::new(),
        }
    }
}

impl RetrieverConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_embed(mut self, embed: EmbedConfig) -> Self {
        self.embed = embed;
        self
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = cache_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor;
        self
    }

    pub fn with_query_cache_capacity(mut self, capacity: usize) -> Self {
        self.query_cache_capacity = capacity;
        self
    }

    pub fn with_force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_group_alias(mut self, group: impl Into<String>, alias: impl Into<String>) -> Self {
        self.group_aliases
            .entry(group.into())
            .or_default()
            .push(alias.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overfetch_factor == 0 {
            return Err(ConfigError::Invalid(
                "overfetch_factor must be at least 1".to_string(),
            ));
        }
        self.chunking.validate()?;
        self.embed
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RetrieverConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from(".cache"));
        assert_eq!(config.overfetch_factor, 6);
        assert_eq!(config.query_cache_capacity, 100);
        assert!(!config.force_rebuild);
        assert_eq!(config.chunking, ChunkingConfig::new(500, 100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RetrieverConfig::from_toml_str(
            r#"
            overfetch_factor = 8

            [embed]
            model_name = "bge-small-en-v1.5"

            [group_aliases]
            "MG Astor" = ["astor", "mg astor"]
            "#,
        )
        .unwrap();

        assert_eq!(config.overfetch_factor, 8);
        assert_eq!(config.embed.model_name, "bge-small-en-v1.5");
        assert_eq!(config.embed.batch_size, manual_qa_embed::DEFAULT_BATCH_SIZE);
        assert_eq!(config.query_cache_capacity, 100);
        assert_eq!(config.group_aliases["MG Astor"], vec!["astor", "mg astor"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = RetrieverConfig::from_toml_str("overfetch_factor = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RetrieverConfig::from_toml_str("[chunking]\nchunk_size = 10\noverlap = 10")
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));

        let err = RetrieverConfig::from_toml_str("overfetch_factor = \"six\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manual-qa.toml");
        std::fs::write(&path, "cache_dir = \"/tmp/mqa\"\nforce_rebuild = true\n").unwrap();

        let config = RetrieverConfig::load(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/mqa"));
        assert!(config.force_rebuild);

        assert!(matches!(
            RetrieverConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_builders() {
        let config = RetrieverConfig::default()
            .with_overfetch_factor(1)
            .with_query_cache_capacity(0)
            .with_group_alias("Tata Tiago", "tiago");
        assert_eq!(config.overfetch_factor, 1);
        assert_eq!(config.query_cache_capacity, 0);
        assert_eq!(config.group_aliases["Tata Tiago"], vec!["tiago"]);
    }
}
