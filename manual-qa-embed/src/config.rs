//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model: the small sentence-transformers MiniLM shipped with fastembed.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Default number of texts sent to the model per call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Locations of the tokenizer files belonging to a downloaded ONNX model
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerConfig {
    /// Path to the tokenizer.json file
    pub tokenizer_path: PathBuf,
    /// Path to the config.json file
    pub config_path: PathBuf,
    /// Path to the special_tokens_map.json file
    pub special_tokens_map_path: PathBuf,
    /// Path to the tokenizer_config.json file (optional, a minimal one is generated if missing)
    pub tokenizer_config_path: Option<PathBuf>,
}

impl TokenizerConfig {
    /// Standard HuggingFace layout inside a model directory
    pub fn standard<P: AsRef<Path>>(model_dir: P) -> Self {
        let model_dir = model_dir.as_ref();
        Self {
            tokenizer_path: model_dir.join("tokenizer.json"),
            config_path: model_dir.join("config.json"),
            special_tokens_map_path: model_dir.join("special_tokens_map.json"),
            tokenizer_config_path: Some(model_dir.join("tokenizer_config.json")),
        }
    }

    /// Validate that all required tokenizer files exist
    pub fn validate(&self) -> Result<()> {
        let paths_to_check = [
            ("tokenizer", &self.tokenizer_path),
            ("config", &self.config_path),
            ("special tokens map", &self.special_tokens_map_path),
        ];

        for (name, path) in &paths_to_check {
            if !path.exists() {
                tracing::error!("Missing {}: {}", name, path.display());
                return Err(EmbedError::ModelFileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(path) = &self.tokenizer_config_path {
            if !path.exists() {
                tracing::warn!(
                    "tokenizer_config.json not found at {}, will generate minimal config",
                    path.display()
                );
            }
        }

        Ok(())
    }
}

/// Configuration for the embedding backend.
///
/// `model_name` is also the identifier the retriever stores next to every
/// persisted index, so changing it invalidates cached indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model, e.g. `all-MiniLM-L6-v2`
    pub model_name: String,
    /// HuggingFace repository holding an ONNX export, for models fastembed does not ship
    pub hf_model_repo: Option<String>,
    /// HuggingFace revision/branch
    pub hf_revision: Option<String>,
    /// Directory where downloaded models are kept
    pub model_base_path: PathBuf,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Show a progress bar while fastembed downloads model weights
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            hf_model_repo: None,
            hf_revision: Some("main".to_string()),
            model_base_path: PathBuf::from(".cache").join("models"),
            batch_size: DEFAULT_BATCH_SIZE,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Configuration for a model by name, everything else default
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Configuration for an ONNX model hosted on HuggingFace
    pub fn from_huggingface(model_name: impl Into<String>, hf_repo: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            hf_model_repo: Some(hf_repo.into()),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the directory downloaded models are stored in (builder style)
    pub fn with_model_base_path<P: AsRef<Path>>(self, path: P) -> Self {
        Self {
            model_base_path: path.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Set the HuggingFace revision (builder style)
    pub fn with_revision<S: Into<String>>(self, revision: S) -> Self {
        Self {
            hf_revision: Some(revision.into()),
            ..self
        }
    }

    /// Toggle the download progress bar (builder style)
    pub fn with_download_progress(self, show_download_progress: bool) -> Self {
        Self {
            show_download_progress,
            ..self
        }
    }

    /// Get the full path to the model directory
    pub fn model_path(&self) -> PathBuf {
        self.model_base_path.join(&self.model_name)
    }

    /// Path of the ONNX weights inside the model directory
    pub fn onnx_model_path(&self) -> PathBuf {
        self.model_path().join("onnx").join("model.onnx")
    }

    /// Tokenizer files for a downloaded model
    pub fn tokenizer_config(&self) -> TokenizerConfig {
        TokenizerConfig::standard(self.model_path())
    }

    /// Check if this is a HuggingFace model
    pub fn is_huggingface_model(&self) -> bool {
        self.hf_model_repo.is_some()
    }

    /// Get the HuggingFace repository name
    pub fn hf_repo(&self) -> Option<&str> {
        self.hf_model_repo.as_deref()
    }

    /// Get the HuggingFace revision
    pub fn hf_revision(&self) -> &str {
        self.hf_revision.as_deref().unwrap_or("main")
    }

    /// Check the settings that do not depend on the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        Ok(())
    }

    /// Validate that all files of a downloaded model exist
    pub fn validate_model_files(&self) -> Result<()> {
        let onnx_path = self.onnx_model_path();
        if !onnx_path.exists() {
            tracing::error!("Missing ONNX model: {}", onnx_path.display());
            return Err(EmbedError::ModelFileNotFound { path: onnx_path });
        }
        self.tokenizer_config().validate()?;
        tracing::debug!("Model validation successful for: {}", self.model_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = EmbedConfig::default();
        assert_eq!(config.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.hf_revision(), "main");
        assert!(!config.is_huggingface_model());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_paths() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface("bge-custom", "someone/bge-custom-onnx")
            .with_model_base_path(temp_dir.path());

        let expected_base = temp_dir.path().join("bge-custom");
        assert_eq!(config.model_path(), expected_base);
        assert_eq!(
            config.onnx_model_path(),
            expected_base.join("onnx").join("model.onnx")
        );
        assert_eq!(
            config.tokenizer_config().tokenizer_path,
            expected_base.join("tokenizer.json")
        );
        assert_eq!(config.hf_repo(), Some("someone/bge-custom-onnx"));
    }

    #[test]
    fn test_builder_methods() {
        let config = EmbedConfig::new("test-model")
            .with_batch_size(8)
            .with_revision("v2")
            .with_download_progress(true);

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.hf_revision(), "v2");
        assert!(config.show_download_progress);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let err = EmbedConfig::default().with_batch_size(0).validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_model_files() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface("absent", "nobody/absent")
            .with_model_base_path(temp_dir.path());
        assert!(matches!(
            config.validate_model_files(),
            Err(EmbedError::ModelFileNotFound { .. })
        ));
    }

    #[test]
    fn test_partial_toml_style_deserialization() {
        let config: EmbedConfig =
            serde_json::from_str(r#"{"model_name": "bge-small-en-v1.5"}"#).unwrap();
        assert_eq!(config.model_name, "bge-small-en-v1.5");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
