//! HuggingFace model downloading for ONNX exports fastembed does not ship

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Downloads models from HuggingFace Hub
pub struct ModelDownloader {
    api: Api,
}

impl ModelDownloader {
    /// Create a downloader. Authentication comes from the usual HF token
    /// environment variables or the cached token file.
    pub fn new() -> Result<Self> {
        let api = Api::new().map_err(|e| EmbedError::External { source: e.into() })?;
        Ok(Self { api })
    }

    /// Download the model named by `config` unless all of its files are
    /// already present. Does nothing for built-in fastembed models.
    pub async fn ensure_model(&self, config: &EmbedConfig) -> Result<()> {
        if !config.is_huggingface_model() {
            tracing::debug!("Not a HuggingFace model, skipping download");
            return Ok(());
        }

        if is_model_complete(config) {
            tracing::info!("Model {} already exists and is complete", config.model_name);
            return Ok(());
        }

        let repo_id = config
            .hf_repo()
            .ok_or_else(|| EmbedError::invalid_config("HuggingFace repository not specified"))?;

        tracing::info!(
            "Downloading model {} from {}@{}",
            config.model_name,
            repo_id,
            config.hf_revision()
        );

        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            config.hf_revision().to_string(),
        ));

        self.download_model_files(&repo, config).await?;

        tracing::info!("Model {} downloaded successfully", config.model_name);
        Ok(())
    }

    async fn download_model_files(&self, repo: &ApiRepo, config: &EmbedConfig) -> Result<()> {
        for (remote_path, local_path) in download_plan(config) {
            if local_path.exists() {
                tracing::debug!("File already exists: {}", local_path.display());
                continue;
            }
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            tracing::info!("Downloading {} to {}", remote_path, local_path.display());

            match repo.get(remote_path).await {
                Ok(cached) => {
                    fs::copy(&cached, &local_path).await?;
                }
                Err(e) if remote_path == "special_tokens_map.json" => {
                    tracing::warn!("Failed to download {}: {}", remote_path, e);
                    write_fallback_special_tokens_map(&local_path).await?;
                }
                Err(e) if remote_path == "tokenizer_config.json" => {
                    // optional, the provider synthesizes a minimal one
                    tracing::info!("tokenizer_config.json not available: {}", e);
                }
                Err(e) => return Err(EmbedError::External { source: e.into() }),
            }
        }

        Ok(())
    }
}

/// Remote file → local destination for every file a user-defined model needs
fn download_plan(config: &EmbedConfig) -> Vec<(&'static str, PathBuf)> {
    let tokenizer = config.tokenizer_config();
    let mut plan = vec![
        ("onnx/model.onnx", config.onnx_model_path()),
        ("tokenizer.json", tokenizer.tokenizer_path),
        ("config.json", tokenizer.config_path),
        ("special_tokens_map.json", tokenizer.special_tokens_map_path),
    ];
    if let Some(path) = tokenizer.tokenizer_config_path {
        plan.push(("tokenizer_config.json", path));
    }
    plan
}

/// True when every required (non-optional) model file is on disk
pub fn is_model_complete(config: &EmbedConfig) -> bool {
    download_plan(config)
        .into_iter()
        .filter(|(remote, _)| *remote != "tokenizer_config.json")
        .all(|(_, local)| {
            let present = local.exists();
            if !present {
                tracing::debug!("Missing file: {}", local.display());
            }
            present
        })
}

async fn write_fallback_special_tokens_map(path: &Path) -> Result<()> {
    let fallback_content = serde_json::json!({
        "cls_token": "[CLS]",
        "sep_token": "[SEP]",
        "unk_token": "[UNK]",
        "pad_token": "[PAD]",
        "mask_token": "[MASK]"
    });

    let content = serde_json::to_string_pretty(&fallback_content)
        .map_err(|e| EmbedError::External { source: e.into() })?;

    fs::write(path, content).await?;
    tracing::info!("Created fallback special_tokens_map.json");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_model_complete_missing_files() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface("gte-small", "someone/gte-small-onnx")
            .with_model_base_path(temp_dir.path());
        assert!(!is_model_complete(&config));
    }

    #[test]
    fn test_is_model_complete_without_optional_tokenizer_config() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_huggingface("gte-small", "someone/gte-small-onnx")
            .with_model_base_path(temp_dir.path());

        for (remote, local) in download_plan(&config) {
            if remote == "tokenizer_config.json" {
                continue;
            }
            std::fs::create_dir_all(local.parent().unwrap()).unwrap();
            std::fs::write(&local, b"{}").unwrap();
        }

        assert!(is_model_complete(&config));
    }

    #[tokio::test]
    async fn test_fallback_special_tokens_map() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("special_tokens_map.json");
        write_fallback_special_tokens_map(&path).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["cls_token"], "[CLS]");
    }
}
