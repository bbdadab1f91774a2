//! Embedding provider implementations
//!
//! [`FastEmbedProvider`] never touches model weights at construction. It only
//! probes whether the requested model can be served by this build and keeps
//! the outcome; the weights are loaded by the first call to
//! [`EmbeddingProvider::ensure_loaded`] (directly, or through
//! [`EmbeddingProvider::embed_texts`]) and shared by every later call.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector and is 0 for an empty result.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding backends that turn text into L2-normalized vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Acquire the model. The first call does the work, later calls return
    /// immediately. A backend that cannot exist in this environment reports a
    /// configuration error here, every time, without retrying the probe.
    async fn ensure_loaded(&self) -> Result<()>;

    /// Generate embeddings for multiple texts, preserving input order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    /// Whether the model has been acquired yet
    fn is_loaded(&self) -> bool;

    /// Identifier of the model; part of every persisted index's cache key
    fn model_name(&self) -> &str;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// What the construction-time probe found out about the requested model
#[derive(Debug, Clone)]
enum Capability {
    #[cfg(feature = "fastembed")]
    Builtin(fastembed::EmbeddingModel),
    #[cfg(feature = "fastembed")]
    HuggingFace,
    #[cfg_attr(feature = "fastembed", allow(dead_code))]
    Missing,
    #[cfg_attr(not(feature = "fastembed"), allow(dead_code))]
    UnknownModel,
}

#[cfg(feature = "fastembed")]
fn probe(config: &EmbedConfig) -> Capability {
    if config.is_huggingface_model() {
        return Capability::HuggingFace;
    }
    match backend::resolve_builtin_model(&config.model_name) {
        Some(model) => Capability::Builtin(model),
        None => Capability::UnknownModel,
    }
}

#[cfg(not(feature = "fastembed"))]
fn probe(_config: &EmbedConfig) -> Capability {
    Capability::Missing
}

#[cfg(feature = "fastembed")]
mod backend {
    use crate::config::EmbedConfig;
    use crate::downloader::ModelDownloader;
    use crate::error::{EmbedError, Result};
    use fastembed::{
        EmbeddingModel, InitOptions, Pooling, TextEmbedding, TokenizerFiles,
        UserDefinedEmbeddingModel,
    };
    use tokio::fs;

    pub type Engine = TextEmbedding;

    /// Match a model identifier against fastembed's built-in list. Accepts
    /// the full model code (`Qdrant/all-MiniLM-L6-v2-onnx`), the bare name
    /// (`all-MiniLM-L6-v2`) or the sentence-transformers form
    /// (`sentence-transformers/all-MiniLM-L6-v2`).
    pub fn resolve_builtin_model(name: &str) -> Option<EmbeddingModel> {
        let wanted = name.trim().to_ascii_lowercase();
        let wanted_short = wanted.rsplit('/').next().unwrap_or(&wanted).to_string();

        TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| {
                let code = info.model_code.to_ascii_lowercase();
                let short = code.rsplit('/').next().unwrap_or(&code);
                code == wanted || short == wanted_short || short.trim_end_matches("-onnx") == wanted_short
            })
            .map(|info| info.model)
    }

    pub fn load_builtin(model: EmbeddingModel, config: &EmbedConfig) -> Result<Engine> {
        tracing::info!("Loading built-in fastembed model: {}", config.model_name);
        let options = InitOptions::new(model)
            .with_cache_dir(config.model_base_path.clone())
            .with_show_download_progress(config.show_download_progress);
        TextEmbedding::try_new(options).map_err(EmbedError::model_init)
    }

    pub async fn load_user_defined(config: &EmbedConfig) -> Result<Engine> {
        ModelDownloader::new()?.ensure_model(config).await?;
        config.validate_model_files()?;

        tracing::info!("Loading user-defined model: {}", config.model_name);
        let tokenizer = config.tokenizer_config();

        let onnx_file = fs::read(config.onnx_model_path()).await?;
        let tokenizer_file = fs::read(&tokenizer.tokenizer_path).await?;
        let config_file = fs::read(&tokenizer.config_path).await?;
        let special_tokens_map_file = fs::read(&tokenizer.special_tokens_map_path).await?;
        let tokenizer_config_file = match &tokenizer.tokenizer_config_path {
            Some(path) if path.exists() => fs::read(path).await?,
            _ => minimal_tokenizer_config()?,
        };

        let model = UserDefinedEmbeddingModel::new(
            onnx_file,
            TokenizerFiles {
                tokenizer_file,
                config_file,
                special_tokens_map_file,
                tokenizer_config_file,
            },
        )
        .with_pooling(Pooling::Mean);

        tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new_from_user_defined(model, Default::default())
                .map_err(EmbedError::model_init)
        })
        .await?
    }

    fn minimal_tokenizer_config() -> Result<Vec<u8>> {
        let minimal_config = serde_json::json!({
            "clean_up_tokenization_spaces": true,
            "do_lower_case": true,
            "model_max_length": 512,
            "tokenizer_class": "BertTokenizer"
        });
        serde_json::to_vec_pretty(&minimal_config)
            .map_err(|e| EmbedError::External { source: e.into() })
    }

    pub fn embed(engine: &mut Engine, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        engine
            .embed(texts, None)
            .map_err(EmbedError::embedding_gen)
    }
}

#[cfg(not(feature = "fastembed"))]
mod backend {
    use crate::error::Result;

    pub type Engine = std::convert::Infallible;

    pub fn embed(engine: &mut Engine, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match *engine {}
    }
}

#[cfg(feature = "fastembed")]
pub use backend::resolve_builtin_model;

struct LoadedModel {
    engine: Arc<Mutex<backend::Engine>>,
    dimension: usize,
}

fn lock_engine(engine: &Mutex<backend::Engine>) -> Result<MutexGuard<'_, backend::Engine>> {
    engine.lock().map_err(|_| EmbedError::External {
        source: anyhow::anyhow!("embedding model lock poisoned"),
    })
}

/// FastEmbed-based embedding provider using local ONNX models
pub struct FastEmbedProvider {
    config: EmbedConfig,
    capability: Capability,
    loaded: OnceCell<LoadedModel>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("capability", &self.capability)
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}

impl FastEmbedProvider {
    /// Create a provider without loading anything.
    pub fn new(config: EmbedConfig) -> Self {
        let capability = probe(&config);
        tracing::debug!(
            "Embedding backend probe for {}: {:?}",
            config.model_name,
            capability
        );
        Self {
            config,
            capability,
            loaded: OnceCell::new(),
        }
    }

    /// Create a provider and load its model immediately.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let provider = Self::new(config);
        provider.ensure_loaded().await?;
        Ok(provider)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embedding dimension, known once the model is loaded
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.loaded.get().map(|model| model.dimension)
    }

    async fn loaded_model(&self) -> Result<&LoadedModel> {
        self.loaded.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<LoadedModel> {
        self.config.validate()?;

        let engine: backend::Engine = match &self.capability {
            Capability::Missing => {
                return Err(EmbedError::unavailable(
                    "the fastembed ONNX runtime (cargo feature `fastembed`)",
                    "Rebuild manual-qa-embed with `--features fastembed` (on by default) and retry.",
                ));
            }
            Capability::UnknownModel => {
                return Err(EmbedError::invalid_config(format!(
                    "'{}' is not a built-in fastembed model; choose a supported model or set hf_model_repo",
                    self.config.model_name
                )));
            }
            #[cfg(feature = "fastembed")]
            Capability::Builtin(model) => {
                let model = model.clone();
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || backend::load_builtin(model, &config)).await??
            }
            #[cfg(feature = "fastembed")]
            Capability::HuggingFace => backend::load_user_defined(&self.config).await?,
        };

        let engine = Arc::new(Mutex::new(engine));
        let probe_engine = Arc::clone(&engine);
        let probe = tokio::task::spawn_blocking(move || {
            let mut guard = lock_engine(&probe_engine)?;
            backend::embed(&mut guard, vec!["dimension probe".to_string()])
        })
        .await??;

        let dimension = probe
            .first()
            .map(Vec::len)
            .filter(|dimension| *dimension > 0)
            .ok_or_else(|| EmbedError::invalid_config("Model validation failed: empty embedding"))?;

        tracing::info!(
            "Embedding model {} loaded. Dimension: {}",
            self.config.model_name,
            dimension
        );
        Ok(LoadedModel { engine, dimension })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn ensure_loaded(&self) -> Result<()> {
        self.loaded_model().await.map(|_| ())
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.loaded_model().await?;
        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let engine = Arc::clone(&model.engine);

            let vectors = tokio::task::spawn_blocking(move || {
                tracing::debug!("Processing batch of {} texts", batch.len());
                let mut guard = lock_engine(&engine)?;
                backend::embed(&mut guard, batch)
            })
            .await??;

            all_embeddings.extend(vectors.into_iter().map(l2_normalize));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
