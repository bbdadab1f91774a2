//! Deterministic in-process embedding provider for tests and offline demos.
//!
//! Vectors come from hashing lowercase word tokens into a fixed number of
//! buckets (a signed bag-of-words), unless a vector was pinned for the exact
//! text with [`MockEmbeddingProvider::with_vector`]. Call counters let tests
//! assert how often the backend was actually used.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, l2_normalize};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct MockEmbeddingProvider {
    model_name: String,
    dimension: usize,
    pinned: HashMap<String, Vec<f32>>,
    unavailable: bool,
    loaded: AtomicBool,
    load_calls: AtomicUsize,
    encode_calls: AtomicUsize,
    encoded_texts: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimension: dimension.max(1),
            pinned: HashMap::new(),
            unavailable: false,
            loaded: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            encode_calls: AtomicUsize::new(0),
            encoded_texts: AtomicUsize::new(0),
        }
    }

    /// A provider whose runtime is missing: every load attempt fails with
    /// [`EmbedError::BackendUnavailable`].
    pub fn unavailable(model_name: impl Into<String>) -> Self {
        Self {
            unavailable: true,
            ..Self::new(model_name, 8)
        }
    }

    /// Return exactly `vector` (normalized) whenever `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// Number of `ensure_loaded` calls that actually performed a load
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of non-empty `embed_texts` calls
    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    /// Total number of texts embedded across all calls
    pub fn encoded_texts(&self) -> usize {
        self.encoded_texts.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.pinned.get(text) {
            return l2_normalize(vector.clone());
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn ensure_loaded(&self) -> Result<()> {
        if self.unavailable {
            return Err(EmbedError::unavailable(
                "the mock embedding runtime",
                "Construct the provider with MockEmbeddingProvider::new.",
            ));
        }
        if !self.loaded.swap(true, Ordering::SeqCst) {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        self.ensure_loaded().await?;
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.encoded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|text| self.vector_for(text)).collect(),
        ))
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
