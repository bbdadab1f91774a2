//! # manual-qa-embed
//!
//! Text embedding backend for the manual-qa retriever. Turns text into
//! fixed-length, L2-normalized `f32` vectors using local ONNX models via
//! FastEmbed.
//!
//! ## Lazy loading
//!
//! Loading a model is the dominant startup cost, so [`FastEmbedProvider::new`]
//! only probes whether the configured model can be served and records the
//! answer. Weights are acquired on the first [`EmbeddingProvider::ensure_loaded`]
//! call, which every encoding path goes through.
//!
//! ```no_run
//! use manual_qa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> manual_qa_embed::Result<()> {
//! let provider = FastEmbedProvider::new(EmbedConfig::new("all-MiniLM-L6-v2"));
//! assert!(!provider.is_loaded());
//!
//! let result = provider
//!     .embed_texts(&["How do I check the engine oil?".to_string()])
//!     .await?;
//! println!("{} vectors of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Missing runtime
//!
//! Built without the `fastembed` feature, every provider reports
//! [`EmbedError::BackendUnavailable`] naming the feature to enable. Callers can
//! tell that apart from runtime failures with [`EmbedError::is_configuration`].
//!
//! ## Modules
//!
//! - [`config`]: model and batching configuration
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`downloader`]: HuggingFace download of ONNX exports fastembed does not ship
//! - [`mock`]: deterministic provider for tests and offline runs
//! - [`error`]: error types

pub mod config;
pub mod downloader;
pub mod error;
pub mod mock;
pub mod provider;

pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_MODEL_NAME, EmbedConfig, TokenizerConfig};
pub use downloader::ModelDownloader;
pub use error::{EmbedError, Result};
pub use mock::MockEmbeddingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, l2_normalize};
