//! Error types for the embedding backend

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Configuration-class variants ([`EmbedError::BackendUnavailable`],
/// [`EmbedError::InvalidConfig`], [`EmbedError::ModelFileNotFound`]) mean the
/// capability is genuinely absent and retrying will not help. Everything else
/// is a runtime failure of a backend that was otherwise usable.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding runtime is not available in this build or environment.
    #[error("Embedding backend unavailable: {dependency} is missing. {remediation}")]
    BackendUnavailable {
        dependency: String,
        remediation: String,
    },

    /// Error when model files are not found or invalid
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a backend-unavailable error naming the missing dependency and
    /// what to do about it.
    pub fn unavailable<D: Into<String>, R: Into<String>>(dependency: D, remediation: R) -> Self {
        Self::BackendUnavailable {
            dependency: dependency.into(),
            remediation: remediation.into(),
        }
    }

    /// True when the error means the capability is absent rather than a
    /// transient runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::InvalidConfig { .. }
                | Self::ModelFileNotFound { .. }
        )
    }
}
