use crate::config::ConfigError;
use crate::index::IndexError;
use manual_qa_embed::EmbedError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the retriever.
///
/// Cache problems never show up here: an unreadable or stale cache entry is
/// logged and rebuilt, and a failed cache write is logged and skipped.
#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("embedding backend returned {actual} vectors for {expected} chunks")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("invalid fingerprint '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidFingerprint(String),

    #[error("failed to read manuals from {path}: {source}")]
    ReadManuals {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manuals JSON {path}: {source}")]
    ParseManuals {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize manuals: {0}")]
    SerializeManuals(#[source] serde_json::Error),

    #[error("failed to write manuals to {path}: {source}")]
    WriteManuals {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RetrieverError {
    /// True when the error comes from how the retriever was set up (missing
    /// embedding runtime, bad model or retriever settings) rather than from a
    /// transient runtime failure.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Embedding(err) => err.is_configuration(),
            Self::Config(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrieverError>;
