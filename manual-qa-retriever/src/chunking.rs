//! Word-window chunking of extracted document text.

use crate::config::ConfigError;
use crate::manuals::Chunk;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Window size and overlap, both measured in whitespace-separated words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Distance between consecutive window starts
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split `text` into overlapping word windows.
///
/// A window starts every [`ChunkingConfig::step`] words, so the final window
/// may be shorter than `chunk_size` and may lie entirely inside its
/// predecessor's overlap. Words are re-joined with single spaces.
pub fn chunk_words(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, ConfigError> {
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let chunks = (0..words.len())
        .step_by(config.step())
        .map(|start| {
            let end = start.saturating_add(config.chunk_size).min(words.len());
            Chunk::new(words[start..end].join(" "), start, end)
        })
        .collect();

    Ok(chunks)
}
