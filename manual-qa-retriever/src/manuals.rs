//! Corpus types: document groups, their chunks, and per-row index metadata.
//!
//! The JSON layout matches what the PDF processing step writes
//! (`processed_manuals.json`):
//!
//! ```json
//! {
//!   "MG Astor": {
//!     "car_model": "MG Astor",
//!     "chunks": [ { "text": "...", "start_word": 0, "end_word": 500 } ],
//!     "total_chunks": 1
//!   }
//! }
//! ```
//!
//! Extra per-group fields are ignored on read.

use crate::chunking::{ChunkingConfig, chunk_words};
use crate::error::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A contiguous slice of a document's text with its word-offset span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    #[serde(default)]
    pub start_word: usize,
    #[serde(default)]
    pub end_word: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, start_word: usize, end_word: usize) -> Self {
        Self {
            text: text.into(),
            start_word,
            end_word,
        }
    }
}

/// One document group, e.g. a single owner's manual
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manual {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

/// Describes row `i` of a vector index: which group and chunk it came from.
///
/// The group is serialized as `car_model`, the field name used by existing
/// metadata sidecars; `group` is accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "car_model", alias = "group")]
    pub group: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub start_word: usize,
    #[serde(default)]
    pub end_word: usize,
}

/// Mapping from group name to its ordered chunks.
///
/// Groups are kept sorted by name, so every iteration over the corpus
/// (flattening for the index, keyword scans) visits groups in the same order
/// regardless of how they were inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualsData {
    groups: BTreeMap<String, Manual>,
}

impl ManualsData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group's chunks
    pub fn insert(&mut self, group: impl Into<String>, chunks: Vec<Chunk>) {
        self.groups.insert(group.into(), Manual { chunks });
    }

    /// Chunk `text` with `chunking` and store the result under `group`.
    /// Returns the number of chunks produced.
    pub fn insert_text(
        &mut self,
        group: impl Into<String>,
        text: &str,
        chunking: &ChunkingConfig,
    ) -> Result<usize> {
        let chunks = chunk_words(text, chunking)?;
        let count = chunks.len();
        self.insert(group, chunks);
        Ok(count)
    }

    pub fn get(&self, group: &str) -> Option<&Manual> {
        self.groups.get(group)
    }

    /// Chunk `chunk_index` of `group`, if both exist
    pub fn chunk(&self, group: &str, chunk_index: usize) -> Option<&Chunk> {
        self.groups.get(group)?.chunks.get(chunk_index)
    }

    /// Groups in name order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &Manual)> {
        self.groups.iter().map(|(name, manual)| (name.as_str(), manual))
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.groups.values().map(|manual| manual.chunks.len()).sum()
    }

    /// True when there is nothing to index, including when every group is empty
    pub fn is_empty(&self) -> bool {
        self.total_chunks() == 0
    }

    /// Parallel `(texts, metadata)` sequences in index row order:
    /// group-major, chunk-index-minor.
    pub fn flatten(&self) -> (Vec<String>, Vec<ChunkMetadata>) {
        let total = self.total_chunks();
        let mut texts = Vec::with_capacity(total);
        let mut metadata = Vec::with_capacity(total);

        for (group, manual) in self.groups() {
            for (chunk_index, chunk) in manual.chunks.iter().enumerate() {
                texts.push(chunk.text.clone());
                metadata.push(ChunkMetadata {
                    group: group.to_string(),
                    chunk_index,
                    start_word: chunk.start_word,
                    end_word: chunk.end_word,
                });
            }
        }

        (texts, metadata)
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| RetrieverError::ReadManuals {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| RetrieverError::ParseManuals {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(RetrieverError::SerializeManuals)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RetrieverError::WriteManuals {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| RetrieverError::WriteManuals {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<G: Into<String>> FromIterator<(G, Vec<Chunk>)> for ManualsData {
    fn from_iter<I: IntoIterator<Item = (G, Vec<Chunk>)>>(iter: I) -> Self {
        let mut manuals = Self::new();
        for (group, chunks) in iter {
            manuals.insert(group, chunks);
        }
        manuals
    }
}
