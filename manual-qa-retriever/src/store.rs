//! On-disk cache of built indices.
//!
//! Each entry is a pair of files in the cache directory, keyed by embedding
//! model and corpus fingerprint:
//!
//! - `manual_index_<model>_<fingerprint>.faiss`: the [`VectorIndex`] blob
//! - `manual_index_<model>_<fingerprint>.meta.json`: a [`CacheMeta`] sidecar
//!
//! A stale, partial, or corrupt entry is a cache miss, never an error.
//! Both files are written through a temporary file and renamed into place, so
//! a concurrent reader sees either the old entry or the complete new one.

use crate::fingerprint::Fingerprint;
use crate::index::VectorIndex;
use crate::manuals::ChunkMetadata;
use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "manual_index";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize index metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sidecar describing a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub model_name: String,
    pub fingerprint: Fingerprint,
    pub chunk_metadata: Vec<ChunkMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
}

/// The two files making up one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    pub index_path: PathBuf,
    pub meta_path: PathBuf,
}

impl CachePaths {
    /// Paths for `model_name` and `fingerprint` under `cache_dir`.
    ///
    /// Pure: nothing is created on disk.
    pub fn new(model_name: &str, fingerprint: &Fingerprint, cache_dir: &Path) -> Self {
        let stem = format!(
            "{FILE_PREFIX}_{}_{}",
            sanitize_model_name(model_name),
            fingerprint
        );
        Self {
            index_path: cache_dir.join(format!("{stem}.faiss")),
            meta_path: cache_dir.join(format!("{stem}.meta.json")),
        }
    }

    pub fn exists(&self) -> bool {
        self.index_path.is_file() && self.meta_path.is_file()
    }
}

/// Reduce a model identifier to a file-name-safe token.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
/// Distinct names can collide (`a/b` and `a_b`), which is harmless because the
/// sidecar's `model_name` is compared exactly on load.
pub fn sanitize_model_name(model_name: &str) -> String {
    let sanitized: String = model_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "model".to_string()
    } else {
        sanitized
    }
}

/// Load a cache entry if it is present, readable, and built for exactly this
/// model and fingerprint.
///
/// Returns the index and its row metadata, or `None` on any kind of miss.
pub fn load(
    paths: &CachePaths,
    model_name: &str,
    fingerprint: &Fingerprint,
) -> Option<(VectorIndex, Vec<ChunkMetadata>)> {
    if !paths.exists() {
        debug!("No cached index at {}", paths.index_path.display());
        return None;
    }

    match read_entry(paths, model_name, fingerprint) {
        Ok(entry) => {
            info!(
                "Loaded cached index with {} rows from {}",
                entry.0.len(),
                paths.index_path.display()
            );
            Some(entry)
        }
        Err(e) => {
            warn!(
                "Ignoring cached index at {}: {e:#}",
                paths.index_path.display()
            );
            None
        }
    }
}

fn read_entry(
    paths: &CachePaths,
    model_name: &str,
    fingerprint: &Fingerprint,
) -> anyhow::Result<(VectorIndex, Vec<ChunkMetadata>)> {
    let raw = std::fs::read(&paths.meta_path)
        .with_context(|| format!("reading {}", paths.meta_path.display()))?;
    let meta: CacheMeta = serde_json::from_slice(&raw).context("parsing metadata sidecar")?;

    if meta.model_name != model_name {
        bail!(
            "built with model '{}', current model is '{model_name}'",
            meta.model_name
        );
    }
    if &meta.fingerprint != fingerprint {
        bail!(
            "built for fingerprint {}, corpus fingerprint is {fingerprint}",
            meta.fingerprint
        );
    }

    let blob = std::fs::read(&paths.index_path)
        .with_context(|| format!("reading {}", paths.index_path.display()))?;
    let index = VectorIndex::from_bytes(&blob)?;

    if index.len() != meta.chunk_metadata.len() {
        bail!(
            "index has {} rows but metadata describes {}",
            index.len(),
            meta.chunk_metadata.len()
        );
    }

    Ok((index, meta.chunk_metadata))
}

/// Persist an index and its row metadata, creating the cache directory if
/// needed. The blob is written before the sidecar.
pub fn save(
    index: &VectorIndex,
    chunk_metadata: &[ChunkMetadata],
    model_name: &str,
    fingerprint: &Fingerprint,
    paths: &CachePaths,
) -> Result<(), StoreError> {
    let meta = CacheMeta {
        model_name: model_name.to_string(),
        fingerprint: fingerprint.clone(),
        chunk_metadata: chunk_metadata.to_vec(),
        built_at: Some(Utc::now()),
    };
    let meta_json = serde_json::to_vec_pretty(&meta)?;

    write_atomic(&paths.index_path, &index.to_bytes())?;
    write_atomic(&paths.meta_path, &meta_json)?;

    info!(
        "Saved index with {} rows to {}",
        index.len(),
        paths.index_path.display()
    );
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fp(value: &str) -> Fingerprint {
        Fingerprint::new(value).unwrap()
    }

    fn metadata(n: usize) -> Vec<ChunkMetadata> {
        (0..n)
            .map(|i| ChunkMetadata {
                group: "MG Astor".to_string(),
                chunk_index: i,
                start_word: i * 400,
                end_word: i * 400 + 500,
            })
            .collect()
    }

    fn index(n: usize) -> VectorIndex {
        VectorIndex::build((0..n).map(|i| vec![i as f32, 1.0, 0.5]).collect()).unwrap()
    }

    #[test]
    fn test_paths_embed_sanitized_model_and_fingerprint() {
        let paths = CachePaths::new(
            "sentence-transformers/all-MiniLM-L6-v2",
            &fp("abc123"),
            Path::new("/tmp/cache"),
        );
        assert_eq!(
            paths.index_path,
            PathBuf::from(
                "/tmp/cache/manual_index_sentence-transformers_all-MiniLM-L6-v2_abc123.faiss"
            )
        );
        assert_eq!(
            paths.meta_path,
            PathBuf::from(
                "/tmp/cache/manual_index_sentence-transformers_all-MiniLM-L6-v2_abc123.meta.json"
            )
        );
    }

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize_model_name("BAAI/bge small:v1.5"), "BAAI_bge_small_v1_5");
        assert_eq!(sanitize_model_name(""), "model");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("not").join("yet").join("created");
        let paths = CachePaths::new("mock-model", &fp("f1"), &cache_dir);

        save(&index(3), &metadata(3), "mock-model", &fp("f1"), &paths).unwrap();
        assert!(paths.exists());

        let (loaded, meta) = load(&paths, "mock-model", &fp("f1")).unwrap();
        assert_eq!(loaded, index(3));
        assert_eq!(meta, metadata(3));

        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&paths.meta_path).unwrap()).unwrap();
        assert_eq!(sidecar["model_name"], "mock-model");
        assert_eq!(sidecar["fingerprint"], "f1");
        assert_eq!(sidecar["chunk_metadata"][2]["car_model"], "MG Astor");
    }

    #[test]
    fn test_missing_files_are_a_miss() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new("mock-model", &fp("f1"), dir.path());
        assert!(load(&paths, "mock-model", &fp("f1")).is_none());

        save(&index(2), &metadata(2), "mock-model", &fp("f1"), &paths).unwrap();
        std::fs::remove_file(&paths.meta_path).unwrap();
        assert!(load(&paths, "mock-model", &fp("f1")).is_none());
    }

    #[test]
    fn test_model_or_fingerprint_mismatch_is_a_miss() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new("mock-model", &fp("f1"), dir.path());
        save(&index(2), &metadata(2), "mock-model", &fp("f1"), &paths).unwrap();

        assert!(load(&paths, "other-model", &fp("f1")).is_none());
        assert!(load(&paths, "mock-model", &fp("f2")).is_none());
        assert!(load(&paths, "mock-model", &fp("f1")).is_some());
    }

    #[test]
    fn test_row_count_disagreement_is_a_miss() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new("mock-model", &fp("f1"), dir.path());
        save(&index(3), &metadata(2), "mock-model", &fp("f1"), &paths).unwrap();
        assert!(load(&paths, "mock-model", &fp("f1")).is_none());
    }

    #[test]
    fn test_corrupt_files_are_a_miss() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new("mock-model", &fp("f1"), dir.path());
        save(&index(2), &metadata(2), "mock-model", &fp("f1"), &paths).unwrap();

        std::fs::write(&paths.index_path, b"garbage").unwrap();
        assert!(load(&paths, "mock-model", &fp("f1")).is_none());

        save(&index(2), &metadata(2), "mock-model", &fp("f1"), &paths).unwrap();
        std::fs::write(&paths.meta_path, b"{ not json").unwrap();
        assert!(load(&paths, "mock-model", &fp("f1")).is_none());
    }

    #[test]
    fn test_save_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();
        let paths = CachePaths::new("mock-model", &fp("f1"), &blocker.join("cache"));

        let err = save(&index(1), &metadata(1), "mock-model", &fp("f1"), &paths).unwrap_err();
        assert!(matches!(err, StoreError::CreateDir { .. }));
    }
}
