//! Content fingerprints used as the cache-validity key for persisted indices.

use crate::error::{Result, RetrieverError};
use crate::manuals::ManualsData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex digest identifying one version of a corpus.
///
/// Computed fingerprints are 64 lowercase hex characters (blake3). Callers may
/// also supply their own identifier through [`Fingerprint::new`]; it ends up in
/// a file name, so it is restricted to ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(value))
        } else {
            Err(RetrieverError::InvalidFingerprint(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a corpus.
///
/// Hashes, for each group in name order: the name, the chunk count, then every
/// chunk's text, each followed by a NUL separator. Text is fed to the hasher
/// chunk by chunk; nothing is concatenated.
pub fn fingerprint(manuals: &ManualsData) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();

    // ManualsData iterates groups sorted by name
    for (group, manual) in manuals.groups() {
        hasher.update(group.as_bytes());
        hasher.update(b"\0");
        hasher.update(manual.chunks.len().to_string().as_bytes());
        hasher.update(b"\0");
        for chunk in &manual.chunks {
            hasher.update(chunk.text.as_bytes());
            hasher.update(b"\0");
        }
    }

    Fingerprint(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manuals::Chunk;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(*text, i * 10, i * 10 + 10))
            .collect()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let manuals = ManualsData::from_iter([("A", chunks(&["one", "two"]))]);
        let fp = fingerprint(&manuals);
        assert_eq!(fp, fingerprint(&manuals));
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_group_insertion_order_does_not_matter() {
        let forward = ManualsData::from_iter([
            ("A", chunks(&["alpha"])),
            ("B", chunks(&["beta"])),
        ]);
        let backward = ManualsData::from_iter([
            ("B", chunks(&["beta"])),
            ("A", chunks(&["alpha"])),
        ]);
        assert_eq!(fingerprint(&forward), fingerprint(&backward));
    }

    #[test]
    fn test_any_text_change_changes_fingerprint() {
        let original = ManualsData::from_iter([("A", chunks(&["engine oil", "tyres"]))]);
        let edited = ManualsData::from_iter([("A", chunks(&["engine oil", "tyres!"]))]);
        assert_ne!(fingerprint(&original), fingerprint(&edited));
    }

    #[test]
    fn test_chunk_boundaries_are_part_of_the_content() {
        let split = ManualsData::from_iter([("A", chunks(&["ab", "c"]))]);
        let merged = ManualsData::from_iter([("A", chunks(&["a", "bc"]))]);
        assert_ne!(fingerprint(&split), fingerprint(&merged));
    }

    #[test]
    fn test_word_offsets_do_not_affect_fingerprint() {
        let a = ManualsData::from_iter([("A", vec![Chunk::new("same", 0, 1)])]);
        let b = ManualsData::from_iter([("A", vec![Chunk::new("same", 5, 9)])]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_custom_fingerprint_validation() {
        assert!(Fingerprint::new("release-2024_03").is_ok());
        assert!(Fingerprint::new("").is_err());
        assert!(Fingerprint::new("../escape").is_err());
    }
}
