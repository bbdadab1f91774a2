//! Lexical fallback search for when vector search is unavailable or finds
//! nothing.

use crate::manuals::ManualsData;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordHit {
    pub text: String,
    pub group: String,
    pub chunk_index: usize,
    /// Number of distinct query words found in the chunk
    pub score: usize,
}

/// Rank chunks by how many distinct query words they contain.
///
/// Query words are the whitespace-separated, lowercased tokens of `query`.
/// A word matches when it occurs as a substring of the lowercased chunk text,
/// so `oil` also matches `oils` and `boil`. Chunks scoring zero are dropped.
/// Ties keep corpus order (group name, then chunk index).
pub fn simple_keyword_search(
    manuals: &ManualsData,
    query: &str,
    group: Option<&str>,
    top_k: usize,
) -> Vec<KeywordHit> {
    let lowered = query.to_lowercase();
    let words: HashSet<&str> = lowered.split_whitespace().collect();
    if words.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for (name, manual) in manuals.groups() {
        if group.is_some_and(|wanted| wanted != name) {
            continue;
        }
        for (chunk_index, chunk) in manual.chunks.iter().enumerate() {
            let text = chunk.text.to_lowercase();
            let score = words.iter().filter(|word| text.contains(*word)).count();
            if score > 0 {
                hits.push(KeywordHit {
                    text: chunk.text.clone(),
                    group: name.to_string(),
                    chunk_index,
                    score,
                });
            }
        }
    }

    // Stable, so equal scores stay in corpus order
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manuals::Chunk;

    fn manuals() -> ManualsData {
        ManualsData::from_iter([
            (
                "MG Astor",
                vec![
                    Chunk::new("Check the ENGINE OIL level monthly.", 0, 6),
                    Chunk::new("Tyre pressure should be 35 PSI.", 6, 12),
                    Chunk::new("Use genuine engine coolant only.", 12, 17),
                ],
            ),
            (
                "Tata Tiago",
                vec![Chunk::new("Engine oil grade: 5W-30.", 0, 4)],
            ),
        ])
    }

    #[test]
    fn test_scores_count_distinct_words() {
        let hits = simple_keyword_search(&manuals(), "engine oil", None, 10);
        let summary: Vec<_> = hits
            .iter()
            .map(|h| (h.group.as_str(), h.chunk_index, h.score))
            .collect();
        assert_eq!(
            summary,
            vec![("MG Astor", 0, 2), ("Tata Tiago", 0, 2), ("MG Astor", 2, 1)]
        );
    }

    #[test]
    fn test_matching_chunk_outranks_non_matching() {
        let manuals = ManualsData::from_iter([(
            "A",
            vec![
                Chunk::new("Engine oil SAE 5W-30", 0, 4),
                Chunk::new("Tire pressure 32 PSI", 4, 8),
            ],
        )]);
        let hits = simple_keyword_search(&manuals, "engine oil", None, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Engine oil SAE 5W-30");
        assert_eq!(hits[0].score, 2);
    }

    #[test]
    fn test_repeated_query_words_count_once() {
        let hits = simple_keyword_search(&manuals(), "oil oil OIL", Some("MG Astor"), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1);
    }

    #[test]
    fn test_group_filter_and_truncation() {
        let hits = simple_keyword_search(&manuals(), "engine oil", Some("MG Astor"), 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Check the ENGINE OIL level monthly.");

        assert!(simple_keyword_search(&manuals(), "engine", Some("Unknown"), 5).is_empty());
    }

    #[test]
    fn test_substring_matching() {
        let hits = simple_keyword_search(&manuals(), "press", None, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[test]
    fn test_blank_query_or_zero_k_returns_nothing() {
        assert!(simple_keyword_search(&manuals(), "   ", None, 5).is_empty());
        assert!(simple_keyword_search(&manuals(), "engine", None, 0).is_empty());
    }
}
