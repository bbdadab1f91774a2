//! Guess which document group a free-text question is about.

use std::collections::BTreeMap;

/// Matches questions against group names and configured aliases.
///
/// Matching is case-insensitive and works on whole words: the alias `mg`
/// matches "mg astor service" but not "changing". Groups are tried in name
/// order and the first match wins.
#[derive(Debug, Clone, Default)]
pub struct GroupDetector {
    phrases: Vec<(String, Vec<String>)>,
}

impl GroupDetector {
    /// Every group is identified by its own name plus any aliases listed for
    /// it. Aliases for groups not in `groups` are ignored.
    pub fn new<I, S>(groups: I, aliases: &BTreeMap<String, Vec<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut phrases: Vec<(String, Vec<String>)> = groups
            .into_iter()
            .map(Into::into)
            .map(|group: String| {
                let mut group_phrases = vec![normalize(&group)];
                if let Some(extra) = aliases.get(&group) {
                    group_phrases.extend(extra.iter().map(|alias| normalize(alias)));
                }
                group_phrases.retain(|phrase| !phrase.trim().is_empty());
                group_phrases.dedup();
                (group, group_phrases)
            })
            .collect();
        phrases.sort_by(|a, b| a.0.cmp(&b.0));

        Self { phrases }
    }

    /// The group `query` mentions, if any
    pub fn detect(&self, query: &str) -> Option<&str> {
        let query = normalize(query);
        self.phrases
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|phrase| query.contains(phrase.as_str())))
            .map(|(group, _)| group.as_str())
    }
}

/// Lowercase alphanumeric words joined by single spaces, padded with a space
/// on each side so substring tests only match at word boundaries.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> GroupDetector {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            "MG Astor".to_string(),
            vec!["astor".to_string(), "mg".to_string()],
        );
        aliases.insert("Tata Tiago".to_string(), vec!["tiago".to_string()]);
        aliases.insert("Not Loaded".to_string(), vec!["ghost".to_string()]);
        GroupDetector::new(["Tata Tiago", "MG Astor"], &aliases)
    }

    #[test]
    fn test_detects_name_and_aliases() {
        let detector = detector();
        assert_eq!(detector.detect("What oil does the MG Astor use?"), Some("MG Astor"));
        assert_eq!(detector.detect("tiago tyre pressure"), Some("Tata Tiago"));
        assert_eq!(detector.detect("ASTOR: coolant?"), Some("MG Astor"));
    }

    #[test]
    fn test_alias_must_match_whole_words() {
        let detector = detector();
        assert_eq!(detector.detect("changing the wiper blades"), None);
        assert_eq!(detector.detect("ghost car"), None);
    }

    #[test]
    fn test_first_group_in_name_order_wins() {
        assert_eq!(detector().detect("astor or tiago?"), Some("MG Astor"));
    }
}
