//! Pluggable name scoring.

use std::collections::HashSet;

use crate::ids::fold_accent;

/// Minimum score accepted as a match.
pub const MATCH_THRESHOLD: u8 = 70;

/// Words shorter than this never count as shared.
const MIN_WORD_LEN: usize = 3;

/// Scores how likely a host name refers to an organization (0..=100).
pub trait NameScorer: Send + Sync {
    fn score(&self, host_name: &str, org_name: &str) -> u8;
}

/// Exact / containment / word-overlap heuristic.
///
/// | Rule                                               | Score |
/// |----------------------------------------------------|-------|
/// | normalized names equal                             | 100   |
/// | one contains the other                             | 85    |
/// | ≥ 2 shared words, or 1 when the org has ≤ 2 words  | 70    |
/// | otherwise                                          | 0     |
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapScorer;

impl NameScorer for OverlapScorer {
    fn score(&self, host_name: &str, org_name: &str) -> u8 {
        let host = normalize_name(host_name);
        let org = normalize_name(org_name);
        if host.is_empty() || org.is_empty() {
            return 0;
        }
        if host == org {
            return 100;
        }

        let (shorter, longer) = if host.len() <= org.len() {
            (&host, &org)
        } else {
            (&org, &host)
        };
        if shorter.chars().count() >= MIN_WORD_LEN && longer.contains(shorter.as_str()) {
            return 85;
        }

        let host_words: HashSet<&str> = significant_words(&host).collect();
        let shared = significant_words(&org)
            .collect::<HashSet<_>>()
            .intersection(&host_words)
            .count();
        let org_word_count = org.split(' ').count();

        if shared >= 2 || (shared == 1 && org_word_count <= 2) {
            70
        } else {
            0
        }
    }
}

fn significant_words(s: &str) -> impl Iterator<Item = &str> {
    s.split(' ').filter(|w| w.chars().count() >= MIN_WORD_LEN)
}

/// Lowercase, fold accents, drop punctuation and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else if c.is_whitespace() {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_name("  GDG   Lima!! "), "gdg lima");
        assert_eq!(normalize_name("Comunidad Tecnológica Perú"), "comunidad tecnologica peru");
        assert_eq!(normalize_name("A.W.S. User-Group"), "aws usergroup");
    }

    #[test]
    fn test_scores() {
        let s = OverlapScorer;
        assert_eq!(s.score("GDG Lima", "gdg lima"), 100);
        assert_eq!(s.score("Perú", "Peru"), 100);
        assert_eq!(s.score("GDG Lima", "GDG Lima Cloud"), 85);
        assert_eq!(s.score("Python Lima Community", "Python Peru"), 70);
        assert_eq!(
            s.score("Comunidad Python Lima Norte", "Python Lima Sur Oficial"),
            70
        );
        assert_eq!(s.score("Rust Cusco Team", "Rust Arequipa Chapter Oficial"), 0);
        assert_eq!(s.score("Juan Perez", "AWS User Group"), 0);
        assert_eq!(s.score("", "AWS"), 0);
    }

    #[test]
    fn test_short_words_do_not_count() {
        let s = OverlapScorer;
        // "ai" and "la" are below the word length floor
        assert_eq!(s.score("AI de la selva", "AI Lima"), 0);
    }

    #[test]
    fn test_threshold() {
        assert!(OverlapScorer.score("Python Lima Community", "Python Peru") >= MATCH_THRESHOLD);
    }
}
