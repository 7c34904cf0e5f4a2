// src/conflict.rs
// Three-level conflict detection for candidate records
//
// Levels run cheapest-first and short-circuit:
//   1. exact/near-duplicate text        -> Merge into the existing record
//   2. fact-like semantic contradiction -> Supersede the existing record
//   3. ambiguous overlap                -> Flag, keep both
// Anything else is Accept. The system never silently drops or overwrites
// data outside the two stronger levels.

use similar::TextDiff;
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::ConflictConfig;
use crate::types::{Category, ConflictDecision, MemoryRecord};

/// The record being ingested, before insertion.
pub struct ConflictCandidate<'a> {
    pub content: &'a str,
    pub category: Category,
    pub embedding: Option<&'a [f32]>,
}

/// An existing same-category record supplied by the ingestion path,
/// with its stored embedding when one exists.
pub struct Neighbor {
    pub record: MemoryRecord,
    pub embedding: Option<Vec<f32>>,
}

pub struct ConflictResolver {
    config: ConflictConfig,
}

impl ConflictResolver {
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    /// How many neighbors the ingestion path should fetch.
    pub fn neighbor_k(&self) -> usize {
        self.config.neighbor_k
    }

    pub fn resolve(
        &self,
        candidate: &ConflictCandidate,
        neighbors: &[Neighbor],
    ) -> ConflictDecision {
        if neighbors.is_empty() {
            return ConflictDecision::Accept;
        }

        // Level 1: exact/near-duplicate on normalized text.
        for neighbor in neighbors {
            let ratio = normalized_ratio(candidate.content, &neighbor.record.content);
            if ratio >= self.config.duplicate_ratio {
                debug!(
                    target_id = neighbor.record.id,
                    ratio, "Near-duplicate detected, merging"
                );
                return ConflictDecision::Merge(neighbor.record.id);
            }
        }

        // Level 2: semantic contradiction, fact-like categories only. High
        // embedding similarity says "same topic"; differing extracted values
        // on a shared subject says "contradicting claims".
        if candidate.category.is_fact_like() {
            for neighbor in neighbors {
                let cosine = match (candidate.embedding, neighbor.embedding.as_deref()) {
                    (Some(a), Some(b)) => cosine_similarity(a, b),
                    _ => continue,
                };
                if cosine < self.config.contradiction_cosine {
                    continue;
                }
                if contradicts(
                    candidate.content,
                    &neighbor.record.content,
                    self.config.subject_overlap,
                ) {
                    debug!(
                        target_id = neighbor.record.id,
                        cosine, "Contradiction detected, superseding"
                    );
                    return ConflictDecision::Supersede(neighbor.record.id);
                }
            }
        }

        // Level 3: similar but neither duplicate nor contradiction. Keep
        // both, tag the candidate for later inspection.
        for neighbor in neighbors {
            let over_cosine = match (candidate.embedding, neighbor.embedding.as_deref()) {
                (Some(a), Some(b)) => cosine_similarity(a, b) >= self.config.flag_cosine,
                _ => false,
            };
            let over_ratio = normalized_ratio(candidate.content, &neighbor.record.content)
                >= self.config.flag_ratio;
            if over_cosine || over_ratio {
                debug!(near_id = neighbor.record.id, "Ambiguous overlap, flagging");
                return ConflictDecision::Flag;
            }
        }

        ConflictDecision::Accept
    }
}

/// Word-level similarity ratio over normalized text.
fn normalized_ratio(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    TextDiff::from_words(a.as_str(), b.as_str()).ratio()
}

/// Lowercase, collapse whitespace, strip edge punctuation from tokens.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(trim_token)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}'))
}

/// Common function words excluded from subject comparison.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "at", "in", "on", "to", "of",
    "for", "and", "or", "it", "this", "that", "with", "by", "as", "has", "have", "had", "not",
    "but", "from", "into", "up", "down", "out", "over", "under", "then", "so", "my", "your",
    "our", "their", "we", "you", "i", "they", "he", "she",
];

/// Split content into subject tokens (what it talks about) and value tokens
/// (the stated paths, numbers, URLs).
fn extract_attributes(text: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut subjects = BTreeSet::new();
    let mut values = BTreeSet::new();

    for raw in text.to_lowercase().split_whitespace() {
        let token = trim_token(raw);
        if token.is_empty() {
            continue;
        }
        let is_value = token.contains('/')
            || token.starts_with("http")
            || token.chars().any(|c| c.is_ascii_digit());
        if is_value {
            values.insert(token.to_string());
        } else if !STOPWORDS.contains(&token) {
            subjects.insert(token.to_string());
        }
    }

    (subjects, values)
}

/// Same subject, different stated values.
fn contradicts(a: &str, b: &str, min_subject_overlap: f32) -> bool {
    let (subjects_a, values_a) = extract_attributes(a);
    let (subjects_b, values_b) = extract_attributes(b);

    if values_a.is_empty() && values_b.is_empty() {
        return false;
    }

    let intersection = subjects_a.intersection(&subjects_b).count();
    let union = subjects_a.union(&subjects_b).count();
    if union == 0 {
        return false;
    }
    let overlap = intersection as f32 / union as f32;

    overlap >= min_subject_overlap && values_a != values_b
}

/// Cosine similarity between two embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, content: &str, category: Category) -> MemoryRecord {
        MemoryRecord {
            id,
            content: content.to_string(),
            category,
            tier: crate::types::Tier::Working,
            confidence: 0.8,
            created_at: Utc::now(),
            last_accessed_at: Utc::now(),
            access_count: 0,
            supersedes: None,
            superseded_by: None,
            has_embedding: true,
            metadata: serde_json::Map::new(),
        }
    }

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(ConflictConfig::default())
    }

    #[test]
    fn test_accept_with_no_neighbors() {
        let r = resolver();
        let candidate = ConflictCandidate {
            content: "anything",
            category: Category::Fact,
            embedding: None,
        };
        assert_eq!(r.resolve(&candidate, &[]), ConflictDecision::Accept);
    }

    #[test]
    fn test_verbatim_duplicate_merges() {
        let r = resolver();
        let neighbors = vec![Neighbor {
            record: record(1, "The standup is at 9am daily", Category::Fact),
            embedding: None,
        }];
        let candidate = ConflictCandidate {
            content: "The standup is at 9am daily",
            category: Category::Fact,
            embedding: None,
        };
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Merge(1));
    }

    #[test]
    fn test_near_duplicate_merges_despite_punctuation() {
        let r = resolver();
        let neighbors = vec![Neighbor {
            record: record(1, "the standup is at 9am daily.", Category::Fact),
            embedding: None,
        }];
        let candidate = ConflictCandidate {
            content: "The standup is at 9am, daily",
            category: Category::Fact,
            embedding: None,
        };
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Merge(1));
    }

    #[test]
    fn test_contradicting_fact_supersedes() {
        let r = resolver();
        // Same topic (high cosine), same subject, different path value
        let neighbors = vec![Neighbor {
            record: record(7, "The deploy script is at /opt/deploy.sh", Category::Fact),
            embedding: Some(vec![1.0, 0.0, 0.1, 0.0]),
        }];
        let candidate = ConflictCandidate {
            content: "The deploy script is at /usr/local/deploy.sh",
            category: Category::Fact,
            embedding: Some(&[0.95, 0.05, 0.1, 0.0]),
        };
        assert_eq!(
            r.resolve(&candidate, &neighbors),
            ConflictDecision::Supersede(7)
        );
    }

    #[test]
    fn test_low_similarity_facts_both_accepted() {
        let r = resolver();
        // Low cosine: different topic despite the shared word
        let neighbors = vec![Neighbor {
            record: record(3, "Python is a programming language", Category::Fact),
            embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        }];
        let candidate = ConflictCandidate {
            content: "Python is a snake",
            category: Category::Fact,
            embedding: Some(&[0.3, 0.9, 0.0, 0.0]),
        };
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Accept);
    }

    #[test]
    fn test_contradiction_requires_fact_like_category() {
        let r = resolver();
        // Same shape as the supersede case, but conversation category
        let neighbors = vec![Neighbor {
            record: record(
                4,
                "we said the demo is at /opt/demo.sh",
                Category::Conversation,
            ),
            embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        }];
        let candidate = ConflictCandidate {
            content: "we said the demo is at /usr/demo.sh",
            category: Category::Conversation,
            embedding: Some(&[0.99, 0.01, 0.0, 0.0]),
        };
        // High similarity without the fact-like path lands on Flag
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Flag);
    }

    #[test]
    fn test_ambiguous_overlap_flags_without_embeddings() {
        let r = resolver();
        let neighbors = vec![Neighbor {
            record: record(5, "the review meeting moved to thursday afternoon", Category::Event),
            embedding: None,
        }];
        let candidate = ConflictCandidate {
            content: "the review meeting moved to thursday morning",
            category: Category::Event,
            embedding: None,
        };
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Flag);
    }

    #[test]
    fn test_merge_wins_over_supersede() {
        let r = resolver();
        // A verbatim duplicate also extracts identical values, so level 1
        // must claim it before level 2 ever runs
        let neighbors = vec![Neighbor {
            record: record(9, "The deploy script is at /opt/deploy.sh", Category::Fact),
            embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        }];
        let candidate = ConflictCandidate {
            content: "The deploy script is at /opt/deploy.sh",
            category: Category::Fact,
            embedding: Some(&[1.0, 0.0, 0.0, 0.0]),
        };
        assert_eq!(r.resolve(&candidate, &neighbors), ConflictDecision::Merge(9));
    }

    #[test]
    fn test_extract_attributes_splits_subjects_and_values() {
        let (subjects, values) = extract_attributes("The deploy script is at /opt/deploy.sh");
        assert!(subjects.contains("deploy"));
        assert!(subjects.contains("script"));
        assert!(values.contains("/opt/deploy.sh"));
        assert!(!subjects.contains("the"));
    }

    #[test]
    fn test_contradicts_same_subject_different_value() {
        assert!(contradicts(
            "The deploy script is at /opt/deploy.sh",
            "The deploy script is at /usr/local/deploy.sh",
            0.6
        ));
        // No values on either side: nothing to contradict
        assert!(!contradicts(
            "Python is a programming language",
            "Python is a snake",
            0.6
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
