//! Candidate ranking
//!
//! Computes a weighted composite match score between a free-text query and a
//! candidate. Text is folded (diacritics removed), lower-cased, and
//! punctuation-collapsed before comparison, so scoring is accent-insensitive.

use serde::Deserialize;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Accepted track length window in seconds. Durations inside score full
/// marks; outside (or absent) score neutral.
const DURATION_SANE_MIN: u64 = 60;
const DURATION_SANE_MAX: u64 = 720;

/// Weight set for the composite score. Weights are re-normalized to sum to
/// one; a non-positive (or partially negative) configuration falls back to
/// the defaults instead of erroring.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub title_similarity: f64,
    pub title_token_overlap: f64,
    pub artist_similarity: f64,
    pub duration_sanity: f64,
    pub containment_bonus: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            title_similarity: 0.36,
            title_token_overlap: 0.30,
            artist_similarity: 0.18,
            duration_sanity: 0.10,
            containment_bonus: 0.06,
        }
    }
}

impl RankingWeights {
    fn sum(&self) -> f64 {
        self.title_similarity
            + self.title_token_overlap
            + self.artist_similarity
            + self.duration_sanity
            + self.containment_bonus
    }

    fn any_negative(&self) -> bool {
        self.title_similarity < 0.0
            || self.title_token_overlap < 0.0
            || self.artist_similarity < 0.0
            || self.duration_sanity < 0.0
            || self.containment_bonus < 0.0
    }

    /// Normalized weight set, falling back to defaults when the configured
    /// values cannot be normalized.
    pub fn resolved(&self) -> RankingWeights {
        let base = if self.any_negative() || !(self.sum() > 0.0) {
            RankingWeights::default()
        } else {
            *self
        };
        let sum = base.sum();
        RankingWeights {
            title_similarity: base.title_similarity / sum,
            title_token_overlap: base.title_token_overlap / sum,
            artist_similarity: base.artist_similarity / sum,
            duration_sanity: base.duration_sanity / sum,
            containment_bonus: base.containment_bonus / sum,
        }
    }
}

/// Remove diacritics by NFD decomposition and dropping combining marks.
pub fn fold_accents(value: &str) -> String {
    value.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Fold, lowercase, collapse punctuation to whitespace, and squeeze runs of
/// whitespace to single spaces.
pub fn normalize_text(value: &str) -> String {
    let folded = fold_accents(value).to_lowercase();
    let mapped: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-level sequence similarity ratio in [0,1].
pub fn sequence_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

fn token_set(value: &str) -> HashSet<&str> {
    value.split_whitespace().collect()
}

/// `|query_tokens ∩ other_tokens| / |query_tokens|`, zero for an empty query.
fn token_overlap(query_tokens: &HashSet<&str>, other: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let other_tokens = token_set(other);
    let shared = query_tokens.intersection(&other_tokens).count();
    shared as f64 / query_tokens.len() as f64
}

/// Composite match score between a query and a candidate, clamped to [0,1].
pub fn score_candidate(
    query: &str,
    title: &str,
    artist_guess: Option<&str>,
    duration_sec: Option<u64>,
    weights: &RankingWeights,
) -> f64 {
    let w = weights.resolved();
    let query_norm = normalize_text(query);
    let title_norm = normalize_text(title);
    let query_tokens = token_set(&query_norm);

    let title_similarity = sequence_similarity(&query_norm, &title_norm);
    let title_overlap = token_overlap(&query_tokens, &title_norm);

    let artist_similarity = match artist_guess.map(normalize_text) {
        Some(artist) if !artist.is_empty() => {
            let seq = sequence_similarity(&query_norm, &artist);
            let overlap = token_overlap(&query_tokens, &artist);
            seq.max(overlap)
        }
        _ => 0.0,
    };

    let duration_sanity = match duration_sec {
        Some(d) if (DURATION_SANE_MIN..=DURATION_SANE_MAX).contains(&d) => 1.0,
        _ => 0.5,
    };

    let containment = if !query_norm.is_empty()
        && !title_norm.is_empty()
        && (query_norm.contains(&title_norm) || title_norm.contains(&query_norm))
    {
        1.0
    } else {
        0.0
    };

    let score = w.title_similarity * title_similarity
        + w.title_token_overlap * title_overlap
        + w.artist_similarity * artist_similarity
        + w.duration_sanity * duration_sanity
        + w.containment_bonus * containment;

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_weight_sum_falls_back_to_defaults() {
        let zeroed = RankingWeights {
            title_similarity: 0.0,
            title_token_overlap: 0.0,
            artist_similarity: 0.0,
            duration_sanity: 0.0,
            containment_bonus: 0.0,
        };
        let negative = RankingWeights {
            title_similarity: -1.0,
            ..RankingWeights::default()
        };

        let query = "Mac Miller Good News";
        let title = "Mac Miller - Good News";
        let with_defaults =
            score_candidate(query, title, Some("Mac Miller"), Some(332), &RankingWeights::default());
        let with_zeroed = score_candidate(query, title, Some("Mac Miller"), Some(332), &zeroed);
        let with_negative = score_candidate(query, title, Some("Mac Miller"), Some(332), &negative);

        assert!((with_defaults - with_zeroed).abs() < 1e-9);
        assert!((with_defaults - with_negative).abs() < 1e-9);
    }

    #[test]
    fn resolved_weights_sum_to_one() {
        let custom = RankingWeights {
            title_similarity: 2.0,
            title_token_overlap: 1.0,
            artist_similarity: 1.0,
            duration_sanity: 0.5,
            containment_bonus: 0.5,
        };
        let resolved = custom.resolved();
        assert!((resolved.sum() - 1.0).abs() < 1e-9);
        assert!((resolved.title_similarity - 0.4).abs() < 1e-9);
    }

    #[test]
    fn scoring_is_accent_insensitive() {
        let query = "De Repente Lembrei de Voce Ulisses Rocha";
        let with_accent = score_candidate(
            query,
            "De Repente Lembrei de Você",
            Some("Ulisses Rocha"),
            Some(240),
            &RankingWeights::default(),
        );
        let without_accent = score_candidate(
            query,
            "De Repente Lembrei de Voce",
            Some("Ulisses Rocha"),
            Some(240),
            &RankingWeights::default(),
        );
        assert!((with_accent - without_accent).abs() < 0.02);
    }

    #[test]
    fn normalize_collapses_punctuation_and_case() {
        assert_eq!(normalize_text("Mac Miller - Good News!!"), "mac miller good news");
        assert_eq!(normalize_text("  weird   spacing "), "weird spacing");
    }

    #[test]
    fn duration_sanity_window() {
        let weights = RankingWeights {
            title_similarity: 0.0,
            title_token_overlap: 0.0,
            artist_similarity: 0.0,
            duration_sanity: 1.0,
            containment_bonus: 0.0,
        };
        assert!((score_candidate("q", "t", None, Some(60), &weights) - 1.0).abs() < 1e-9);
        assert!((score_candidate("q", "t", None, Some(720), &weights) - 1.0).abs() < 1e-9);
        assert!((score_candidate("q", "t", None, Some(30), &weights) - 0.5).abs() < 1e-9);
        assert!((score_candidate("q", "t", None, None, &weights) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn containment_bonus_applies_both_directions() {
        let weights = RankingWeights {
            title_similarity: 0.0,
            title_token_overlap: 0.0,
            artist_similarity: 0.0,
            duration_sanity: 0.0,
            containment_bonus: 1.0,
        };
        assert!((score_candidate("good news", "Mac Miller - Good News", None, None, &weights) - 1.0).abs() < 1e-9);
        assert!((score_candidate("Mac Miller Good News live", "good news", None, None, &weights) - 1.0).abs() < 1e-9);
        assert!(score_candidate("good news", "bad news", None, None, &weights) < 1e-9);
    }

    #[test]
    fn matching_candidate_outranks_unrelated_one() {
        let weights = RankingWeights::default();
        let query = "Mac Miller Good News";
        let matching = score_candidate(query, "Mac Miller - Good News", Some("Mac Miller"), Some(332), &weights);
        let unrelated = score_candidate(query, "Completely Different Track", Some("Somebody"), Some(200), &weights);
        assert!(matching > unrelated);
    }
}
