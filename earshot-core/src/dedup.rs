//! Cross-provider candidate deduplication
//!
//! Candidates from different providers often describe the same recording.
//! They are merged under a canonical key; an audio-retrievable candidate is
//! always preferred over a metadata-only one regardless of score, otherwise
//! the higher confidence wins.

use crate::models::SourceCandidate;
use crate::scorer::normalize_text;
use std::collections::HashMap;

/// Canonical identity used for cross-provider merging.
pub fn canonical_key(candidate: &SourceCandidate) -> (String, String) {
    let title = normalize_text(&candidate.title);
    let artist = candidate
        .artist_guess
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();
    (title, artist)
}

/// True when `incoming` should replace the current `holder` for a shared key.
fn replaces(holder: &SourceCandidate, incoming: &SourceCandidate) -> bool {
    let holder_retrievable = holder.source_type.is_retrievable();
    let incoming_retrievable = incoming.source_type.is_retrievable();

    if incoming_retrievable && !holder_retrievable {
        return true;
    }
    // A retrievable holder never yields to metadata-only purely on score.
    if holder_retrievable && !incoming_retrievable {
        return false;
    }
    incoming.confidence > holder.confidence
}

/// Merge duplicates candidate-by-candidate in aggregation order, preserving
/// first-seen key order in the output.
pub fn dedupe_candidates(candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut kept: HashMap<(String, String), SourceCandidate> = HashMap::new();

    for incoming in candidates {
        let key = canonical_key(&incoming);
        match kept.get(&key) {
            Some(holder) => {
                if replaces(holder, &incoming) {
                    kept.insert(key, incoming);
                }
            }
            None => {
                order.push(key.clone());
                kept.insert(key, incoming);
            }
        }
    }

    order.into_iter().filter_map(|key| kept.remove(&key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provider, SourceType};
    use serde_json::Value;

    fn candidate(
        provider: Provider,
        source_type: SourceType,
        id: &str,
        title: &str,
        artist: Option<&str>,
        confidence: f64,
    ) -> SourceCandidate {
        SourceCandidate {
            provider,
            source_type,
            source_id: id.to_string(),
            title: title.to_string(),
            artist_guess: artist.map(String::from),
            duration_sec: None,
            url: None,
            confidence,
            raw: Value::Null,
        }
    }

    #[test]
    fn retrievable_survives_higher_scored_metadata_duplicate() {
        let retrievable = candidate(
            Provider::Ytdlp,
            SourceType::AudioRetrievable,
            "yt1",
            "De Repente Lembrei de Você",
            Some("Ulisses Rocha"),
            0.7,
        );
        let metadata = candidate(
            Provider::Spotify,
            SourceType::MetadataOnly,
            "sp1",
            "De Repente Lembrei de Voce",
            Some("Ulisses Rocha"),
            0.9,
        );

        let out = dedupe_candidates(vec![retrievable.clone(), metadata.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "yt1");

        // Order-independent: metadata first, retrievable replaces it.
        let out = dedupe_candidates(vec![metadata, retrievable]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "yt1");
    }

    #[test]
    fn higher_confidence_wins_within_same_source_type() {
        let low = candidate(Provider::Spotify, SourceType::MetadataOnly, "a", "Song", None, 0.4);
        let high = candidate(Provider::Musicbrainz, SourceType::MetadataOnly, "b", "Song", None, 0.8);
        let out = dedupe_candidates(vec![low, high]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "b");
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "1", "Alpha", Some("X"), 0.9),
            candidate(Provider::Spotify, SourceType::MetadataOnly, "2", "Alpha", Some("X"), 0.95),
            candidate(Provider::Musicbrainz, SourceType::MetadataOnly, "3", "Beta", None, 0.5),
        ];
        let once = dedupe_candidates(input);
        let twice = dedupe_candidates(once.clone());
        let once_ids: Vec<_> = once.iter().map(|c| c.source_id.clone()).collect();
        let twice_ids: Vec<_> = twice.iter().map(|c| c.source_id.clone()).collect();
        assert_eq!(once_ids, twice_ids);
    }

    #[test]
    fn distinct_artists_are_not_merged() {
        let a = candidate(Provider::Spotify, SourceType::MetadataOnly, "a", "Song", Some("Artist A"), 0.5);
        let b = candidate(Provider::Spotify, SourceType::MetadataOnly, "b", "Song", Some("Artist B"), 0.5);
        let out = dedupe_candidates(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn first_seen_order_is_preserved() {
        let a = candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "1", "First", None, 0.2);
        let b = candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "2", "Second", None, 0.9);
        let out = dedupe_candidates(vec![a, b]);
        assert_eq!(out[0].source_id, "1");
        assert_eq!(out[1].source_id, "2");
    }
}
