//! Normalized catalog metadata
//!
//! Derives a `MetadataArtifact` deterministically from a candidate's raw
//! provider payload. Missing raw fields fall back to the candidate fields.

use crate::models::{MetadataArtifact, Provider, SourceCandidate};
use serde_json::Value;

/// Walk a nested JSON path.
fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    nested(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn u64_at(value: &Value, path: &[&str]) -> Option<u64> {
    nested(value, path).and_then(Value::as_u64)
}

/// Build normalized metadata for a candidate, per provider payload shape.
pub fn metadata_from_candidate(candidate: &SourceCandidate) -> MetadataArtifact {
    let raw = &candidate.raw;
    let mut artifact = MetadataArtifact {
        source: candidate.provider.as_str().to_string(),
        title: candidate.title.clone(),
        artists: candidate
            .artist_guess
            .clone()
            .into_iter()
            .collect(),
        album: None,
        release_date: None,
        isrc: None,
        popularity: None,
        duration_sec: candidate.duration_sec,
    };

    match candidate.provider {
        Provider::Spotify => {
            if let Some(name) = string_at(raw, &["name"]) {
                artifact.title = name;
            }
            if let Some(artists) = raw.get("artists").and_then(Value::as_array) {
                let names: Vec<String> = artists
                    .iter()
                    .filter_map(|a| string_at(a, &["name"]))
                    .collect();
                if !names.is_empty() {
                    artifact.artists = names;
                }
            }
            artifact.album = string_at(raw, &["album", "name"]);
            artifact.release_date = string_at(raw, &["album", "release_date"]);
            artifact.isrc = string_at(raw, &["external_ids", "isrc"]);
            artifact.popularity = u64_at(raw, &["popularity"]).map(|p| p as u32);
            if let Some(ms) = u64_at(raw, &["duration_ms"]) {
                artifact.duration_sec = Some(ms / 1000);
            }
        }
        Provider::Musicbrainz => {
            if let Some(title) = string_at(raw, &["title"]) {
                artifact.title = title;
            }
            if let Some(credits) = raw.get("artist-credit").and_then(Value::as_array) {
                let names: Vec<String> = credits
                    .iter()
                    .filter_map(|c| string_at(c, &["artist", "name"]).or_else(|| string_at(c, &["name"])))
                    .collect();
                if !names.is_empty() {
                    artifact.artists = names;
                }
            }
            if let Some(release) = raw
                .get("releases")
                .and_then(Value::as_array)
                .and_then(|r| r.first())
            {
                artifact.album = string_at(release, &["title"]);
                artifact.release_date = string_at(release, &["date"]);
            }
            artifact.isrc = raw
                .get("isrcs")
                .and_then(Value::as_array)
                .and_then(|list| list.first())
                .and_then(Value::as_str)
                .map(String::from);
            if let Some(ms) = u64_at(raw, &["length"]) {
                artifact.duration_sec = Some(ms / 1000);
            }
        }
        Provider::Jamendo => {
            if let Some(name) = string_at(raw, &["name"]) {
                artifact.title = name;
            }
            if let Some(artist) = string_at(raw, &["artist_name"]) {
                artifact.artists = vec![artist];
            }
            artifact.album = string_at(raw, &["album_name"]);
            artifact.release_date = string_at(raw, &["releasedate"]);
            if let Some(duration) = u64_at(raw, &["duration"]) {
                artifact.duration_sec = Some(duration);
            }
        }
        Provider::Ytdlp | Provider::YoutubeApi => {
            // Upload metadata only; the candidate fields are already the
            // best normalization available.
            if let Some(date) = string_at(raw, &["upload_date"])
                .or_else(|| string_at(raw, &["snippet", "publishedAt"]))
            {
                artifact.release_date = Some(date);
            }
        }
    }

    artifact
}
