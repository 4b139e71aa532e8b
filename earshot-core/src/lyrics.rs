//! Lyrics collaborator
//!
//! Best-effort lyric fetching from LRCLIB with an optional ASR fallback.
//! Lyrics never fail a listen call: every failure path yields an empty
//! artifact carrying a warning code.

use crate::cache::CacheStore;
use crate::config::LyricsConfig;
use crate::models::{AudioArtifact, LyricsArtifact, LyricsOrigin, SourceCandidate};
use crate::scorer::sequence_similarity;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

const SEARCH_URL: &str = "https://lrclib.net/api/search";
const ASR_BINARY: &str = "whisper";

/// Candidate score weights: title similarity dominates, artist supports,
/// duration delta (over a 45 s window) tie-breaks.
const TITLE_WEIGHT: f64 = 0.55;
const ARTIST_WEIGHT: f64 = 0.30;
const DURATION_WEIGHT: f64 = 0.15;
const DURATION_WINDOW_SEC: f64 = 45.0;

/// Boundary for the lyrics collaborator.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    async fn fetch(
        &self,
        source: &SourceCandidate,
        audio: Option<&AudioArtifact>,
        cache: &CacheStore,
    ) -> LyricsArtifact;
}

/// Default implementation backed by LRCLIB search.
pub struct LrclibLyrics {
    config: LyricsConfig,
    client: Option<reqwest::Client>,
}

impl LrclibLyrics {
    pub fn new(config: LyricsConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::providers::USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()
            .ok();
        Self { config, client }
    }

    async fn search_lrclib(&self, source: &SourceCandidate) -> LyricsArtifact {
        let Some(client) = &self.client else {
            return LyricsArtifact::unavailable("LYRICS_CLIENT_UNAVAILABLE");
        };

        let artist = source.artist_guess.clone().unwrap_or_default();
        let param_sets: Vec<Vec<(&str, String)>> = vec![
            vec![
                ("track_name", source.title.clone()),
                ("artist_name", artist.clone()),
            ],
            vec![("track_name", source.title.clone())],
        ];

        let mut scored: Vec<(f64, Value)> = Vec::new();
        for params in param_sets {
            let response = match client.get(SEARCH_URL).query(&params).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(error = %e, "LRCLIB search request failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            let Ok(items) = response.json::<Value>().await else {
                continue;
            };
            let Some(list) = items.as_array() else {
                continue;
            };
            for item in list {
                if !item.is_object() {
                    continue;
                }
                let score = candidate_score(source, item);
                scored.push((score, item.clone()));
            }
            if !scored.is_empty() {
                break;
            }
        }

        let Some((best_score, best)) = scored
            .into_iter()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        else {
            return LyricsArtifact::unavailable("LYRICS_NOT_FOUND");
        };

        let (text, is_synced) = extract_lyrics_text(&best);
        let Some(text) = text else {
            return LyricsArtifact::unavailable("LYRICS_EMPTY_PAYLOAD");
        };

        LyricsArtifact {
            source: LyricsOrigin::Lrclib,
            text: Some(text),
            language: best
                .get("lang")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
            is_synced,
            provider_confidence: Some(round4(best_score)),
            warnings: Vec::new(),
        }
    }

    /// Transcribe locally with an ASR CLI. Only reached when LRCLIB came up
    /// empty and the fallback is enabled.
    async fn transcribe(&self, audio: &AudioArtifact) -> LyricsArtifact {
        let out_dir = std::env::temp_dir().join("earshot-asr");
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            tracing::debug!(error = %e, "Cannot create ASR output directory");
            return LyricsArtifact::unavailable("LYRICS_ASR_FAILED");
        }

        let run = Command::new(ASR_BINARY)
            .arg(&audio.path)
            .args(["--model", &self.config.asr_model_size])
            .args(["--output_format", "txt"])
            .arg("--output_dir")
            .arg(&out_dir)
            .output()
            .await;

        let output = match run {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return LyricsArtifact::unavailable("LYRICS_ASR_UNAVAILABLE");
            }
            Err(_) => return LyricsArtifact::unavailable("LYRICS_ASR_FAILED"),
        };
        if !output.status.success() {
            return LyricsArtifact::unavailable("LYRICS_ASR_FAILED");
        }

        let stem = std::path::Path::new(&audio.path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let transcript_path = out_dir.join(format!("{}.txt", stem));
        let text = std::fs::read_to_string(&transcript_path)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return LyricsArtifact::unavailable("LYRICS_ASR_EMPTY");
        }

        LyricsArtifact {
            source: LyricsOrigin::Asr,
            text: Some(text),
            language: None,
            is_synced: false,
            provider_confidence: None,
            warnings: Vec::new(),
        }
    }
}

#[async_trait]
impl LyricsSource for LrclibLyrics {
    async fn fetch(
        &self,
        source: &SourceCandidate,
        audio: Option<&AudioArtifact>,
        cache: &CacheStore,
    ) -> LyricsArtifact {
        if !self.config.enabled {
            return LyricsArtifact::unavailable("LYRICS_DISABLED");
        }

        let source_key = CacheStore::normalize_key(&format!(
            "{}:{}:lyrics",
            source.provider, source.source_id
        ));
        if self.config.include_in_cache {
            if let Ok(Some(payload)) = cache.get_lyrics(&source_key).await {
                if let Ok(cached) = serde_json::from_str::<LyricsArtifact>(&payload) {
                    tracing::debug!(source_key = %source_key, "Lyrics cache hit");
                    return cached;
                }
            }
        }

        let mut lyrics = self.search_lrclib(source).await;
        lyrics = apply_text_bounds(lyrics, self.config.min_text_chars, self.config.max_chars);

        if lyrics.text.is_none() && self.config.allow_asr_fallback {
            if let Some(audio) = audio {
                lyrics = self.transcribe(audio).await;
                lyrics =
                    apply_text_bounds(lyrics, self.config.min_text_chars, self.config.max_chars);
            }
        }

        if self.config.include_in_cache {
            match serde_json::to_string(&lyrics) {
                Ok(payload) => {
                    if let Err(e) = cache.put_lyrics(&source_key, &payload).await {
                        tracing::warn!(error = %e, "Failed to cache lyrics artifact");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize lyrics artifact"),
            }
        }

        lyrics
    }
}

/// Enforce min/max text bounds; too-short texts become an empty artifact.
fn apply_text_bounds(mut lyrics: LyricsArtifact, min_chars: usize, max_chars: usize) -> LyricsArtifact {
    if let Some(text) = lyrics.text.take() {
        let bounded: String = text.chars().take(max_chars).collect();
        if bounded.chars().count() < min_chars {
            return LyricsArtifact::unavailable("LYRICS_TOO_SHORT");
        }
        lyrics.text = Some(bounded);
    }
    lyrics
}

/// Match score between the selected source and one LRCLIB row.
fn candidate_score(source: &SourceCandidate, item: &Value) -> f64 {
    let norm = |v: Option<&str>| v.unwrap_or("").trim().to_lowercase();

    let title_score = sequence_similarity(
        &norm(Some(source.title.as_str())),
        &norm(item.get("trackName").and_then(Value::as_str)),
    );

    let artist_score = match (
        source.artist_guess.as_deref(),
        item.get("artistName").and_then(Value::as_str),
    ) {
        (Some(a), Some(b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            sequence_similarity(&norm(Some(a)), &norm(Some(b)))
        }
        _ => 0.0,
    };

    let duration_score = match (source.duration_sec, item.get("duration").and_then(Value::as_f64)) {
        (Some(ours), Some(theirs)) => {
            let delta = (ours as f64 - theirs).abs();
            (1.0 - delta / DURATION_WINDOW_SEC).max(0.0)
        }
        _ => 0.5,
    };

    TITLE_WEIGHT * title_score + ARTIST_WEIGHT * artist_score + DURATION_WEIGHT * duration_score
}

/// Prefer synced lyrics over plain.
fn extract_lyrics_text(item: &Value) -> (Option<String>, bool) {
    if let Some(synced) = item
        .get("syncedLyrics")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return (Some(synced.to_string()), true);
    }
    if let Some(plain) = item
        .get("plainLyrics")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return (Some(plain.to_string()), false);
    }
    (None, false)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
