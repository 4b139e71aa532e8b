//! Jamendo licensed-audio search adapter
//!
//! Jamendo tracks expose direct audio URLs under a permissive license, so
//! its candidates are audio-retrievable through plain HTTP download.

use super::{env_non_empty, sort_by_confidence, ProviderAdapter, USER_AGENT};
use crate::config::JamendoConfig;
use crate::error::{DiscoveryError, DiscoveryErrorKind};
use crate::models::{Provider, SourceCandidate, SourceType};
use crate::scorer::{score_candidate, RankingWeights};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const TRACKS_URL: &str = "https://api.jamendo.com/v3.0/tracks/";

pub struct JamendoProvider {
    config: JamendoConfig,
    weights: RankingWeights,
    client: reqwest::Client,
}

impl JamendoProvider {
    pub fn new(
        config: JamendoConfig,
        weights: RankingWeights,
        timeout_sec: u64,
    ) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Jamendo,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            config,
            weights,
            client,
        })
    }
}

#[async_trait]
impl ProviderAdapter for JamendoProvider {
    fn provider(&self) -> Provider {
        Provider::Jamendo
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
        let client_id = env_non_empty(&self.config.client_id_env).ok_or_else(|| {
            DiscoveryError::provider(
                DiscoveryErrorKind::AuthMissing,
                Provider::Jamendo,
                format!(
                    "set {} to enable the Jamendo provider",
                    self.config.client_id_env
                ),
            )
        })?;

        let limit = max_results.to_string();
        let response = self
            .client
            .get(TRACKS_URL)
            .query(&[
                ("client_id", client_id.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("search", query),
            ])
            .send()
            .await
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Jamendo,
                    format!("track search failed: {}", e),
                )
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::AuthFailed,
                Provider::Jamendo,
                format!("client id rejected with status {}", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::Jamendo,
                format!("track search failed with status {}", status.as_u16()),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::Jamendo,
                format!("malformed track response: {}", e),
            )
        })?;

        Ok(parse_track_payload(query, &payload, &self.weights))
    }
}

/// Map a Jamendo track listing into scored candidates.
pub(crate) fn parse_track_payload(
    query: &str,
    payload: &Value,
    weights: &RankingWeights,
) -> Vec<SourceCandidate> {
    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut candidates = Vec::with_capacity(results.len());
    for item in results {
        let Some(track_id) = item
            .get("id")
            .and_then(|id| id.as_str().map(String::from).or_else(|| id.as_u64().map(|n| n.to_string())))
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let title = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown title")
            .to_string();
        let artist = item
            .get("artist_name")
            .and_then(Value::as_str)
            .map(String::from);
        let duration_sec = item.get("duration").and_then(Value::as_u64);
        let audio_url = item
            .get("audio")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let source_type = if audio_url.is_some() {
            SourceType::AudioRetrievable
        } else {
            SourceType::MetadataOnly
        };
        let confidence = score_candidate(query, &title, artist.as_deref(), duration_sec, weights);
        candidates.push(SourceCandidate {
            provider: Provider::Jamendo,
            source_type,
            source_id: track_id,
            title,
            artist_guess: artist,
            duration_sec,
            url: audio_url,
            confidence,
            raw: item,
        });
    }

    sort_by_confidence(&mut candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tracks_with_audio_url_are_retrievable() {
        let payload = json!({
            "results": [
                {
                    "id": "j1",
                    "name": "Song",
                    "artist_name": "Artist",
                    "duration": 210,
                    "audio": "https://prod-1.storage.jamendo.com/audio.mp3",
                }
            ]
        });
        let out = parse_track_payload("Artist Song", &payload, &RankingWeights::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].provider, Provider::Jamendo);
        assert!(out[0].source_type.is_retrievable());
        assert_eq!(out[0].url.as_deref(), Some("https://prod-1.storage.jamendo.com/audio.mp3"));
    }

    #[test]
    fn tracks_without_audio_url_degrade_to_metadata_only() {
        let payload = json!({
            "results": [{"id": 7, "name": "Song", "artist_name": "Artist", "audio": ""}]
        });
        let out = parse_track_payload("q", &payload, &RankingWeights::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_type, SourceType::MetadataOnly);
        assert_eq!(out[0].source_id, "7");
        assert!(out[0].url.is_none());
    }
}
