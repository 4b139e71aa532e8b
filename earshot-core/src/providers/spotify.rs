//! Spotify catalog search adapter
//!
//! Client-credentials token flow followed by a track search. Candidates are
//! metadata-only: Spotify contributes catalog fields (ISRC, album, release
//! date, popularity), never retrievable audio.

use super::{env_non_empty, sort_by_confidence, ProviderAdapter, USER_AGENT};
use crate::config::SpotifyConfig;
use crate::error::{DiscoveryError, DiscoveryErrorKind};
use crate::models::{Provider, SourceCandidate, SourceType};
use crate::scorer::{score_candidate, RankingWeights};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

pub struct SpotifyProvider {
    config: SpotifyConfig,
    weights: RankingWeights,
    client: reqwest::Client,
}

impl SpotifyProvider {
    pub fn new(config: SpotifyConfig, weights: RankingWeights) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Spotify,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            config,
            weights,
            client,
        })
    }

    /// App token via the client-credentials grant.
    async fn app_token(&self) -> Result<String, DiscoveryError> {
        let client_id = env_non_empty(&self.config.client_id_env);
        let client_secret = env_non_empty(&self.config.client_secret_env);
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::AuthMissing,
                Provider::Spotify,
                format!(
                    "set {} and {} to enable the Spotify provider",
                    self.config.client_id_env, self.config.client_secret_env
                ),
            ));
        };

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Spotify,
                    format!("token request failed: {}", e),
                )
            })?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::AuthFailed,
                Provider::Spotify,
                format!("token request rejected with status {}", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::Spotify,
                format!("token request failed with status {}", status.as_u16()),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::Spotify,
                format!("malformed token response: {}", e),
            )
        })?;

        payload
            .get("access_token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::AuthFailed,
                    Provider::Spotify,
                    "missing access_token in token response",
                )
            })
    }
}

#[async_trait]
impl ProviderAdapter for SpotifyProvider {
    fn provider(&self) -> Provider {
        Provider::Spotify
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
        let token = self.app_token().await?;

        let limit = max_results.to_string();
        let response = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("type", "track"),
                ("limit", limit.as_str()),
                ("market", self.config.market.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Spotify,
                    format!("search request failed: {}", e),
                )
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::RateLimited,
                Provider::Spotify,
                format!("rate-limited by Spotify (Retry-After: {}s)", retry_after),
            ));
        }
        if status.as_u16() == 401 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::AuthFailed,
                Provider::Spotify,
                "search token was rejected",
            ));
        }
        if !status.is_success() {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::Spotify,
                format!("search request failed with status {}", status.as_u16()),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::Spotify,
                format!("malformed search response: {}", e),
            )
        })?;

        Ok(parse_track_payload(query, &payload, &self.weights))
    }
}

/// Map a Spotify track search response into scored candidates.
pub(crate) fn parse_track_payload(
    query: &str,
    payload: &Value,
    weights: &RankingWeights,
) -> Vec<SourceCandidate> {
    let items = payload
        .get("tracks")
        .and_then(|t| t.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let Some(track_id) = item.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
        else {
            continue;
        };
        let title = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown title")
            .to_string();
        let artist = item
            .get("artists")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .map(String::from);
        let duration_sec = item
            .get("duration_ms")
            .and_then(Value::as_u64)
            .map(|ms| ms / 1000);
        let url = item
            .get("external_urls")
            .and_then(|u| u.get("spotify"))
            .and_then(Value::as_str)
            .map(String::from);

        let confidence = score_candidate(query, &title, artist.as_deref(), duration_sec, weights);
        candidates.push(SourceCandidate {
            provider: Provider::Spotify,
            source_type: SourceType::MetadataOnly,
            source_id: track_id.to_string(),
            title,
            artist_guess: artist,
            duration_sec,
            url,
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
    fn parses_tracks_into_metadata_candidates() {
        let payload = json!({
            "tracks": {
                "items": [
                    {
                        "id": "sp1",
                        "name": "Good News",
                        "artists": [{"name": "Mac Miller"}],
                        "duration_ms": 332000,
                        "external_urls": {"spotify": "https://open.spotify.com/track/sp1"},
                    }
                ]
            }
        });
        let out = parse_track_payload("Mac Miller Good News", &payload, &RankingWeights::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].provider, Provider::Spotify);
        assert_eq!(out[0].source_type, SourceType::MetadataOnly);
        assert_eq!(out[0].duration_sec, Some(332));
        assert_eq!(out[0].artist_guess.as_deref(), Some("Mac Miller"));
    }

    #[test]
    fn tracks_without_id_are_skipped() {
        let payload = json!({"tracks": {"items": [{"name": "No id"}]}});
        let out = parse_track_payload("q", &payload, &RankingWeights::default());
        assert!(out.is_empty());
    }
}
