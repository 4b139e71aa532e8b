//! YouTube Data API v3 search adapter
//!
//! Browser-API-backed search used when the binary search tool is missing or
//! rate-limited. Requires `YOUTUBE_API_KEY`; a missing key is a typed
//! `AUTH_MISSING` error so the provider trace explains the gap.

use super::{env_non_empty, sort_by_confidence, ProviderAdapter, USER_AGENT};
use crate::error::{DiscoveryError, DiscoveryErrorKind};
use crate::models::{Provider, SourceCandidate, SourceType};
use crate::scorer::{score_candidate, RankingWeights};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

pub struct YoutubeApiProvider {
    weights: RankingWeights,
    client: reqwest::Client,
}

impl YoutubeApiProvider {
    pub fn new(weights: RankingWeights, timeout_sec: u64) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::YoutubeApi,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self { weights, client })
    }
}

#[async_trait]
impl ProviderAdapter for YoutubeApiProvider {
    fn provider(&self) -> Provider {
        Provider::YoutubeApi
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
        let api_key = env_non_empty(API_KEY_ENV).ok_or_else(|| {
            DiscoveryError::provider(
                DiscoveryErrorKind::AuthMissing,
                Provider::YoutubeApi,
                format!("set {} to enable the YouTube Data API provider", API_KEY_ENV),
            )
        })?;

        let max = max_results.to_string();
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", max.as_str()),
                ("type", "video"),
                ("key", api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::YoutubeApi,
                    format!("search request failed: {}", e),
                )
            })?;

        let status = response.status();
        if status.as_u16() == 403 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::AuthFailed,
                Provider::YoutubeApi,
                format!("{} was rejected by the YouTube Data API", API_KEY_ENV),
            ));
        }
        if status.as_u16() == 429 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::RateLimited,
                Provider::YoutubeApi,
                "rate-limited by the YouTube Data API",
            ));
        }
        if !status.is_success() {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::YoutubeApi,
                format!("search request failed with status {}", status.as_u16()),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::YoutubeApi,
                format!("malformed search response: {}", e),
            )
        })?;

        Ok(parse_search_payload(query, &payload, &self.weights))
    }
}

/// Map a Data API search response into scored candidates.
pub(crate) fn parse_search_payload(
    query: &str,
    payload: &Value,
    weights: &RankingWeights,
) -> Vec<SourceCandidate> {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let Some(video_id) = item
            .get("id")
            .and_then(|id| id.get("videoId"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let snippet = item.get("snippet").cloned().unwrap_or(Value::Null);
        let title = snippet
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown title")
            .to_string();
        let channel = snippet
            .get("channelTitle")
            .and_then(Value::as_str)
            .map(String::from);

        let confidence = score_candidate(query, &title, channel.as_deref(), None, weights);
        candidates.push(SourceCandidate {
            provider: Provider::YoutubeApi,
            source_type: SourceType::AudioRetrievable,
            source_id: video_id.to_string(),
            title,
            artist_guess: channel,
            duration_sec: None,
            url: Some(format!("https://www.youtube.com/watch?v={}", video_id)),
            confidence,
            raw: item,
        });
    }

    sort_by_confidence(&mut candidates);
    candidates
}
