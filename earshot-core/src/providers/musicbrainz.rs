//! MusicBrainz recording search adapter
//!
//! Open metadata catalog; candidates are metadata-only but contribute
//! artist credits, release dates and ISRCs. Requests are rate-limited to
//! 1 req/s per the MusicBrainz etiquette rules.

use super::{sort_by_confidence, ProviderAdapter, USER_AGENT};
use crate::error::{DiscoveryError, DiscoveryErrorKind};
use crate::models::{Provider, SourceCandidate, SourceType};
use crate::scorer::{normalize_text, score_candidate, RankingWeights};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2/recording";
const RATE_LIMIT_MS: u64 = 1000; // 1 request per second

/// Rate limiter enforcing a minimum interval between requests.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit.
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("MusicBrainz rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

pub struct MusicbrainzProvider {
    weights: RankingWeights,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl MusicbrainzProvider {
    pub fn new(weights: RankingWeights) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Musicbrainz,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            weights,
            client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }
}

#[async_trait]
impl ProviderAdapter for MusicbrainzProvider {
    fn provider(&self) -> Provider {
        Provider::Musicbrainz
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
        self.rate_limiter.wait().await;

        let limit = max_results.to_string();
        let response = self
            .client
            .get(MUSICBRAINZ_URL)
            .query(&[("query", query), ("fmt", "json"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| {
                DiscoveryError::provider(
                    DiscoveryErrorKind::ProviderQueryFailed,
                    Provider::Musicbrainz,
                    format!("recording search failed: {}", e),
                )
            })?;

        let status = response.status();
        if status.as_u16() == 503 {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::RateLimited,
                Provider::Musicbrainz,
                "rate-limited by MusicBrainz",
            ));
        }
        if !status.is_success() {
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::Musicbrainz,
                format!("recording search failed with status {}", status.as_u16()),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::Musicbrainz,
                format!("malformed recording response: {}", e),
            )
        })?;

        Ok(parse_recording_payload(query, &payload, &self.weights))
    }
}

/// Map a MusicBrainz recording search into scored candidates.
pub(crate) fn parse_recording_payload(
    query: &str,
    payload: &Value,
    weights: &RankingWeights,
) -> Vec<SourceCandidate> {
    let recordings = payload
        .get("recordings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut candidates = Vec::with_capacity(recordings.len());
    for rec in recordings {
        let title = rec
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown title")
            .to_string();
        let artist = rec
            .get("artist-credit")
            .and_then(Value::as_array)
            .and_then(|credits| credits.first())
            .and_then(|credit| {
                credit
                    .get("artist")
                    .and_then(|a| a.get("name"))
                    .or_else(|| credit.get("name"))
            })
            .and_then(Value::as_str)
            .map(String::from);
        let duration_sec = rec.get("length").and_then(Value::as_u64).map(|ms| ms / 1000);
        // Recordings without an MBID get a slug id derived from the title.
        let recording_id = rec
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| normalize_text(&title).replace(' ', "-"));

        let confidence = score_candidate(query, &title, artist.as_deref(), duration_sec, weights);
        candidates.push(SourceCandidate {
            provider: Provider::Musicbrainz,
            source_type: SourceType::MetadataOnly,
            source_id: recording_id,
            title,
            artist_guess: artist,
            duration_sec,
            url: None,
            confidence,
            raw: rec,
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
    fn parses_recordings_into_metadata_candidates() {
        let payload = json!({
            "recordings": [
                {
                    "id": "mbid-1",
                    "title": "Good News",
                    "artist-credit": [{"artist": {"name": "Mac Miller"}}],
                    "length": 332000,
                }
            ]
        });
        let out =
            parse_recording_payload("Mac Miller Good News", &payload, &RankingWeights::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].provider, Provider::Musicbrainz);
        assert_eq!(out[0].source_type, SourceType::MetadataOnly);
        assert_eq!(out[0].source_id, "mbid-1");
        assert_eq!(out[0].duration_sec, Some(332));
        assert!(out[0].url.is_none());
    }

    #[test]
    fn missing_mbid_falls_back_to_title_slug() {
        let payload = json!({"recordings": [{"title": "Some Song"}]});
        let out = parse_recording_payload("q", &payload, &RankingWeights::default());
        assert_eq!(out[0].source_id, "some-song");
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(100);

        let start = Instant::now();
        limiter.wait().await;
        let first_elapsed = start.elapsed();
        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed.as_millis() < 50);
        assert!(second_elapsed.as_millis() >= 100);
    }
}
