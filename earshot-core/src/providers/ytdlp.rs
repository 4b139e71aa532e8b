//! yt-dlp search adapter
//!
//! Runs the yt-dlp binary in search mode and parses its single-JSON dump.
//! Candidates are audio-retrievable: their watch URLs feed the retrieval
//! fallback chain.

use super::{sort_by_confidence, ProviderAdapter};
use crate::error::{DiscoveryError, DiscoveryErrorKind};
use crate::models::{Provider, SourceCandidate, SourceType};
use crate::scorer::{score_candidate, RankingWeights};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

const YTDLP_BINARY: &str = "yt-dlp";

pub struct YtdlpProvider {
    weights: RankingWeights,
    binary: String,
}

impl YtdlpProvider {
    pub fn new(weights: RankingWeights) -> Self {
        Self {
            weights,
            binary: YTDLP_BINARY.to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for YtdlpProvider {
    fn provider(&self) -> Provider {
        Provider::Ytdlp
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
        let search_expr = format!("ytsearch{}:{}", max_results, query);

        tracing::debug!(query = %query, expr = %search_expr, "Running yt-dlp search");

        let output = Command::new(&self.binary)
            .args(["--dump-single-json", "--skip-download", &search_expr])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DiscoveryError::provider(
                        DiscoveryErrorKind::ProviderBinaryMissing,
                        Provider::Ytdlp,
                        "yt-dlp is not installed or not on PATH (install yt-dlp to enable binary search)",
                    )
                } else {
                    DiscoveryError::provider(
                        DiscoveryErrorKind::ProviderQueryFailed,
                        Provider::Ytdlp,
                        format!("failed to spawn yt-dlp: {}", e),
                    )
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryError::provider(
                DiscoveryErrorKind::ProviderQueryFailed,
                Provider::Ytdlp,
                format!("yt-dlp search failed: {}", stderr.trim()),
            ));
        }

        let payload: Value = serde_json::from_slice(&output.stdout).map_err(|_| {
            DiscoveryError::provider(
                DiscoveryErrorKind::ProviderBadResponse,
                Provider::Ytdlp,
                "yt-dlp returned malformed JSON",
            )
        })?;

        Ok(parse_search_payload(query, &payload, &self.weights))
    }
}

/// Map a yt-dlp search dump into scored candidates.
pub(crate) fn parse_search_payload(
    query: &str,
    payload: &Value,
    weights: &RankingWeights,
) -> Vec<SourceCandidate> {
    let entries = payload
        .get("entries")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut candidates = Vec::with_capacity(entries.len());
    for item in entries {
        let Some(video_id) = item.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
        else {
            continue;
        };
        let title = item
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown title")
            .to_string();
        let uploader = item
            .get("uploader")
            .or_else(|| item.get("channel"))
            .and_then(Value::as_str)
            .map(String::from);
        let duration_sec = item.get("duration").and_then(Value::as_f64).map(|d| d as u64);
        let url = item
            .get("webpage_url")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", video_id));

        let confidence =
            score_candidate(query, &title, uploader.as_deref(), duration_sec, weights);
        candidates.push(SourceCandidate {
            provider: Provider::Ytdlp,
            source_type: SourceType::AudioRetrievable,
            source_id: video_id.to_string(),
            title,
            artist_guess: uploader,
            duration_sec,
            url: Some(url),
            confidence,
            raw: item,
        });
    }

    sort_by_confidence(&mut candidates);
    candidates
}
