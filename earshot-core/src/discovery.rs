//! Discovery coordinator
//!
//! Fans a query out to every configured provider concurrently, records one
//! trace entry per provider (count or error), deduplicates and re-ranks the
//! aggregate, and selects the best candidate. Provider failures are
//! recovered locally; only a fully empty aggregate surfaces as `NOT_FOUND`,
//! with the provider trace and remediation hints embedded in the message.

use crate::cache::CacheStore;
use crate::config::Config;
use crate::dedup::dedupe_candidates;
use crate::error::{CacheError, DiscoveryError, DiscoveryErrorKind, Error};
use crate::models::{DiscoveryResult, Provider, SourceCandidate};
use crate::providers::{disabled_providers, provider_registry, ProviderAdapter};
use crate::scorer::{fold_accents, score_candidate, RankingWeights};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

/// Outcome of one provider's fan-out task.
enum ProviderOutcome {
    /// Candidates after per-provider dedup.
    Found(Vec<SourceCandidate>),
    /// First typed error, plus candidates salvaged from earlier variants.
    Failed(DiscoveryError, Vec<SourceCandidate>),
    /// The per-provider deadline fired.
    TimedOut,
}

pub struct DiscoveryCoordinator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    disabled: Vec<Provider>,
    weights: RankingWeights,
    provider_timeout: Duration,
    aggregate_timeout: Duration,
    max_results: usize,
}

impl DiscoveryCoordinator {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let adapters = provider_registry(config)?;
        Ok(Self::new(
            adapters,
            disabled_providers(config),
            config.discovery.ranking_weights,
            Duration::from_secs(config.discovery.provider_timeout_sec),
            Duration::from_secs(config.discovery.aggregate_timeout_sec),
            config.discovery.max_results,
        ))
    }

    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        disabled: Vec<Provider>,
        weights: RankingWeights,
        provider_timeout: Duration,
        aggregate_timeout: Duration,
        max_results: usize,
    ) -> Self {
        Self {
            adapters,
            disabled,
            weights,
            provider_timeout,
            aggregate_timeout,
            max_results,
        }
    }

    /// Run discovery for one query.
    pub async fn discover(&self, query: &str) -> Result<DiscoveryResult, DiscoveryError> {
        let variants = query_variants(query);
        let deadline = Instant::now() + self.aggregate_timeout;

        let mut tasks: JoinSet<(usize, ProviderOutcome)> = JoinSet::new();
        for (idx, adapter) in self.adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let variants = variants.clone();
            let per_call = self.provider_timeout;
            let max_results = self.max_results;
            tasks.spawn(async move {
                (idx, run_provider(adapter, &variants, per_call, max_results).await)
            });
        }

        let mut outcomes: Vec<Option<ProviderOutcome>> =
            (0..self.adapters.len()).map(|_| None).collect();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, outcome)))) => outcomes[idx] = Some(outcome),
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "Provider task aborted unexpectedly");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        timeout_sec = self.aggregate_timeout.as_secs(),
                        "Aggregate discovery deadline reached, aborting stragglers"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut trace = Vec::with_capacity(self.adapters.len());
        let mut aggregate: Vec<SourceCandidate> = Vec::new();
        let mut provider_errors: Vec<DiscoveryError> = Vec::new();

        for (idx, adapter) in self.adapters.iter().enumerate() {
            let provider = adapter.provider();
            match outcomes[idx].take() {
                Some(ProviderOutcome::Found(found)) => {
                    trace.push(format!("{}:{}", provider, found.len()));
                    aggregate.extend(found);
                }
                Some(ProviderOutcome::Failed(err, salvaged)) => {
                    tracing::debug!(provider = %provider, error = %err, "Provider search failed");
                    trace.push(format!("{}:error:{}", provider, err.kind.reason()));
                    provider_errors.push(err);
                    aggregate.extend(salvaged);
                }
                Some(ProviderOutcome::TimedOut) | None => {
                    trace.push(format!("{}:error:timeout", provider));
                }
            }
        }

        let mut candidates = dedupe_candidates(aggregate);
        for candidate in &mut candidates {
            candidate.confidence = score_candidate(
                query,
                &candidate.title,
                candidate.artist_guess.as_deref(),
                candidate.duration_sec,
                &self.weights,
            );
        }
        // Stable sort keeps provider-priority order for equal scores.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if candidates.is_empty() {
            return Err(self.not_found(query, &trace, &provider_errors));
        }

        let selected = candidates.first().cloned();
        tracing::info!(
            query = %query,
            candidates = candidates.len(),
            selected = ?selected.as_ref().map(|c| (c.provider, c.source_id.clone())),
            "Discovery complete"
        );

        Ok(DiscoveryResult {
            query: query.to_string(),
            candidates,
            selected,
            provider_trace: trace,
        })
    }

    fn not_found(
        &self,
        query: &str,
        trace: &[String],
        provider_errors: &[DiscoveryError],
    ) -> DiscoveryError {
        let mut hints: Vec<String> = provider_errors
            .iter()
            .filter(|err| {
                matches!(
                    err.kind,
                    DiscoveryErrorKind::ProviderBinaryMissing
                        | DiscoveryErrorKind::AuthMissing
                        | DiscoveryErrorKind::AuthFailed
                        | DiscoveryErrorKind::RateLimited
                )
            })
            .map(|err| err.message.clone())
            .collect();
        for provider in &self.disabled {
            hints.push(format!("enable the {} provider in configuration", provider));
        }
        let hints_text = if hints.is_empty() {
            "none".to_string()
        } else {
            hints.join("; ")
        };

        DiscoveryError::new(
            DiscoveryErrorKind::NotFound,
            format!(
                "No candidates found for query '{}'. Provider trace: {}. Hints: {}",
                query,
                trace.join(", "),
                hints_text
            ),
        )
    }
}

/// Query all variants against one adapter, stopping at the first typed
/// error, and dedupe the provider's own results by identity.
async fn run_provider(
    adapter: Arc<dyn ProviderAdapter>,
    variants: &[String],
    per_call: Duration,
    max_results: usize,
) -> ProviderOutcome {
    let mut collected: Vec<SourceCandidate> = Vec::new();
    let mut failure: Option<DiscoveryError> = None;

    for variant in variants {
        match timeout(per_call, adapter.search(variant, max_results)).await {
            Ok(Ok(found)) => collected.extend(found),
            Ok(Err(err)) => {
                failure = Some(err);
                break;
            }
            Err(_) => return ProviderOutcome::TimedOut,
        }
    }

    let deduped = dedupe_by_identity(collected);
    match failure {
        Some(err) => ProviderOutcome::Failed(err, deduped),
        None => ProviderOutcome::Found(deduped),
    }
}

/// Drop repeated `(provider, source_id)` pairs, keeping first occurrence.
fn dedupe_by_identity(candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    let mut seen: HashSet<(Provider, String)> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.provider, c.source_id.clone())))
        .collect()
}

/// 1–2 query variants: the original, plus the accent-folded form when it
/// differs.
pub fn query_variants(query: &str) -> Vec<String> {
    let mut variants = vec![query.to_string()];
    let folded = fold_accents(query);
    if folded != query {
        variants.push(folded);
    }
    variants
}

/// Cache-checked discovery keyed by normalized query.
pub async fn discover_cached(
    coordinator: &DiscoveryCoordinator,
    cache: &CacheStore,
    query: &str,
    ttl_sec: u64,
) -> Result<DiscoveryResult, Error> {
    if let Some(payload) = cache.get_query(query, ttl_sec).await? {
        match serde_json::from_str::<DiscoveryResult>(&payload) {
            Ok(cached) => {
                tracing::debug!(query = %query, "Discovery served from cache");
                return Ok(cached);
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Discarding unreadable cached discovery");
            }
        }
    }

    let result = coordinator.discover(query).await?;
    let payload = serde_json::to_string(&result).map_err(CacheError::from)?;
    cache.put_query(query, &payload).await?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubProvider {
        provider: Provider,
        result: Result<Vec<SourceCandidate>, (DiscoveryErrorKind, &'static str)>,
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SourceCandidate>, DiscoveryError> {
            match &self.result {
                Ok(candidates) => Ok(candidates.clone()),
                Err((kind, message)) => {
                    Err(DiscoveryError::provider(*kind, self.provider, *message))
                }
            }
        }
    }

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
            duration_sec: Some(200),
            url: if source_type.is_retrievable() {
                Some(format!("https://example.com/{}", id))
            } else {
                None
            },
            confidence,
            raw: Value::Null,
        }
    }

    fn coordinator(adapters: Vec<Arc<dyn ProviderAdapter>>) -> DiscoveryCoordinator {
        DiscoveryCoordinator::new(
            adapters,
            Vec::new(),
            RankingWeights::default(),
            Duration::from_secs(5),
            Duration::from_secs(10),
            5,
        )
    }

    #[tokio::test]
    async fn trace_has_one_entry_per_configured_provider() {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(StubProvider {
                provider: Provider::Ytdlp,
                result: Err((DiscoveryErrorKind::ProviderBinaryMissing, "install yt-dlp")),
            }),
            Arc::new(StubProvider {
                provider: Provider::Spotify,
                result: Ok(vec![candidate(
                    Provider::Spotify,
                    SourceType::MetadataOnly,
                    "sp1",
                    "Song",
                    None,
                    0.7,
                )]),
            }),
            Arc::new(StubProvider {
                provider: Provider::Musicbrainz,
                result: Ok(vec![]),
            }),
        ];

        let out = coordinator(adapters).discover("song").await.unwrap();
        assert_eq!(out.provider_trace.len(), 3);
        assert_eq!(out.provider_trace[0], "ytdlp:error:missing_binary");
        assert_eq!(out.provider_trace[1], "spotify:1");
        assert_eq!(out.provider_trace[2], "musicbrainz:0");
    }

    #[tokio::test]
    async fn single_provider_result_is_selected() {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(StubProvider {
                provider: Provider::Ytdlp,
                result: Ok(vec![candidate(
                    Provider::Ytdlp,
                    SourceType::AudioRetrievable,
                    "abc",
                    "Mac Miller - Good News",
                    Some("Mac Miller"),
                    0.95,
                )]),
            }),
            Arc::new(StubProvider {
                provider: Provider::Musicbrainz,
                result: Ok(vec![]),
            }),
        ];

        let out = coordinator(adapters).discover("Mac Miller Good News").await.unwrap();
        let selected = out.selected.expect("candidate selected");
        assert_eq!(selected.source_id, "abc");
        assert!(out.provider_trace[0].starts_with("ytdlp"));
    }

    #[tokio::test]
    async fn empty_aggregate_fails_with_trace_and_hints() {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(StubProvider {
                provider: Provider::Ytdlp,
                result: Err((
                    DiscoveryErrorKind::ProviderBinaryMissing,
                    "install yt-dlp and ensure it is on PATH",
                )),
            }),
            Arc::new(StubProvider {
                provider: Provider::YoutubeApi,
                result: Err((
                    DiscoveryErrorKind::AuthMissing,
                    "set YOUTUBE_API_KEY to enable the YouTube Data API provider",
                )),
            }),
            Arc::new(StubProvider {
                provider: Provider::Musicbrainz,
                result: Ok(vec![]),
            }),
        ];

        let mut coordinator = coordinator(adapters);
        coordinator.disabled = vec![Provider::Spotify];
        let err = coordinator.discover("missing track").await.unwrap_err();
        assert_eq!(err.kind, DiscoveryErrorKind::NotFound);
        assert!(err.message.contains("ytdlp:error:missing_binary"));
        assert!(err.message.contains("youtube_api:error:auth_missing"));
        assert!(err.message.contains("musicbrainz:0"));
        assert!(err.message.contains("install yt-dlp"));
        assert!(err.message.contains("YOUTUBE_API_KEY"));
        assert!(err.message.contains("enable the spotify provider"));
    }

    #[tokio::test]
    async fn cross_provider_duplicates_prefer_retrievable() {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(StubProvider {
                provider: Provider::Ytdlp,
                result: Ok(vec![candidate(
                    Provider::Ytdlp,
                    SourceType::AudioRetrievable,
                    "yt1",
                    "De Repente Lembrei de Você",
                    Some("Ulisses Rocha"),
                    0.7,
                )]),
            }),
            Arc::new(StubProvider {
                provider: Provider::Spotify,
                result: Ok(vec![candidate(
                    Provider::Spotify,
                    SourceType::MetadataOnly,
                    "sp1",
                    "De Repente Lembrei de Voce",
                    Some("Ulisses Rocha"),
                    0.9,
                )]),
            }),
        ];

        let out = coordinator(adapters)
            .discover("De Repente Lembrei de Voce Ulisses Rocha")
            .await
            .unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert!(out.selected.unwrap().source_type.is_retrievable());
    }

    #[tokio::test]
    async fn rescoring_ranks_matching_title_above_unrelated_one() {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(StubProvider {
                provider: Provider::Ytdlp,
                result: Ok(vec![candidate(
                    Provider::Ytdlp,
                    SourceType::AudioRetrievable,
                    "x1",
                    "Ulisses Rocha - Outra Cancao",
                    None,
                    0.8,
                )]),
            }),
            Arc::new(StubProvider {
                provider: Provider::YoutubeApi,
                result: Ok(vec![candidate(
                    Provider::YoutubeApi,
                    SourceType::AudioRetrievable,
                    "x2",
                    "De Repente Lembrei de Você",
                    Some("Ulisses Rocha"),
                    0.2,
                )]),
            }),
        ];

        let out = coordinator(adapters)
            .discover("De Repente Lembrei de Voce Ulisses Rocha")
            .await
            .unwrap();
        assert_eq!(out.selected.unwrap().source_id, "x2");
    }

    #[test]
    fn variants_add_folded_form_only_when_different() {
        assert_eq!(query_variants("plain query"), vec!["plain query".to_string()]);
        let variants = query_variants("Lembrei de Você");
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[1], "Lembrei de Voce");
    }
}
