//! Audio retrieval and the fallback chain
//!
//! Retrieval is inherently sequential: one success is enough, and attempts
//! are mutually exclusive. The chain orders retrievable candidates by
//! provider priority then confidence, and the runner walks it candidate by
//! candidate, emitting retry trace entries only between consecutive
//! attempts. Retrieved audio is cached under the source identity hash with
//! idempotent upserts.

use crate::cache::CacheStore;
use crate::config::RetrievalConfig;
use crate::error::{RetrievalError, RetrievalErrorKind};
use crate::models::{
    AudioArtifact, DiscoveryResult, ErrorEntry, FetchResult, Provider, SourceCandidate,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Boundary for one retrieval attempt, injectable for tests.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(
        &self,
        source: &SourceCandidate,
        cache: &CacheStore,
    ) -> Result<FetchResult, RetrievalError>;
}

/// Default fetcher: yt-dlp extraction for watch URLs, direct HTTP download
/// for sources exposing raw audio URLs (Jamendo).
pub struct DefaultFetcher {
    client: reqwest::Client,
    output_format: String,
    timeout: Duration,
}

impl DefaultFetcher {
    pub fn new(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::providers::USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(|e| {
                RetrievalError::new(
                    RetrievalErrorKind::HttpFailed,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            client,
            output_format: config.output_format.clone(),
            timeout: Duration::from_secs(config.timeout_sec),
        })
    }

    /// Extract audio with yt-dlp into the cache's audio directory.
    async fn extract_with_tool(
        &self,
        source_key: &str,
        url: &str,
        cache: &CacheStore,
    ) -> Result<AudioArtifact, RetrievalError> {
        let out_template = cache
            .audio_dir
            .join(format!("{}.%(ext)s", source_key))
            .to_string_lossy()
            .to_string();

        tracing::debug!(url = %url, template = %out_template, "Running yt-dlp extraction");

        let run = Command::new("yt-dlp")
            .args([
                "-x",
                "--audio-format",
                &self.output_format,
                "--audio-quality",
                "0",
                "-o",
                &out_template,
                url,
            ])
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                RetrievalError::new(
                    RetrievalErrorKind::Timeout,
                    format!("audio retrieval timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RetrievalError::new(RetrievalErrorKind::ToolMissing, "yt-dlp is not installed")
                } else {
                    RetrievalError::new(
                        RetrievalErrorKind::ToolFailed,
                        format!("failed to spawn yt-dlp: {}", e),
                    )
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RetrievalError::new(
                RetrievalErrorKind::ToolFailed,
                format!("yt-dlp failed: {}", stderr.trim()),
            ));
        }

        find_produced_artifact(&cache.audio_dir, source_key, &self.output_format)
    }

    /// Download a direct audio URL into the cache's audio directory.
    async fn download_direct(
        &self,
        source_key: &str,
        url: &str,
        cache: &CacheStore,
    ) -> Result<AudioArtifact, RetrievalError> {
        tracing::debug!(url = %url, "Downloading direct audio URL");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::new(
                    RetrievalErrorKind::Timeout,
                    format!("audio download timed out after {}s", self.timeout.as_secs()),
                )
            } else {
                RetrievalError::new(
                    RetrievalErrorKind::HttpFailed,
                    format!("audio download failed: {}", e),
                )
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::new(
                RetrievalErrorKind::HttpFailed,
                format!("audio download failed with status {}", status.as_u16()),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            RetrievalError::new(
                RetrievalErrorKind::HttpFailed,
                format!("audio download body failed: {}", e),
            )
        })?;
        if body.is_empty() {
            return Err(RetrievalError::new(
                RetrievalErrorKind::EmptyContent,
                "audio download returned an empty body",
            ));
        }

        let format = extension_from_url(url).unwrap_or_else(|| "mp3".to_string());
        let path = cache.audio_dir.join(format!("{}.{}", source_key, format));
        tokio::fs::write(&path, &body).await.map_err(|e| {
            RetrievalError::new(
                RetrievalErrorKind::NotProduced,
                format!("failed to write audio artifact: {}", e),
            )
        })?;

        Ok(AudioArtifact {
            path: path.to_string_lossy().to_string(),
            format,
            sample_rate: None,
            duration_sec: None,
        })
    }
}

#[async_trait]
impl AudioFetcher for DefaultFetcher {
    async fn fetch(
        &self,
        source: &SourceCandidate,
        cache: &CacheStore,
    ) -> Result<FetchResult, RetrievalError> {
        let source_key =
            CacheStore::normalize_key(&format!("{}:{}", source.provider, source.source_id));

        match cache.get_audio(&source_key).await {
            Ok(Some((path, format))) => {
                tracing::debug!(source_key = %source_key, path = %path, "Audio cache hit");
                return Ok(FetchResult {
                    source: source.clone(),
                    audio: AudioArtifact {
                        path,
                        format,
                        sample_rate: None,
                        duration_sec: None,
                    },
                    cache_hit: true,
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Audio cache lookup failed, treating as miss");
            }
        }

        let url = source
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                RetrievalError::new(
                    RetrievalErrorKind::Unavailable,
                    "no retrievable URL available for source",
                )
            })?;
        if !source.source_type.is_retrievable() {
            return Err(RetrievalError::new(
                RetrievalErrorKind::Unavailable,
                "source is metadata-only",
            ));
        }

        let audio = match source.provider {
            Provider::Jamendo => self.download_direct(&source_key, url, cache).await?,
            _ => self.extract_with_tool(&source_key, url, cache).await?,
        };

        if let Err(e) = cache.put_audio(&source_key, &audio.path, &audio.format).await {
            tracing::warn!(error = %e, "Failed to record audio artifact in cache");
        }

        Ok(FetchResult {
            source: source.clone(),
            audio,
            cache_hit: false,
        })
    }
}

/// Locate the artifact a tool run produced for a source key.
fn find_produced_artifact(
    audio_dir: &Path,
    source_key: &str,
    default_format: &str,
) -> Result<AudioArtifact, RetrievalError> {
    let prefix = format!("{}.", source_key);
    let entries = std::fs::read_dir(audio_dir).map_err(|e| {
        RetrievalError::new(
            RetrievalErrorKind::NotProduced,
            format!("cannot inspect audio directory: {}", e),
        )
    })?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) {
            let path = entry.path();
            let format = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or(default_format)
                .to_string();
            return Ok(AudioArtifact {
                path: path.to_string_lossy().to_string(),
                format,
                sample_rate: None,
                duration_sec: None,
            });
        }
    }

    Err(RetrievalError::new(
        RetrievalErrorKind::NotProduced,
        "tool completed but no audio artifact was produced",
    ))
}

fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let ext = path.rsplit('.').next()?;
    if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) && path.contains('/') {
        Some(ext.to_lowercase())
    } else {
        None
    }
}

/// Ordered, deduplicated retrieval candidates from a discovery result.
///
/// Filters to audio-retrievable candidates with a non-empty URL, orders by
/// provider retrieval priority then descending confidence, dedups by
/// identity.
pub fn build_fallback_chain(discovery: &DiscoveryResult) -> Vec<SourceCandidate> {
    let mut chain: Vec<SourceCandidate> = discovery
        .candidates
        .iter()
        .filter(|c| {
            c.source_type.is_retrievable()
                && c.url.as_deref().map(str::trim).is_some_and(|u| !u.is_empty())
        })
        .cloned()
        .collect();

    chain.sort_by(|a, b| {
        a.provider
            .retrieval_rank()
            .cmp(&b.provider.retrieval_rank())
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let mut seen: HashSet<(Provider, String)> = HashSet::new();
    chain
        .into_iter()
        .filter(|c| seen.insert((c.provider, c.source_id.clone())))
        .collect()
}

/// What one walk of the fallback chain produced.
pub struct ChainOutcome {
    pub result: Option<FetchResult>,
    pub trace: Vec<String>,
    pub errors: Vec<ErrorEntry>,
}

/// Attempt retrieval candidate by candidate, stopping at the first success.
pub async fn run_fallback_chain(
    chain: &[SourceCandidate],
    fetcher: &dyn AudioFetcher,
    cache: &CacheStore,
) -> ChainOutcome {
    let mut trace = Vec::new();
    let mut errors = Vec::new();

    for (idx, candidate) in chain.iter().enumerate() {
        match fetcher.fetch(candidate, cache).await {
            Ok(fetched) => {
                trace.push(format!(
                    "audio_source:selected({}:{})",
                    candidate.provider, candidate.source_id
                ));
                return ChainOutcome {
                    result: Some(fetched),
                    trace,
                    errors,
                };
            }
            Err(err) => {
                tracing::debug!(
                    provider = %candidate.provider,
                    source_id = %candidate.source_id,
                    error = %err,
                    "Retrieval attempt failed"
                );
                if idx == 0 {
                    trace.push(format!(
                        "primary:{}_failed({})",
                        candidate.provider,
                        err.code()
                    ));
                } else {
                    trace.push(format!(
                        "audio_source:attempt_failed({}:{})",
                        candidate.provider,
                        err.code()
                    ));
                }
                errors.push(ErrorEntry::new(err.code(), err.message.clone()));
                if let Some(next) = chain.get(idx + 1) {
                    trace.push(format!(
                        "audio_source:retry({}->{})",
                        candidate.provider, next.provider
                    ));
                }
            }
        }
    }

    ChainOutcome {
        result: None,
        trace,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use serde_json::Value;
    use std::sync::Mutex;

    fn candidate(
        provider: Provider,
        source_type: SourceType,
        id: &str,
        url: Option<&str>,
        confidence: f64,
    ) -> SourceCandidate {
        SourceCandidate {
            provider,
            source_type,
            source_id: id.to_string(),
            title: "Song".to_string(),
            artist_guess: None,
            duration_sec: None,
            url: url.map(String::from),
            confidence,
            raw: Value::Null,
        }
    }

    fn discovery(candidates: Vec<SourceCandidate>) -> DiscoveryResult {
        DiscoveryResult {
            query: "q".to_string(),
            candidates,
            selected: None,
            provider_trace: Vec::new(),
        }
    }

    #[test]
    fn chain_filters_metadata_only_and_missing_urls() {
        let d = discovery(vec![
            candidate(Provider::Spotify, SourceType::MetadataOnly, "sp1", Some("u"), 0.99),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "yt1", None, 0.9),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "yt2", Some("  "), 0.9),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "yt3", Some("u3"), 0.8),
        ]);
        let chain = build_fallback_chain(&d);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].source_id, "yt3");
    }

    #[test]
    fn chain_orders_by_provider_priority_then_confidence() {
        let d = discovery(vec![
            candidate(Provider::Jamendo, SourceType::AudioRetrievable, "j1", Some("u"), 0.99),
            candidate(Provider::YoutubeApi, SourceType::AudioRetrievable, "y2", Some("u"), 0.95),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "y1a", Some("u"), 0.60),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "y1b", Some("u"), 0.85),
        ]);
        let chain = build_fallback_chain(&d);
        let ids: Vec<&str> = chain.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["y1b", "y1a", "y2", "j1"]);
    }

    #[test]
    fn chain_dedupes_by_identity() {
        let d = discovery(vec![
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "same", Some("u"), 0.9),
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "same", Some("u"), 0.8),
        ]);
        assert_eq!(build_fallback_chain(&d).len(), 1);
    }

    /// Fetcher that fails for configured providers and succeeds otherwise.
    struct ScriptedFetcher {
        fail: Vec<(Provider, RetrievalErrorKind)>,
        calls: Mutex<Vec<Provider>>,
    }

    #[async_trait]
    impl AudioFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            source: &SourceCandidate,
            _cache: &CacheStore,
        ) -> Result<FetchResult, RetrievalError> {
            self.calls.lock().unwrap().push(source.provider);
            if let Some((_, kind)) = self.fail.iter().find(|(p, _)| *p == source.provider) {
                return Err(RetrievalError::new(*kind, "scripted failure"));
            }
            Ok(FetchResult {
                source: source.clone(),
                audio: AudioArtifact {
                    path: "/tmp/a.wav".to_string(),
                    format: "wav".to_string(),
                    sample_rate: None,
                    duration_sec: None,
                },
                cache_hit: false,
            })
        }
    }

    async fn test_cache(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::open_at(&dir.path().join("cache"), &dir.path().join("cache/index.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn runner_stops_at_first_success() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        let chain = vec![
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "y1", Some("u"), 0.9),
            candidate(Provider::YoutubeApi, SourceType::AudioRetrievable, "y2", Some("u"), 0.8),
        ];
        let fetcher = ScriptedFetcher {
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };

        let outcome = run_fallback_chain(&chain, &fetcher, &cache).await;
        assert!(outcome.result.is_some());
        assert_eq!(outcome.trace, vec!["audio_source:selected(ytdlp:y1)".to_string()]);
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![Provider::Ytdlp]);
    }

    #[tokio::test]
    async fn runner_emits_retry_between_consecutive_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        let chain = vec![
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "y1", Some("u"), 0.9),
            candidate(Provider::YoutubeApi, SourceType::AudioRetrievable, "y2", Some("u"), 0.8),
        ];
        let fetcher = ScriptedFetcher {
            fail: vec![(Provider::Ytdlp, RetrievalErrorKind::Timeout)],
            calls: Mutex::new(Vec::new()),
        };

        let outcome = run_fallback_chain(&chain, &fetcher, &cache).await;
        let fetched = outcome.result.expect("second attempt succeeds");
        assert_eq!(fetched.source.provider, Provider::YoutubeApi);
        assert_eq!(
            outcome.trace,
            vec![
                "primary:ytdlp_failed(TIMEOUT)".to_string(),
                "audio_source:retry(ytdlp->youtube_api)".to_string(),
                "audio_source:selected(youtube_api:y2)".to_string(),
            ]
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code, "TIMEOUT");
    }

    #[tokio::test]
    async fn runner_exhausts_chain_without_trailing_retry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        let chain = vec![
            candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "y1", Some("u"), 0.9),
            candidate(Provider::Jamendo, SourceType::AudioRetrievable, "j1", Some("u"), 0.8),
        ];
        let fetcher = ScriptedFetcher {
            fail: vec![
                (Provider::Ytdlp, RetrievalErrorKind::ToolFailed),
                (Provider::Jamendo, RetrievalErrorKind::HttpFailed),
            ],
            calls: Mutex::new(Vec::new()),
        };

        let outcome = run_fallback_chain(&chain, &fetcher, &cache).await;
        assert!(outcome.result.is_none());
        assert_eq!(
            outcome.trace,
            vec![
                "primary:ytdlp_failed(TOOL_FAILED)".to_string(),
                "audio_source:retry(ytdlp->jamendo)".to_string(),
                "audio_source:attempt_failed(jamendo:HTTP_FAILED)".to_string(),
            ]
        );
        assert_eq!(outcome.errors.len(), 2);
    }

    #[tokio::test]
    async fn default_fetcher_honors_audio_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        let source = candidate(Provider::Ytdlp, SourceType::AudioRetrievable, "abc", Some("u"), 0.9);
        let source_key = CacheStore::normalize_key("ytdlp:abc");

        let audio_path = dir.path().join("cache/audio/cached.wav");
        std::fs::write(&audio_path, b"audio").unwrap();
        cache
            .put_audio(&source_key, audio_path.to_str().unwrap(), "wav")
            .await
            .unwrap();

        let fetcher = DefaultFetcher::new(&crate::config::RetrievalConfig::default()).unwrap();
        let out = fetcher.fetch(&source, &cache).await.unwrap();
        assert!(out.cache_hit);
        assert_eq!(out.audio.format, "wav");
    }

    #[tokio::test]
    async fn default_fetcher_rejects_sources_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir).await;
        let source = candidate(Provider::Musicbrainz, SourceType::MetadataOnly, "m1", None, 0.9);

        let fetcher = DefaultFetcher::new(&crate::config::RetrievalConfig::default()).unwrap();
        let err = fetcher.fetch(&source, &cache).await.unwrap_err();
        assert_eq!(err.kind, RetrievalErrorKind::Unavailable);
    }

    #[test]
    fn extension_from_url_handles_query_strings() {
        assert_eq!(
            extension_from_url("https://cdn.example.com/a/track.mp3?from=app"),
            Some("mp3".to_string())
        );
        assert_eq!(extension_from_url("https://cdn.example.com/stream"), None);
    }
}
