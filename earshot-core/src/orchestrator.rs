//! Listen orchestrator
//!
//! Top-level state machine: DISCOVER → SELECT_AUDIO_SOURCE →
//! RETRIEVE/ANALYZE → LYRICS → DESCRIPTOR_FALLBACK → SYNTHESIZE → DONE,
//! with an implicit FAILED terminal reachable from any state. In
//! `full_audio` mode the first unrecoverable failure short-circuits; in
//! `auto` mode failures narrow the analysis mode and the call continues.
//! Collaborators are injected trait objects so every transition is testable
//! without network access or external tools.

use crate::analysis::{EssentiaAnalyzer, FeatureAnalyzer};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::descriptor::{CatalogDescriptors, DescriptorSource};
use crate::discovery::{discover_cached, DiscoveryCoordinator};
use crate::error::{Error, RetrievalError, RetrievalErrorKind};
use crate::lyric_analysis::analyze_lyrics_cached;
use crate::lyrics::{LrclibLyrics, LyricsSource};
use crate::metadata::metadata_from_candidate;
use crate::models::{
    AnalysisMode, AudioArtifact, DescriptorArtifact, DiscoveryResult, ErrorEntry, FeatureResult,
    FetchResult, ListenMode, ListenResult, LyricsAnalysisResult, LyricsArtifact, MetadataArtifact,
    Provider, SourceCandidate, SynthesisResult,
};
use crate::modes::resolve_mode;
use crate::retrieval::{build_fallback_chain, run_fallback_chain, AudioFetcher, DefaultFetcher};
use crate::synthesis::{
    build_audio_synthesis, build_descriptor_synthesis, build_metadata_synthesis,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Options for one listen call.
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// Explicit mode request; unrecognized values fall back to the
    /// configured default.
    pub mode: Option<String>,
    /// When false, synthesis is skipped entirely.
    pub deep_analysis: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            mode: None,
            deep_analysis: true,
        }
    }
}

/// Accumulating state threaded through the state-machine stages.
struct ListenState {
    query: String,
    source: Option<SourceCandidate>,
    metadata: Option<MetadataArtifact>,
    descriptor: Option<DescriptorArtifact>,
    audio: Option<AudioArtifact>,
    features: Option<FeatureResult>,
    lyrics: Option<LyricsArtifact>,
    lyrics_analysis: Option<LyricsAnalysisResult>,
    synthesis: Option<SynthesisResult>,
    cache_info: BTreeMap<String, Value>,
    errors: Vec<ErrorEntry>,
    trace: Vec<String>,
    full_audio_ready: bool,
    degraded_from_auto: bool,
}

impl ListenState {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            source: None,
            metadata: None,
            descriptor: None,
            audio: None,
            features: None,
            lyrics: None,
            lyrics_analysis: None,
            synthesis: None,
            cache_info: BTreeMap::new(),
            errors: Vec::new(),
            trace: Vec::new(),
            full_audio_ready: false,
            degraded_from_auto: false,
        }
    }

    fn record_error(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ErrorEntry::new(code, message));
    }

    fn into_result(self, analysis_mode: AnalysisMode) -> ListenResult {
        ListenResult {
            query: self.query,
            analysis_mode,
            source: self.source,
            metadata: self.metadata,
            descriptor: self.descriptor,
            audio: self.audio,
            features: self.features,
            lyrics: self.lyrics,
            lyrics_analysis: self.lyrics_analysis,
            synthesis: self.synthesis,
            cache: self.cache_info,
            errors: self.errors,
            fallback_trace: self.trace,
        }
    }
}

pub struct ListenOrchestrator {
    config: Config,
    coordinator: DiscoveryCoordinator,
    fetcher: Arc<dyn AudioFetcher>,
    analyzer: Arc<dyn FeatureAnalyzer>,
    lyrics: Arc<dyn LyricsSource>,
    descriptors: Arc<dyn DescriptorSource>,
}

impl ListenOrchestrator {
    /// Orchestrator with the default collaborators. Fails fast on invalid
    /// configuration.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let coordinator = DiscoveryCoordinator::from_config(&config)?;
        let fetcher = Arc::new(DefaultFetcher::new(&config.retrieval)?);
        let analyzer = Arc::new(EssentiaAnalyzer::new());
        let lyrics = Arc::new(LrclibLyrics::new(config.lyrics.clone()));
        let descriptors = Arc::new(CatalogDescriptors::new(config.descriptors.clone()));
        Ok(Self {
            config,
            coordinator,
            fetcher,
            analyzer,
            lyrics,
            descriptors,
        })
    }

    /// Orchestrator with injected collaborators, for tests and embedding.
    pub fn with_collaborators(
        config: Config,
        coordinator: DiscoveryCoordinator,
        fetcher: Arc<dyn AudioFetcher>,
        analyzer: Arc<dyn FeatureAnalyzer>,
        lyrics: Arc<dyn LyricsSource>,
        descriptors: Arc<dyn DescriptorSource>,
    ) -> Self {
        Self {
            config,
            coordinator,
            fetcher,
            analyzer,
            lyrics,
            descriptors,
        }
    }

    /// Cache-checked discovery for one query.
    pub async fn discover(&self, cache: &CacheStore, query: &str) -> Result<DiscoveryResult, Error> {
        discover_cached(
            &self.coordinator,
            cache,
            query,
            self.config.discovery.query_ttl_sec,
        )
        .await
    }

    /// Discover and retrieve audio for one query through the fallback
    /// chain. Used by the CLI `fetch` command.
    pub async fn fetch(&self, cache: &CacheStore, query: &str) -> Result<FetchResult, Error> {
        let discovery = self.discover(cache, query).await?;
        let chain = build_fallback_chain(&discovery);
        if chain.is_empty() {
            return Err(RetrievalError::new(
                RetrievalErrorKind::Unavailable,
                "no retrievable candidate with a usable URL was discovered",
            )
            .into());
        }

        let outcome = run_fallback_chain(&chain, self.fetcher.as_ref(), cache).await;
        match outcome.result {
            Some(fetched) => Ok(fetched),
            None => {
                let detail = outcome
                    .errors
                    .last()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "no attempt succeeded".to_string());
                Err(RetrievalError::new(
                    RetrievalErrorKind::Unavailable,
                    format!("every retrieval attempt failed (last: {})", detail),
                )
                .into())
            }
        }
    }

    /// Analyze an audio file directly. Used by the CLI `analyze` command.
    pub async fn analyze_path(
        &self,
        cache: &CacheStore,
        audio_path: &str,
    ) -> Result<FeatureResult, Error> {
        let audio = AudioArtifact {
            path: audio_path.to_string(),
            format: std::path::Path::new(audio_path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
            sample_rate: None,
            duration_sec: None,
        };
        Ok(self.analyzer.analyze(&audio, cache).await?)
    }

    /// Run the full listen state machine. Always returns a result; failures
    /// terminate with `analysis_mode = failed` and the error recorded.
    pub async fn listen(
        &self,
        cache: &CacheStore,
        query: &str,
        options: &ListenOptions,
    ) -> ListenResult {
        let mode = resolve_mode(options.mode.as_deref(), &self.config.listen.default_mode);
        tracing::info!(query = %query, mode = %mode.as_str(), "Listen call started");

        let mut state = ListenState::new(query);

        // DISCOVER
        let discovery = match self.discover(cache, query).await {
            Ok(discovery) => discovery,
            Err(err) => {
                state.record_error(err.code(), err.to_string());
                return state.into_result(AnalysisMode::Failed);
            }
        };
        state.trace.extend(discovery.provider_trace.iter().cloned());
        record_primary_provider_failures(&mut state, &discovery);

        let Some(selected) = discovery.selected.clone() else {
            state.record_error("DISCOVERY_EMPTY_SELECTION", "discovery produced no selected candidate");
            return state.into_result(AnalysisMode::Failed);
        };
        state.metadata = Some(metadata_from_candidate(&selected));
        state.source = Some(selected);

        // SELECT_AUDIO_SOURCE + RETRIEVE/ANALYZE
        if matches!(mode, ListenMode::Auto | ListenMode::FullAudio) {
            if let Some(terminal) = self.audio_stages(cache, &discovery, mode, &mut state).await {
                return state.into_result(terminal);
            }
        }

        // LYRICS: best-effort whenever a source exists.
        if let Some(source) = state.source.clone() {
            let lyrics = self
                .lyrics
                .fetch(&source, state.audio.as_ref(), cache)
                .await;
            if lyrics.text.is_some() {
                state.lyrics_analysis = analyze_lyrics_cached(&lyrics, cache).await;
            }
            state.lyrics = Some(lyrics);
        }

        // DESCRIPTOR_FALLBACK
        let final_mode = if state.full_audio_ready {
            AnalysisMode::FullAudio
        } else {
            self.descriptor_fallback(mode, &mut state).await
        };

        // SYNTHESIZE
        if options.deep_analysis && final_mode != AnalysisMode::Failed {
            if let Some(source) = &state.source {
                state.synthesis = match final_mode {
                    AnalysisMode::FullAudio => state.features.as_ref().map(|features| {
                        build_audio_synthesis(source, features, state.lyrics_analysis.as_ref())
                    }),
                    AnalysisMode::DescriptorOnly => state.descriptor.as_ref().map(|descriptor| {
                        build_descriptor_synthesis(source, descriptor, state.lyrics_analysis.as_ref())
                    }),
                    AnalysisMode::MetadataOnly => Some(build_metadata_synthesis(
                        source,
                        state.metadata.as_ref(),
                        state.lyrics_analysis.as_ref(),
                    )),
                    AnalysisMode::Failed => None,
                };
            }
        }

        tracing::info!(
            query = %query,
            analysis_mode = %final_mode,
            errors = state.errors.len(),
            "Listen call complete"
        );
        state.into_result(final_mode)
    }

    /// SELECT_AUDIO_SOURCE and RETRIEVE/ANALYZE. Returns the terminal mode
    /// when the call must stop (fatal failure under `full_audio`).
    async fn audio_stages(
        &self,
        cache: &CacheStore,
        discovery: &DiscoveryResult,
        mode: ListenMode,
        state: &mut ListenState,
    ) -> Option<AnalysisMode> {
        let chain = build_fallback_chain(discovery);
        if chain.is_empty() {
            if mode == ListenMode::FullAudio {
                state.record_error(
                    RetrievalErrorKind::Unavailable.code(),
                    "no retrievable candidate with a usable URL was discovered",
                );
                return Some(AnalysisMode::Failed);
            }
            state
                .trace
                .push("mode:auto->metadata_only(no_retrievable_source)".to_string());
            state.degraded_from_auto = true;
            return None;
        }

        let outcome = run_fallback_chain(&chain, self.fetcher.as_ref(), cache).await;
        state.trace.extend(outcome.trace);
        state.errors.extend(outcome.errors);

        let Some(fetched) = outcome.result else {
            if mode == ListenMode::FullAudio {
                return Some(AnalysisMode::Failed);
            }
            state
                .trace
                .push("mode:auto->metadata_only(retrieval_failed)".to_string());
            state.degraded_from_auto = true;
            return None;
        };

        state
            .cache_info
            .insert("audio_cache_hit".to_string(), Value::from(fetched.cache_hit));

        match self.analyzer.analyze(&fetched.audio, cache).await {
            Ok(features) => {
                // The winning retrieval candidate becomes the final source.
                state.metadata = Some(metadata_from_candidate(&fetched.source));
                state.source = Some(fetched.source.clone());
                state.cache_info.insert(
                    "feature_cache_key".to_string(),
                    Value::from(CacheStore::normalize_key(&fetched.audio.path)),
                );
                state.audio = Some(fetched.audio);
                state.features = Some(features);
                state.full_audio_ready = true;
            }
            Err(err) => {
                state.record_error(err.code.clone(), err.message.clone());
                if mode == ListenMode::FullAudio {
                    return Some(AnalysisMode::Failed);
                }
                state
                    .trace
                    .push("mode:auto->metadata_only(analysis_failed)".to_string());
                state.degraded_from_auto = true;
            }
        }
        None
    }

    /// DESCRIPTOR_FALLBACK: decide the terminal mode when full audio is not
    /// ready. An explicit `metadata_only` request pins the fidelity ceiling,
    /// so no descriptor is built for it.
    async fn descriptor_fallback(&self, mode: ListenMode, state: &mut ListenState) -> AnalysisMode {
        match mode {
            ListenMode::FullAudio => AnalysisMode::Failed,
            ListenMode::MetadataOnly => AnalysisMode::MetadataOnly,
            ListenMode::DescriptorOnly | ListenMode::Auto => {
                let Some(source) = state.source.clone() else {
                    return AnalysisMode::MetadataOnly;
                };
                match self.descriptors.build(&source, state.metadata.as_ref()).await {
                    Ok(Some(descriptor)) if descriptor.confidence > 0.0 => {
                        if state.degraded_from_auto {
                            state.trace.push(
                                "mode:metadata_only->descriptor_only(descriptor_available)"
                                    .to_string(),
                            );
                        }
                        state.descriptor = Some(descriptor);
                        AnalysisMode::DescriptorOnly
                    }
                    Ok(_) => AnalysisMode::MetadataOnly,
                    Err(err) => {
                        state.record_error(err.code.clone(), err.message.clone());
                        AnalysisMode::MetadataOnly
                    }
                }
            }
        }
    }
}

/// Surface primary-provider discovery failures in the fallback trace, so a
/// later mode degradation is explainable from the listen result alone.
fn record_primary_provider_failures(state: &mut ListenState, discovery: &DiscoveryResult) {
    let prefix = format!("{}:error:", Provider::Ytdlp);
    for entry in &discovery.provider_trace {
        if let Some(reason) = entry.strip_prefix(&prefix) {
            state
                .trace
                .push(format!("primary:{}_failed({})", Provider::Ytdlp, reason));
        }
    }
}
