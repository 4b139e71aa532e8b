//! Core data models for discovery and listen orchestration
//!
//! Everything that crosses a component boundary lives here: candidates,
//! discovery results, retrieval/analysis artifacts, and the final listen
//! result. All models serialize to JSON for the CLI surface and the cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Known candidate sources, in fixed discovery priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// yt-dlp binary search
    Ytdlp,
    /// YouTube Data API v3 search
    YoutubeApi,
    /// Spotify catalog search (client-credentials)
    Spotify,
    /// Jamendo licensed-audio API
    Jamendo,
    /// MusicBrainz recording search
    Musicbrainz,
}

impl Provider {
    /// Discovery priority order. The coordinator queries providers in this
    /// order and uses it to break score ties.
    pub const DISCOVERY_ORDER: [Provider; 5] = [
        Provider::Ytdlp,
        Provider::YoutubeApi,
        Provider::Spotify,
        Provider::Jamendo,
        Provider::Musicbrainz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ytdlp => "ytdlp",
            Provider::YoutubeApi => "youtube_api",
            Provider::Spotify => "spotify",
            Provider::Jamendo => "jamendo",
            Provider::Musicbrainz => "musicbrainz",
        }
    }

    /// Position in the retrieval fallback ordering (lower retrieves first).
    pub fn retrieval_rank(&self) -> u8 {
        match self {
            Provider::Ytdlp => 0,
            Provider::YoutubeApi => 1,
            Provider::Jamendo => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a candidate's URL can yield downloadable audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    AudioRetrievable,
    MetadataOnly,
}

impl SourceType {
    pub fn is_retrievable(&self) -> bool {
        matches!(self, SourceType::AudioRetrievable)
    }
}

/// A single provider's proposed match for a query.
///
/// Identity is `(provider, source_id)`. The confidence is re-scored by the
/// discovery coordinator after cross-provider deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub provider: Provider,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_guess: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    /// Opaque provider payload the candidate was built from.
    #[serde(default)]
    pub raw: Value,
}

impl SourceCandidate {
    pub fn identity(&self) -> (Provider, &str) {
        (self.provider, self.source_id.as_str())
    }
}

/// Outcome of one discovery call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub query: String,
    /// All surviving candidates, descending confidence.
    #[serde(default)]
    pub candidates: Vec<SourceCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<SourceCandidate>,
    /// One entry per configured provider: `"<provider>:<count>"` or
    /// `"<provider>:error:<reason>"`. Append-only, never reordered.
    #[serde(default)]
    pub provider_trace: Vec<String>,
}

/// Audio retrieved to local disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

/// Result of an audio retrieval attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub source: SourceCandidate,
    pub audio: AudioArtifact,
    #[serde(default)]
    pub cache_hit: bool,
}

/// Normalized catalog fields derived from a candidate's raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataArtifact {
    /// Provider label the fields were derived from.
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
}

/// Tonal mode of a key estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
    #[default]
    Unknown,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KeyMode::Major => "major",
            KeyMode::Minor => "minor",
            KeyMode::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Output of the audio feature-analysis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub mode: KeyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness_rms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_range: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectral_centroid_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_density: Option<f64>,
    #[serde(default)]
    pub section_map: Vec<Value>,
    #[serde(default)]
    pub optional_features: BTreeMap<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Coverage classification for a descriptor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// Value came straight from a descriptor source.
    Direct,
    /// Value was derived from another signal.
    Mapped,
    Missing,
}

/// Catalog-sourced substitute for direct audio features.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DescriptorArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub mode: KeyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness_proxy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_proxy: Option<f64>,
    #[serde(default)]
    pub texture_proxy: TextureProxy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danceability_proxy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acousticness_proxy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumentalness_proxy: Option<f64>,
    /// Per-field coverage classification.
    #[serde(default)]
    pub coverage: BTreeMap<String, Coverage>,
    #[serde(default)]
    pub sources_used: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Aggregate confidence derived from field coverage.
    #[serde(default)]
    pub confidence: f64,
}

/// Spectral texture summary inside a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextureProxy {
    #[serde(default)]
    pub spectral_centroid_mean: Option<f64>,
    #[serde(default)]
    pub spectral_complexity_mean: Option<f64>,
}

/// Where a lyrics text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LyricsOrigin {
    Lrclib,
    Asr,
    #[default]
    None,
}

/// Lyrics fetched for the selected source. Failures are recorded as
/// warnings, never as errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LyricsArtifact {
    #[serde(default)]
    pub source: LyricsOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub is_synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_confidence: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl LyricsArtifact {
    /// Empty artifact carrying a single warning code.
    pub fn unavailable(warning: &str) -> Self {
        Self {
            warnings: vec![warning.to_string()],
            ..Self::default()
        }
    }
}

/// Emotional polarity of a lyrics text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Negative,
    Mixed,
    Positive,
    #[default]
    Neutral,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Polarity::Negative => "negative",
            Polarity::Mixed => "mixed",
            Polarity::Positive => "positive",
            Polarity::Neutral => "neutral",
        };
        f.write_str(label)
    }
}

/// Output of the lyric sentiment/theme collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LyricsAnalysisResult {
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub emotional_polarity: Polarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence_lines: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Natural-language synthesis built from whichever evidence tier survived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub natural_observation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric_observation: Option<String>,
    pub combined_observation: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub uncertainty_notes: Vec<String>,
    pub prompt_for_text_model: String,
}

/// Requested analysis mode for one listen call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenMode {
    Auto,
    FullAudio,
    DescriptorOnly,
    MetadataOnly,
}

impl ListenMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto" => Some(ListenMode::Auto),
            "full_audio" => Some(ListenMode::FullAudio),
            "descriptor_only" => Some(ListenMode::DescriptorOnly),
            "metadata_only" => Some(ListenMode::MetadataOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenMode::Auto => "auto",
            ListenMode::FullAudio => "full_audio",
            ListenMode::DescriptorOnly => "descriptor_only",
            ListenMode::MetadataOnly => "metadata_only",
        }
    }
}

/// Terminal fidelity tier of a listen result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    FullAudio,
    DescriptorOnly,
    MetadataOnly,
    Failed,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisMode::FullAudio => "full_audio",
            AnalysisMode::DescriptorOnly => "descriptor_only",
            AnalysisMode::MetadataOnly => "metadata_only",
            AnalysisMode::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One recorded error with a stable code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Final result of one listen call.
///
/// `analysis_mode` is the single source of truth for which synthesis branch
/// ran and which artifacts are populated. `fallback_trace` is append-only
/// within one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenResult {
    pub query: String,
    pub analysis_mode: AnalysisMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<LyricsArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_analysis: Option<LyricsAnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisResult>,
    /// Diagnostic map (cache hits, cache keys).
    #[serde(default)]
    pub cache: BTreeMap<String, Value>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub fallback_trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_serializes_snake_case() {
        let json = serde_json::to_string(&Provider::YoutubeApi).unwrap();
        assert_eq!(json, "\"youtube_api\"");
    }

    #[test]
    fn source_type_serializes_kebab_case() {
        let json = serde_json::to_string(&SourceType::AudioRetrievable).unwrap();
        assert_eq!(json, "\"audio-retrievable\"");
    }

    #[test]
    fn retrieval_rank_prefers_binary_search_tool() {
        assert!(Provider::Ytdlp.retrieval_rank() < Provider::YoutubeApi.retrieval_rank());
        assert!(Provider::YoutubeApi.retrieval_rank() < Provider::Jamendo.retrieval_rank());
        assert!(Provider::Jamendo.retrieval_rank() < Provider::Spotify.retrieval_rank());
    }

    #[test]
    fn listen_mode_parse_rejects_unknown() {
        assert_eq!(ListenMode::parse("full_audio"), Some(ListenMode::FullAudio));
        assert_eq!(ListenMode::parse("vibes"), None);
    }

    #[test]
    fn candidate_roundtrips_through_json() {
        let candidate = SourceCandidate {
            provider: Provider::Spotify,
            source_type: SourceType::MetadataOnly,
            source_id: "sp1".to_string(),
            title: "Good News".to_string(),
            artist_guess: Some("Mac Miller".to_string()),
            duration_sec: Some(332),
            url: None,
            confidence: 0.9,
            raw: serde_json::json!({"id": "sp1"}),
        };

        let json = serde_json::to_string(&candidate).unwrap();
        let parsed: SourceCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.identity(), (Provider::Spotify, "sp1"));
        assert_eq!(parsed.duration_sec, Some(332));
    }
}
