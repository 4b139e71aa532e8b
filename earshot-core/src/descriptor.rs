//! Descriptor collaborator
//!
//! Builds a catalog-sourced substitute for direct audio features when raw
//! audio cannot be obtained: resolves a MusicBrainz recording id (ISRC
//! first, title/artist query otherwise), pulls AcousticBrainz low/high
//! level documents, and fills remaining gaps from the Deezer catalog.
//! Coverage per field is classified direct/mapped/missing and folded into
//! an aggregate confidence; artifacts below the configured minimum are
//! discarded.
//!
//! Note: AcousticBrainz stopped accepting submissions in 2022, so data only
//! exists for recordings analyzed before that date.

use crate::config::DescriptorsConfig;
use crate::error::DescriptorError;
use crate::models::{
    Coverage, DescriptorArtifact, KeyMode, MetadataArtifact, SourceCandidate, TextureProxy,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2/recording";
const ACOUSTICBRAINZ_BASE_URL: &str = "https://acousticbrainz.org/api/v1";
const DEEZER_BASE_URL: &str = "https://api.deezer.com";

/// Gain-to-energy mapping. Uncalibrated placeholder: the offset/range pair
/// has no documented derivation and should not be treated as a law.
const GAIN_ENERGY_OFFSET: f64 = 15.0;
const GAIN_ENERGY_RANGE: f64 = 30.0;

/// Relative importance of each descriptor field in the aggregate confidence.
const COVERAGE_WEIGHTS: &[(&str, f64)] = &[
    ("tempo_bpm", 0.16),
    ("key", 0.12),
    ("mode", 0.08),
    ("loudness_proxy", 0.10),
    ("energy_proxy", 0.14),
    ("texture_proxy", 0.16),
    ("danceability_proxy", 0.10),
    ("acousticness_proxy", 0.07),
    ("instrumentalness_proxy", 0.07),
];

/// Boundary for the descriptor collaborator.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn build(
        &self,
        source: &SourceCandidate,
        metadata: Option<&MetadataArtifact>,
    ) -> Result<Option<DescriptorArtifact>, DescriptorError>;
}

/// Default implementation over AcousticBrainz and Deezer.
pub struct CatalogDescriptors {
    config: DescriptorsConfig,
    client: Option<reqwest::Client>,
}

impl CatalogDescriptors {
    pub fn new(config: DescriptorsConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::providers::USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_sec))
            .build()
            .ok();
        Self { config, client }
    }

    async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Option<Value> {
        let client = self.client.as_ref()?;
        let response = client.get(url).query(params).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<Value>().await.ok()
    }

    /// Resolve a recording MBID: exact ISRC match when available, fuzzy
    /// title/artist query otherwise.
    async fn find_mbid(
        &self,
        source: &SourceCandidate,
        metadata: Option<&MetadataArtifact>,
    ) -> Option<String> {
        let query = match metadata.and_then(|m| m.isrc.as_deref()) {
            Some(isrc) => format!("isrc:{}", isrc),
            None => {
                let title = metadata
                    .map(|m| m.title.as_str())
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&source.title);
                let artist = metadata
                    .filter(|m| !m.artists.is_empty())
                    .map(|m| m.artists.join(", "))
                    .or_else(|| source.artist_guess.clone())
                    .unwrap_or_default();
                format!("recording:\"{}\" AND artist:\"{}\"", title, artist)
            }
        };

        let payload = self
            .get_json(MUSICBRAINZ_URL, &[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .await?;
        payload
            .get("recordings")
            .and_then(Value::as_array)
            .and_then(|recs| recs.first())
            .and_then(|rec| rec.get("id"))
            .and_then(Value::as_str)
            .map(String::from)
    }

    async fn fetch_acousticbrainz(&self, mbid: &str) -> (Option<Value>, Option<Value>) {
        let low_url = format!("{}/{}/low-level", ACOUSTICBRAINZ_BASE_URL, mbid);
        let high_url = format!("{}/{}/high-level", ACOUSTICBRAINZ_BASE_URL, mbid);
        futures::join!(self.get_json(&low_url, &[]), self.get_json(&high_url, &[]))
    }

    /// Catalog fill-in: Deezer tracks carry BPM and replay gain.
    async fn fetch_deezer_track(
        &self,
        source: &SourceCandidate,
        metadata: Option<&MetadataArtifact>,
    ) -> Option<Value> {
        if let Some(isrc) = metadata.and_then(|m| m.isrc.as_deref()) {
            let url = format!("{}/track/isrc:{}", DEEZER_BASE_URL, isrc);
            if let Some(payload) = self.get_json(&url, &[]).await {
                if payload.get("id").is_some_and(|id| !id.is_null()) {
                    return Some(payload);
                }
            }
        }

        let mut query = source.title.clone();
        if let Some(artist) = &source.artist_guess {
            query.push(' ');
            query.push_str(artist);
        }
        let query = query.trim().to_string();
        if query.is_empty() {
            return None;
        }

        let url = format!("{}/search", DEEZER_BASE_URL);
        let payload = self.get_json(&url, &[("q", query.as_str())]).await?;
        payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .filter(|item| item.is_object())
            .cloned()
    }
}

#[async_trait]
impl DescriptorSource for CatalogDescriptors {
    async fn build(
        &self,
        source: &SourceCandidate,
        metadata: Option<&MetadataArtifact>,
    ) -> Result<Option<DescriptorArtifact>, DescriptorError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut descriptor = DescriptorArtifact {
            coverage: default_coverage(),
            ..DescriptorArtifact::default()
        };

        let mbid = self.find_mbid(source, metadata).await;
        let (low, high) = match &mbid {
            Some(mbid) => self.fetch_acousticbrainz(mbid).await,
            None => {
                descriptor.warnings.push("DESCRIPTOR_MBID_NOT_FOUND".to_string());
                (None, None)
            }
        };

        if let Some(low) = &low {
            descriptor.sources_used.push("acousticbrainz.low-level".to_string());
            apply_lowlevel(&mut descriptor, low);
        }
        if let Some(high) = &high {
            descriptor.sources_used.push("acousticbrainz.high-level".to_string());
            apply_highlevel(&mut descriptor, high);
        }

        if let Some(track) = self.fetch_deezer_track(source, metadata).await {
            descriptor.sources_used.push("deezer.track".to_string());
            apply_deezer(&mut descriptor, &track);
        }

        if descriptor.energy_proxy.is_none() {
            if let Some(loudness) = descriptor.loudness_proxy {
                descriptor.energy_proxy = Some(energy_from_gain(loudness));
                descriptor
                    .coverage
                    .insert("energy_proxy".to_string(), Coverage::Mapped);
            }
        }

        descriptor.confidence = confidence_from_coverage(&descriptor.coverage);

        if descriptor.sources_used.is_empty() {
            descriptor
                .warnings
                .push("DESCRIPTOR_SOURCES_UNAVAILABLE".to_string());
        }
        if descriptor.confidence < self.config.min_confidence {
            tracing::debug!(
                confidence = descriptor.confidence,
                min = self.config.min_confidence,
                "Descriptor below confidence floor, discarding"
            );
            return Ok(None);
        }

        Ok(Some(descriptor))
    }
}

fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn f64_at(value: &Value, path: &[&str]) -> Option<f64> {
    nested(value, path).and_then(Value::as_f64)
}

pub(crate) fn default_coverage() -> BTreeMap<String, Coverage> {
    COVERAGE_WEIGHTS
        .iter()
        .map(|(field, _)| (field.to_string(), Coverage::Missing))
        .collect()
}

fn apply_lowlevel(descriptor: &mut DescriptorArtifact, low: &Value) {
    if let Some(tempo) = f64_at(low, &["rhythm", "bpm"]) {
        descriptor.tempo_bpm = Some(tempo);
        descriptor.coverage.insert("tempo_bpm".to_string(), Coverage::Direct);
    }
    if let Some(key) = nested(low, &["tonal", "key_key"])
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        descriptor.key = Some(key.to_string());
        descriptor.coverage.insert("key".to_string(), Coverage::Direct);
    }
    match nested(low, &["tonal", "key_scale"]).and_then(Value::as_str) {
        Some("major") => {
            descriptor.mode = KeyMode::Major;
            descriptor.coverage.insert("mode".to_string(), Coverage::Direct);
        }
        Some("minor") => {
            descriptor.mode = KeyMode::Minor;
            descriptor.coverage.insert("mode".to_string(), Coverage::Direct);
        }
        _ => {}
    }

    let loudness = f64_at(low, &["lowlevel", "average_loudness"])
        .or_else(|| f64_at(low, &["lowlevel", "loudness_ebu128", "integrated"]));
    if let Some(loudness) = loudness {
        descriptor.loudness_proxy = Some(loudness);
        descriptor
            .coverage
            .insert("loudness_proxy".to_string(), Coverage::Direct);
    }

    let centroid = f64_at(low, &["lowlevel", "spectral_centroid", "mean"]);
    let complexity = f64_at(low, &["lowlevel", "spectral_complexity", "mean"]);
    descriptor.texture_proxy = TextureProxy {
        spectral_centroid_mean: centroid,
        spectral_complexity_mean: complexity,
    };
    if centroid.is_some() || complexity.is_some() {
        descriptor
            .coverage
            .insert("texture_proxy".to_string(), Coverage::Direct);
    }
}

fn apply_highlevel(descriptor: &mut DescriptorArtifact, high: &Value) {
    if let Some(energy) = f64_at(high, &["highlevel", "mood_party", "all", "party"]) {
        descriptor.energy_proxy = Some(energy);
        descriptor
            .coverage
            .insert("energy_proxy".to_string(), Coverage::Direct);
    }
    if let Some(danceability) = f64_at(high, &["highlevel", "danceability", "all", "danceable"]) {
        descriptor.danceability_proxy = Some(danceability);
        descriptor
            .coverage
            .insert("danceability_proxy".to_string(), Coverage::Direct);
    }
    if let Some(acousticness) = f64_at(high, &["highlevel", "mood_acoustic", "all", "acoustic"]) {
        descriptor.acousticness_proxy = Some(acousticness);
        descriptor
            .coverage
            .insert("acousticness_proxy".to_string(), Coverage::Direct);
    }
    if let Some(instrumental) =
        f64_at(high, &["highlevel", "voice_instrumental", "all", "instrumental"])
    {
        descriptor.instrumentalness_proxy = Some(instrumental);
        descriptor
            .coverage
            .insert("instrumentalness_proxy".to_string(), Coverage::Direct);
    }
}

fn apply_deezer(descriptor: &mut DescriptorArtifact, track: &Value) {
    if descriptor.coverage.get("tempo_bpm") == Some(&Coverage::Missing) {
        if let Some(bpm) = track.get("bpm").and_then(Value::as_f64).filter(|b| *b > 0.0) {
            descriptor.tempo_bpm = Some(bpm);
            descriptor.coverage.insert("tempo_bpm".to_string(), Coverage::Direct);
        }
    }
    if descriptor.coverage.get("loudness_proxy") == Some(&Coverage::Missing) {
        if let Some(gain) = track.get("gain").and_then(Value::as_f64) {
            descriptor.loudness_proxy = Some(gain);
            descriptor
                .coverage
                .insert("loudness_proxy".to_string(), Coverage::Direct);
        }
    }
}

/// Soft energy proxy from a normalized gain/loudness value.
pub(crate) fn energy_from_gain(gain: f64) -> f64 {
    ((gain + GAIN_ENERGY_OFFSET) / GAIN_ENERGY_RANGE).clamp(0.0, 1.0)
}

/// Weighted coverage score: direct 1.0, mapped 0.7, missing 0.0.
pub(crate) fn confidence_from_coverage(coverage: &BTreeMap<String, Coverage>) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (field, weight) in COVERAGE_WEIGHTS {
        denominator += weight;
        let score = match coverage.get(*field) {
            Some(Coverage::Direct) => 1.0,
            Some(Coverage::Mapped) => 0.7,
            _ => 0.0,
        };
        numerator += weight * score;
    }
    if denominator <= 0.0 {
        return 0.0;
    }
    ((numerator / denominator) * 10_000.0).round() / 10_000.0
}
