//! Audio feature analysis boundary
//!
//! Feature extraction itself is an external collaborator. The default
//! implementation shells out to `essentia_streaming_extractor_music`, maps
//! its JSON output into a `FeatureResult`, and caches the normalized
//! features by audio-path hash so repeat listens skip the extractor.

use crate::cache::CacheStore;
use crate::error::AnalysisError;
use crate::models::{AudioArtifact, FeatureResult, KeyMode};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

const EXTRACTOR_BINARY: &str = "essentia_streaming_extractor_music";

/// Boundary for the feature-analysis collaborator.
#[async_trait]
pub trait FeatureAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        audio: &AudioArtifact,
        cache: &CacheStore,
    ) -> Result<FeatureResult, AnalysisError>;
}

/// Default analyzer backed by the Essentia music extractor tool.
pub struct EssentiaAnalyzer {
    binary: String,
}

impl EssentiaAnalyzer {
    pub fn new() -> Self {
        Self {
            binary: EXTRACTOR_BINARY.to_string(),
        }
    }
}

impl Default for EssentiaAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureAnalyzer for EssentiaAnalyzer {
    async fn analyze(
        &self,
        audio: &AudioArtifact,
        cache: &CacheStore,
    ) -> Result<FeatureResult, AnalysisError> {
        let audio_key = CacheStore::normalize_key(&audio.path);

        if let Ok(Some(feature_path)) = cache.get_feature_path(&audio_key).await {
            match tokio::fs::read_to_string(&feature_path).await {
                Ok(payload) => match serde_json::from_str::<FeatureResult>(&payload) {
                    Ok(features) => {
                        tracing::debug!(audio_key = %audio_key, "Feature cache hit");
                        return Ok(features);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding unreadable cached features");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Cached feature file unreadable");
                }
            }
        }

        if !std::path::Path::new(&audio.path).exists() {
            return Err(AnalysisError::new(
                "ANALYSIS_AUDIO_MISSING",
                format!("audio file not found: {}", audio.path),
            ));
        }

        let extractor_output = cache
            .feature_dir
            .join(format!("{}.extractor.json", audio_key));

        tracing::debug!(
            audio = %audio.path,
            output = %extractor_output.display(),
            "Running feature extraction"
        );

        let output = Command::new(&self.binary)
            .arg(&audio.path)
            .arg(&extractor_output)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AnalysisError::new(
                        "ANALYSIS_TOOL_MISSING",
                        format!("{} is not installed or not on PATH", EXTRACTOR_BINARY),
                    )
                } else {
                    AnalysisError::new(
                        "ANALYSIS_FAILED",
                        format!("failed to spawn feature extractor: {}", e),
                    )
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::new(
                "ANALYSIS_FAILED",
                format!("feature extractor failed: {}", stderr.trim()),
            ));
        }

        let payload = tokio::fs::read_to_string(&extractor_output)
            .await
            .map_err(|e| {
                AnalysisError::new(
                    "ANALYSIS_BAD_OUTPUT",
                    format!("extractor produced no readable output: {}", e),
                )
            })?;
        let value: Value = serde_json::from_str(&payload).map_err(|e| {
            AnalysisError::new(
                "ANALYSIS_BAD_OUTPUT",
                format!("extractor output is not valid JSON: {}", e),
            )
        })?;

        let features = features_from_extractor(&value);

        // Persist the normalized features, not the raw extractor dump.
        let feature_path = cache.feature_dir.join(format!("{}.json", audio_key));
        match serde_json::to_string_pretty(&features) {
            Ok(serialized) => {
                if let Err(e) = tokio::fs::write(&feature_path, serialized).await {
                    tracing::warn!(error = %e, "Failed to write feature cache file");
                } else if let Err(e) = cache
                    .put_feature_path(&audio_key, &feature_path.to_string_lossy())
                    .await
                {
                    tracing::warn!(error = %e, "Failed to record feature path in cache");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize features for caching");
            }
        }

        Ok(features)
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

/// Map the extractor's JSON into the normalized feature set.
pub(crate) fn features_from_extractor(value: &Value) -> FeatureResult {
    let mut warnings = Vec::new();

    let tempo_bpm = f64_at(value, &["rhythm", "bpm"]);
    if tempo_bpm.is_none() {
        warnings.push("FEATURES_TEMPO_MISSING".to_string());
    }

    let key = nested(value, &["tonal", "key_key"])
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let mode = match nested(value, &["tonal", "key_scale"]).and_then(Value::as_str) {
        Some("major") => KeyMode::Major,
        Some("minor") => KeyMode::Minor,
        _ => KeyMode::Unknown,
    };

    let mut optional_features = std::collections::BTreeMap::new();
    if let Some(duration) = f64_at(value, &["metadata", "audio_properties", "length"]) {
        optional_features.insert("duration_sec".to_string(), Value::from(duration));
    }
    if let Some(danceability) = f64_at(value, &["rhythm", "danceability"]) {
        optional_features.insert("danceability".to_string(), Value::from(danceability));
    }

    FeatureResult {
        tempo_bpm,
        key,
        mode,
        loudness_rms: f64_at(value, &["lowlevel", "average_loudness"]),
        dynamic_range: f64_at(value, &["lowlevel", "dynamic_complexity"]),
        energy_mean: f64_at(value, &["lowlevel", "spectral_energy", "mean"]),
        spectral_centroid_mean: f64_at(value, &["lowlevel", "spectral_centroid", "mean"]),
        onset_density: f64_at(value, &["rhythm", "onset_rate"]),
        section_map: Vec::new(),
        optional_features,
        warnings,
    }
}
