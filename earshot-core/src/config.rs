//! Engine configuration
//!
//! One explicit `Config` struct, constructed once at process start and
//! passed by reference into the coordinator and orchestrator. Loaded from a
//! TOML file; a missing file yields defaults, a malformed one fails fast.

use crate::error::Error;
use crate::scorer::RankingWeights;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternate config path.
pub const CONFIG_PATH_ENV: &str = "EARSHOT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/earshot.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
    pub retrieval: RetrievalConfig,
    pub spotify: SpotifyConfig,
    pub jamendo: JamendoConfig,
    pub lyrics: LyricsConfig,
    pub descriptors: DescriptorsConfig,
    pub listen: ListenConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root_dir: PathBuf,
    pub sqlite_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./cache"),
            sqlite_path: PathBuf::from("./cache/index.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub ranking_weights: RankingWeights,
    /// Maximum candidates requested from each provider.
    pub max_results: usize,
    /// Deadline for a single provider call, seconds.
    pub provider_timeout_sec: u64,
    /// Deadline for the whole discovery fan-out, seconds.
    pub aggregate_timeout_sec: u64,
    /// TTL for cached discovery results, seconds.
    pub query_ttl_sec: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ranking_weights: RankingWeights::default(),
            max_results: 5,
            provider_timeout_sec: 20,
            aggregate_timeout_sec: 45,
            query_ttl_sec: 604_800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Audio format requested from the extraction tool.
    pub output_format: String,
    /// Deadline for one retrieval attempt, seconds.
    pub timeout_sec: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            output_format: "wav".to_string(),
            timeout_sec: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub enabled: bool,
    /// Environment variable holding the client id.
    pub client_id_env: String,
    /// Environment variable holding the client secret.
    pub client_secret_env: String,
    pub request_timeout_sec: u64,
    pub market: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id_env: "SPOTIFY_CLIENT_ID".to_string(),
            client_secret_env: "SPOTIFY_CLIENT_SECRET".to_string(),
            request_timeout_sec: 10,
            market: "US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JamendoConfig {
    pub enabled: bool,
    /// Environment variable holding the client id.
    pub client_id_env: String,
}

impl Default for JamendoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id_env: "JAMENDO_CLIENT_ID".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub enabled: bool,
    pub request_timeout_sec: u64,
    /// Texts shorter than this are discarded.
    pub min_text_chars: usize,
    /// Texts longer than this are truncated.
    pub max_chars: usize,
    pub allow_asr_fallback: bool,
    pub asr_model_size: String,
    pub include_in_cache: bool,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout_sec: 10,
            min_text_chars: 120,
            max_chars: 12_000,
            allow_asr_fallback: false,
            asr_model_size: "small".to_string(),
            include_in_cache: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DescriptorsConfig {
    pub enabled: bool,
    /// Descriptors below this confidence are discarded.
    pub min_confidence: f64,
    pub request_timeout_sec: u64,
}

impl Default for DescriptorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.45,
            request_timeout_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Default analysis mode when none is requested. An unrecognized value
    /// resolves to `auto` at call time.
    pub default_mode: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            default_mode: "auto".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, the `EARSHOT_CONFIG` environment
    /// variable, or the default location, in that order. A missing file is
    /// not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let resolved: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        if !resolved.exists() {
            tracing::debug!(path = %resolved.display(), "No config file found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&resolved)
            .map_err(|e| Error::Config(format!("read {}: {}", resolved.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {}: {}", resolved.display(), e)))?;

        tracing::info!(path = %resolved.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.discovery.max_results, 5);
        assert_eq!(config.discovery.query_ttl_sec, 604_800);
        assert_eq!(config.retrieval.output_format, "wav");
        assert_eq!(config.spotify.client_id_env, "SPOTIFY_CLIENT_ID");
        assert_eq!(config.lyrics.min_text_chars, 120);
        assert!((config.descriptors.min_confidence - 0.45).abs() < 1e-9);
        assert_eq!(config.listen.default_mode, "auto");
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let toml_text = r#"
            [discovery]
            max_results = 3

            [discovery.ranking_weights]
            title_similarity = 0.5
            title_token_overlap = 0.5
            artist_similarity = 0.0
            duration_sanity = 0.0
            containment_bonus = 0.0

            [spotify]
            enabled = false
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.discovery.max_results, 3);
        assert!(!config.spotify.enabled);
        assert!(config.jamendo.enabled);
        assert_eq!(config.listen.default_mode, "auto");
        let resolved = config.discovery.ranking_weights.resolved();
        assert!((resolved.title_similarity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("earshot.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let result = Config::load(Some(&path));
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.discovery.max_results, 5);
    }
}
