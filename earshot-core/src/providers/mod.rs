//! Provider adapters
//!
//! One adapter per external source behind a common capability interface.
//! Each adapter converts its transport failures into typed, provider-scoped
//! `DiscoveryError`s; nothing raw escapes. The registry returns adapters in
//! fixed discovery priority order, omitting providers disabled in
//! configuration.

mod jamendo;
mod musicbrainz;
mod spotify;
mod youtube_api;
mod ytdlp;

pub use jamendo::JamendoProvider;
pub use musicbrainz::MusicbrainzProvider;
pub use spotify::SpotifyProvider;
pub use youtube_api::YoutubeApiProvider;
pub use ytdlp::YtdlpProvider;

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::models::{Provider, SourceCandidate};
use async_trait::async_trait;
use std::sync::Arc;

pub(crate) const USER_AGENT: &str = "earshot/0.1 (https://github.com/earshot/earshot)";

/// Capability interface for one candidate source.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Search the source for candidates. Returns a typed, provider-scoped
    /// error; never panics on transport failures.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceCandidate>, DiscoveryError>;
}

/// Non-empty environment variable lookup.
pub(crate) fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Adapters for every configured provider, in discovery priority order.
pub fn provider_registry(config: &Config) -> Result<Vec<Arc<dyn ProviderAdapter>>, DiscoveryError> {
    let weights = config.discovery.ranking_weights;
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
        Arc::new(YtdlpProvider::new(weights)),
        Arc::new(YoutubeApiProvider::new(weights, config.discovery.provider_timeout_sec)?),
    ];
    if config.spotify.enabled {
        adapters.push(Arc::new(SpotifyProvider::new(config.spotify.clone(), weights)?));
    }
    if config.jamendo.enabled {
        adapters.push(Arc::new(JamendoProvider::new(
            config.jamendo.clone(),
            weights,
            config.discovery.provider_timeout_sec,
        )?));
    }
    adapters.push(Arc::new(MusicbrainzProvider::new(weights)?));
    Ok(adapters)
}

/// Providers excluded from the registry by configuration, for remediation
/// hints in not-found errors.
pub fn disabled_providers(config: &Config) -> Vec<Provider> {
    let mut disabled = Vec::new();
    if !config.spotify.enabled {
        disabled.push(Provider::Spotify);
    }
    if !config.jamendo.enabled {
        disabled.push(Provider::Jamendo);
    }
    disabled
}

/// Sort candidates by descending confidence; adapters return their best
/// match first.
pub(crate) fn sort_by_confidence(candidates: &mut [SourceCandidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn registry_respects_disabled_providers() {
        let mut config = Config::default();
        config.spotify.enabled = false;
        config.jamendo.enabled = false;

        let adapters = provider_registry(&config).unwrap();
        let providers: Vec<Provider> = adapters.iter().map(|a| a.provider()).collect();
        assert_eq!(
            providers,
            vec![Provider::Ytdlp, Provider::YoutubeApi, Provider::Musicbrainz]
        );
        assert_eq!(
            disabled_providers(&config),
            vec![Provider::Spotify, Provider::Jamendo]
        );
    }

    #[test]
    fn full_registry_follows_discovery_order() {
        let config = Config::default();
        let adapters = provider_registry(&config).unwrap();
        let providers: Vec<Provider> = adapters.iter().map(|a| a.provider()).collect();
        assert_eq!(providers, Provider::DISCOVERY_ORDER.to_vec());
    }
}
