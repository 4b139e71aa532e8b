//! Lyric sentiment and theme analysis
//!
//! Keyword-driven: theme buckets matched by substring, polarity and
//! intensity from positive/negative token counts. Cheap enough to run on
//! every lyrics artifact; results are cached by text hash.

use crate::cache::CacheStore;
use crate::models::{LyricsAnalysisResult, LyricsArtifact, Polarity};
use std::collections::HashMap;

const THEME_KEYWORDS: &[(&str, &[&str])] = &[
    ("love", &["love", "heart", "kiss", "romance", "darling"]),
    ("loss", &["gone", "leave", "lost", "grief", "empty", "alone"]),
    ("hope", &["rise", "light", "tomorrow", "heal", "hold on"]),
    ("pain", &["hurt", "bleed", "broken", "cry", "wound"]),
    ("freedom", &["free", "escape", "wings", "open road", "fly"]),
    ("identity", &["who am i", "myself", "name", "mirror", "be me"]),
];

const POSITIVE_WORDS: &[&str] = &[
    "love", "hope", "alive", "shine", "joy", "dream", "heal", "peace", "smile",
];
const NEGATIVE_WORDS: &[&str] = &[
    "pain", "hurt", "lost", "alone", "dark", "broken", "cry", "fear", "empty",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn extract_themes(text: &str) -> Vec<String> {
    let text_lower = text.to_lowercase();
    let hits: Vec<String> = THEME_KEYWORDS
        .iter()
        .filter(|(_, keys)| keys.iter().any(|k| text_lower.contains(k)))
        .map(|(theme, _)| theme.to_string())
        .collect();
    if !hits.is_empty() {
        return hits.into_iter().take(3).collect();
    }

    // Fallback: most frequent longer tokens.
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(word, _)| word.chars().count() > 4)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let fallback: Vec<String> = ranked.into_iter().take(3).map(|(word, _)| word).collect();
    if fallback.is_empty() {
        vec!["reflection".to_string()]
    } else {
        fallback
    }
}

fn pick_evidence_lines(text: &str, limit: usize) -> Vec<String> {
    let raw_lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if raw_lines.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, String)> = Vec::new();
    for line in &raw_lines {
        let tokens = tokenize(line);
        if tokens.len() < 3 {
            continue;
        }
        let pos = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count();
        let neg = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count();
        let clipped: String = line.chars().take(160).collect();
        scored.push((pos + neg, clipped));
    }
    if scored.is_empty() {
        return raw_lines.iter().take(limit).map(|l| l.to_string()).collect();
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, line)| line).collect()
}

fn polarity_and_intensity(text: &str) -> (Polarity, f64) {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return (Polarity::Neutral, 0.0);
    }
    let pos = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count() as i64;
    let neg = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count() as i64;
    let total = (pos + neg).max(1) as f64;
    let intensity = (total / (tokens.len() as f64 / 8.0).max(12.0)).min(1.0);
    let intensity = round3(intensity);

    if pos == 0 && neg == 0 {
        return (Polarity::Neutral, intensity);
    }
    if (pos - neg).abs() <= 1 {
        return (Polarity::Mixed, intensity);
    }
    let polarity = if pos > neg { Polarity::Positive } else { Polarity::Negative };
    (polarity, intensity)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Analyze a lyrics artifact. Returns `None` when there is no text.
pub fn analyze_lyrics(lyrics: &LyricsArtifact) -> Option<LyricsAnalysisResult> {
    let text = lyrics.text.as_deref()?;

    let themes = extract_themes(text);
    let (polarity, intensity) = polarity_and_intensity(text);
    let evidence = pick_evidence_lines(text, 3);

    let length_factor = (text.chars().count() as f64 / 1200.0).min(1.0);
    let signal_factor = match polarity {
        Polarity::Neutral | Polarity::Mixed => 0.75,
        _ => 0.9,
    };
    let confidence = round3((length_factor * signal_factor).clamp(0.2, 1.0));

    let summary = format!(
        "The lyrics feel {}, centered on {}. Emotional intensity reads around {:.2} with confidence {:.2}.",
        polarity,
        themes.iter().take(2).cloned().collect::<Vec<_>>().join(", "),
        intensity,
        confidence
    );

    Some(LyricsAnalysisResult {
        themes,
        emotional_polarity: polarity,
        intensity: Some(intensity),
        confidence,
        evidence_lines: evidence,
        summary,
        warnings: Vec::new(),
    })
}

/// Cache-checked analysis keyed by text hash.
pub async fn analyze_lyrics_cached(
    lyrics: &LyricsArtifact,
    cache: &CacheStore,
) -> Option<LyricsAnalysisResult> {
    let text = lyrics.text.as_deref()?;
    let lyrics_key = CacheStore::normalize_key(text);

    if let Ok(Some(payload)) = cache.get_lyrics_analysis(&lyrics_key).await {
        if let Ok(cached) = serde_json::from_str::<LyricsAnalysisResult>(&payload) {
            tracing::debug!(lyrics_key = %lyrics_key, "Lyric analysis cache hit");
            return Some(cached);
        }
    }

    let result = analyze_lyrics(lyrics)?;
    match serde_json::to_string(&result) {
        Ok(payload) => {
            if let Err(e) = cache.put_lyrics_analysis(&lyrics_key, &payload).await {
                tracing::warn!(error = %e, "Failed to cache lyric analysis");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to serialize lyric analysis"),
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LyricsOrigin;

    fn artifact(text: &str) -> LyricsArtifact {
        LyricsArtifact {
            source: LyricsOrigin::Lrclib,
            text: Some(text.to_string()),
            ..LyricsArtifact::default()
        }
    }

    #[test]
    fn no_text_yields_none() {
        assert!(analyze_lyrics(&LyricsArtifact::default()).is_none());
    }

    #[test]
    fn negative_lyrics_detected() {
        let text = "I'm broken and alone tonight\nthe dark keeps closing in on me\nall this pain and hurt won't leave";
        let out = analyze_lyrics(&artifact(text)).unwrap();
        assert_eq!(out.emotional_polarity, Polarity::Negative);
        assert!(out.themes.contains(&"loss".to_string()) || out.themes.contains(&"pain".to_string()));
        assert!(!out.evidence_lines.is_empty());
        assert!(out.confidence >= 0.2);
    }

    #[test]
    fn positive_lyrics_detected() {
        let text = "love and hope keep me alive\nwe shine together in the light\ndream of peace and joy tonight";
        let out = analyze_lyrics(&artifact(text)).unwrap();
        assert_eq!(out.emotional_polarity, Polarity::Positive);
    }

    #[test]
    fn neutral_text_gets_fallback_theme() {
        let text = "driving down the highway in september\nwatching all the traffic passing slowly";
        let out = analyze_lyrics(&artifact(text)).unwrap();
        assert_eq!(out.emotional_polarity, Polarity::Neutral);
        assert!(!out.themes.is_empty());
    }

    #[test]
    fn evidence_lines_are_clipped() {
        let long_line = format!("pain {}", "x".repeat(300));
        let out = analyze_lyrics(&artifact(&long_line)).unwrap();
        for line in &out.evidence_lines {
            assert!(line.chars().count() <= 160);
        }
    }

    #[tokio::test]
    async fn cached_analysis_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open_at(
            &dir.path().join("cache"),
            &dir.path().join("cache/index.sqlite"),
        )
        .await
        .unwrap();

        let lyrics = artifact("love and hope keep me alive tonight under city lights");
        let first = analyze_lyrics_cached(&lyrics, &cache).await.unwrap();
        let second = analyze_lyrics_cached(&lyrics, &cache).await.unwrap();
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.themes, second.themes);
    }
}
