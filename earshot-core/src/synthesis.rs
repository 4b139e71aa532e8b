//! Synthesis builders
//!
//! One builder per evidence tier: audio features, catalog descriptors, or
//! bare metadata. Each produces an observation pair, highlight bullets,
//! uncertainty notes, and a grounded prompt for a downstream text model.
//! The listen orchestrator picks the builder matching the final analysis
//! mode.

use crate::models::{
    DescriptorArtifact, FeatureResult, LyricsAnalysisResult, MetadataArtifact, Provider,
    SourceCandidate, SynthesisResult,
};

/// Audio-grounded synthesis from extracted features.
pub fn build_audio_synthesis(
    source: &SourceCandidate,
    features: &FeatureResult,
    lyrics_analysis: Option<&LyricsAnalysisResult>,
) -> SynthesisResult {
    let tempo = features.tempo_bpm.unwrap_or(0.0);
    let energy = features.energy_mean.unwrap_or(0.0);

    let mood = if tempo > 120.0 && energy > 0.08 {
        "driving"
    } else if tempo < 90.0 && energy < 0.06 {
        "reflective"
    } else {
        "restrained"
    };

    let key_label = features.key.as_deref().unwrap_or("unknown");
    let highlights = vec![
        format!("Tempo sits around {:.1} BPM.", tempo),
        format!("Estimated key center is {} {}.", key_label, features.mode),
        format!("Perceived energy profile feels {}.", mood),
    ];

    let mut uncertainty = Vec::new();
    if source.provider == Provider::Musicbrainz || source.provider == Provider::Spotify {
        uncertainty.push(
            "Only metadata was available from the source provider; audio came from a fallback source."
                .to_string(),
        );
    }
    if features.section_map.is_empty() {
        uncertainty.push("Section segmentation confidence is low.".to_string());
    }
    if lyrics_analysis.is_none() {
        uncertainty
            .push("Lyrics were unavailable or insufficient for textual-feeling analysis.".to_string());
    }

    let natural = format!(
        "This listen reads as {}, with a pulse near {:.0} BPM and a tonal center around {} {}. \
         The energy contour suggests deliberate dynamic shaping rather than flat loudness, and \
         the spectral balance points to a warm-mid texture with periodic transient lift.",
        mood,
        tempo,
        features.key.as_deref().unwrap_or("an uncertain key"),
        features.mode
    );

    let (lyric_observation, combined_observation) = combine_with_lyrics(
        &natural,
        lyrics_analysis,
        "either reinforces or gently contrasts the sonic mood to create a fuller emotional arc",
    );

    let prompt = format!(
        "You are listening to a song as a careful human critic.\n\
         Use only the provided structured features.\n\
         Clearly separate direct evidence from interpretation.\n\
         Do not invent lyrics or artist intent.\n\n\
         Song:\n\
         - Title: {}\n\
         - Artist guess: {}\n\
         - Source confidence: {:.2}\n\n\
         Features:\n\
         - Tempo BPM: {:.2}\n\
         - Key/Mode: {} {}\n\
         - RMS loudness: {:.5}\n\
         - Dynamic range: {:.5}\n\
         - Energy mean: {:.5}\n\
         - Spectral centroid mean: {:.2}\n\
         - Onset density: {:.5}\n\
         - Section count: {}\n\n\
         Respond with:\n\
         1) Immediate feel\n\
         2) Rhythm and energy journey\n\
         3) Harmonic color and tension/release\n\
         4) Production texture and space\n\
         5) Confidence and uncertainty notes\n",
        source.title,
        source.artist_guess.as_deref().unwrap_or("unknown"),
        source.confidence,
        tempo,
        key_label,
        features.mode,
        features.loudness_rms.unwrap_or(0.0),
        features.dynamic_range.unwrap_or(0.0),
        energy,
        features.spectral_centroid_mean.unwrap_or(0.0),
        features.onset_density.unwrap_or(0.0),
        features.section_map.len(),
    );

    SynthesisResult {
        natural_observation: natural,
        lyric_observation,
        combined_observation,
        highlights,
        uncertainty_notes: uncertainty,
        prompt_for_text_model: prompt,
    }
}

/// Descriptor-grounded synthesis from catalog descriptor databases.
pub fn build_descriptor_synthesis(
    source: &SourceCandidate,
    descriptor: &DescriptorArtifact,
    lyrics_analysis: Option<&LyricsAnalysisResult>,
) -> SynthesisResult {
    let tonal = format!("{} {}", descriptor.key.as_deref().unwrap_or("unknown"), descriptor.mode);
    let centroid = descriptor.texture_proxy.spectral_centroid_mean;
    let complexity = descriptor.texture_proxy.spectral_complexity_mean;

    let highlights = vec![
        match descriptor.tempo_bpm {
            Some(tempo) => format!("Tempo estimate: {:.1} BPM.", tempo),
            None => "Tempo estimate unavailable.".to_string(),
        },
        format!("Key/mode estimate: {}.", tonal),
        format!("Descriptor confidence: {:.2}.", descriptor.confidence),
    ];

    let texture_phrase = if centroid.is_some() || complexity.is_some() {
        if centroid.unwrap_or(0.0) > 1500.0 {
            "texture leans bright and layered"
        } else {
            "texture leans warm and focused"
        }
    } else {
        "texture descriptors are limited"
    };

    let tempo_phrase = match descriptor.tempo_bpm {
        Some(tempo) => format!("a pulse near {:.0} BPM", tempo),
        None => "an unestimated pulse".to_string(),
    };
    let natural = format!(
        "Descriptor-level analysis suggests {} and tonal center around {}. Energy proxy sits near \
         {:.2}, and {}. This read uses catalog-linked descriptor databases rather than direct \
         waveform extraction.",
        tempo_phrase,
        tonal,
        descriptor.energy_proxy.unwrap_or(0.0),
        texture_phrase
    );

    let mut uncertainty =
        vec!["Derived from external descriptor datasets, not direct local audio analysis.".to_string()];
    let missing: Vec<&str> = descriptor
        .coverage
        .iter()
        .filter(|(_, c)| **c == crate::models::Coverage::Missing)
        .map(|(field, _)| field.as_str())
        .take(4)
        .collect();
    if !missing.is_empty() {
        uncertainty.push(format!("Missing descriptor fields: {}.", missing.join(", ")));
    }

    let (lyric_observation, combined_observation) = combine_with_lyrics(
        &natural,
        lyrics_analysis,
        "adds an emotional layer to the descriptor-based sonic read",
    );
    if lyrics_analysis.is_none() {
        uncertainty
            .push("Lyrics were unavailable or insufficient for textual-feeling analysis.".to_string());
    }

    let prompt = format!(
        "You are analyzing a song from precomputed descriptors and optional lyric evidence.\n\
         Separate direct descriptor evidence from interpretation.\n\
         Title: {}\n\
         Tempo: {}\n\
         Key/Mode: {}\n\
         Energy proxy: {}\n\
         Descriptor confidence: {:.2}\n\
         Respond with:\n\
         1) Rhythm/motion feel\n\
         2) Tonal and texture color\n\
         3) Confidence and missing data caveats\n",
        source.title,
        descriptor
            .tempo_bpm
            .map(|t| format!("{:.1}", t))
            .unwrap_or_else(|| "unknown".to_string()),
        tonal,
        descriptor
            .energy_proxy
            .map(|e| format!("{:.2}", e))
            .unwrap_or_else(|| "unknown".to_string()),
        descriptor.confidence,
    );

    SynthesisResult {
        natural_observation: natural,
        lyric_observation,
        combined_observation,
        highlights,
        uncertainty_notes: uncertainty,
        prompt_for_text_model: prompt,
    }
}

/// Metadata-grounded synthesis when no acoustic evidence exists at all.
pub fn build_metadata_synthesis(
    source: &SourceCandidate,
    metadata: Option<&MetadataArtifact>,
    lyrics_analysis: Option<&LyricsAnalysisResult>,
) -> SynthesisResult {
    let artist = metadata
        .filter(|m| !m.artists.is_empty())
        .map(|m| m.artists.join(", "))
        .or_else(|| source.artist_guess.clone())
        .unwrap_or_else(|| "unknown artist".to_string());
    let duration_text = metadata
        .and_then(|m| m.duration_sec)
        .map(|d| format!("{}:{:02}", d / 60, d % 60))
        .unwrap_or_else(|| "unknown duration".to_string());
    let release_text = metadata
        .and_then(|m| m.release_date.clone())
        .unwrap_or_else(|| "unknown release date".to_string());
    let source_label = metadata
        .map(|m| m.source.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let natural = format!(
        "This interpretation is metadata-led for '{}' by {}. Catalog cues suggest a track length \
         around {} with release context {}, so the observation focuses on framing and lyrical \
         affect rather than acoustic evidence.",
        source.title, artist, duration_text, release_text
    );

    let highlights = vec![
        format!("Metadata source: {}.", source_label),
        format!("Track duration: {}.", duration_text),
        "Acoustic feature extraction was not available.".to_string(),
    ];

    let mut uncertainty = vec![
        "No direct audio analysis; interpretation is metadata/lyrics-based.".to_string(),
        "Tempo/key/energy/timbre observations are intentionally omitted.".to_string(),
    ];

    let (lyric_observation, combined_observation) = combine_with_lyrics(
        &natural,
        lyrics_analysis,
        "adds an emotional signal to this metadata-based reading",
    );
    if lyrics_analysis.is_none() {
        uncertainty
            .push("Lyrics were unavailable or insufficient for textual-feeling analysis.".to_string());
    }

    let prompt = format!(
        "You are analyzing a song with metadata and optional lyric evidence only.\n\
         Do not infer acoustic properties (tempo, key, timbre, dynamics).\n\
         Song title: {}\n\
         Artist: {}\n\
         Release date: {}\n\
         Duration: {}\n\
         Source confidence: {:.2}\n\
         Respond with:\n\
         1) Contextual framing from metadata\n\
         2) Lyric emotional reading (if present)\n\
         3) Explicit uncertainty due to no audio analysis\n",
        source.title, artist, release_text, duration_text, source.confidence,
    );

    SynthesisResult {
        natural_observation: natural,
        lyric_observation,
        combined_observation,
        highlights,
        uncertainty_notes: uncertainty,
        prompt_for_text_model: prompt,
    }
}

/// Shared lyric-weaving: observation sentence plus a combined rendering.
fn combine_with_lyrics(
    natural: &str,
    lyrics_analysis: Option<&LyricsAnalysisResult>,
    framing: &str,
) -> (Option<String>, String) {
    match lyrics_analysis {
        Some(analysis) => {
            let themes = analysis
                .themes
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let lyric = format!(
                "Lyrically, the text feels {}, touching themes like {}. The wording suggests an \
                 intensity around {:.2}.",
                analysis.emotional_polarity,
                themes,
                analysis.intensity.unwrap_or(0.0)
            );
            let combined = format!(
                "{} Lyrically, it leans {}, which {}.",
                natural, analysis.emotional_polarity, framing
            );
            (Some(lyric), combined)
        }
        None => (None, natural.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeyMode, Polarity, SourceType};
    use serde_json::Value;

    fn source(provider: Provider) -> SourceCandidate {
        SourceCandidate {
            provider,
            source_type: SourceType::AudioRetrievable,
            source_id: "abc".to_string(),
            title: "Good News".to_string(),
            artist_guess: Some("Mac Miller".to_string()),
            duration_sec: Some(332),
            url: None,
            confidence: 0.92,
            raw: Value::Null,
        }
    }

    fn features(tempo: f64, energy: f64) -> FeatureResult {
        FeatureResult {
            tempo_bpm: Some(tempo),
            key: Some("C".to_string()),
            mode: KeyMode::Major,
            energy_mean: Some(energy),
            ..FeatureResult::default()
        }
    }

    #[test]
    fn audio_synthesis_mood_thresholds() {
        let src = source(Provider::Ytdlp);
        let driving = build_audio_synthesis(&src, &features(130.0, 0.1), None);
        assert!(driving.natural_observation.contains("driving"));

        let reflective = build_audio_synthesis(&src, &features(80.0, 0.03), None);
        assert!(reflective.natural_observation.contains("reflective"));

        let restrained = build_audio_synthesis(&src, &features(100.0, 0.07), None);
        assert!(restrained.natural_observation.contains("restrained"));
    }

    #[test]
    fn audio_synthesis_notes_missing_lyrics() {
        let out = build_audio_synthesis(&source(Provider::Ytdlp), &features(100.0, 0.05), None);
        assert!(out.lyric_observation.is_none());
        assert!(out
            .uncertainty_notes
            .iter()
            .any(|n| n.contains("Lyrics were unavailable")));
        assert!(out.prompt_for_text_model.contains("Good News"));
    }

    #[test]
    fn lyric_analysis_produces_combined_observation() {
        let analysis = LyricsAnalysisResult {
            themes: vec!["loss".to_string(), "hope".to_string()],
            emotional_polarity: Polarity::Mixed,
            intensity: Some(0.4),
            confidence: 0.7,
            ..LyricsAnalysisResult::default()
        };
        let out =
            build_audio_synthesis(&source(Provider::Ytdlp), &features(100.0, 0.05), Some(&analysis));
        let lyric = out.lyric_observation.unwrap();
        assert!(lyric.contains("mixed"));
        assert!(lyric.contains("loss, hope"));
        assert!(out.combined_observation.contains("leans mixed"));
    }

    #[test]
    fn descriptor_synthesis_reports_missing_fields() {
        let descriptor = DescriptorArtifact {
            tempo_bpm: Some(92.0),
            key: Some("D".to_string()),
            mode: KeyMode::Minor,
            energy_proxy: Some(0.5),
            confidence: 0.8,
            coverage: crate::descriptor::default_coverage(),
            ..DescriptorArtifact::default()
        };
        let out = build_descriptor_synthesis(&source(Provider::Spotify), &descriptor, None);
        assert!(out.natural_observation.contains("92"));
        assert!(out
            .uncertainty_notes
            .iter()
            .any(|n| n.contains("Missing descriptor fields")));
        assert!(out.highlights.iter().any(|h| h.contains("0.80")));
    }

    #[test]
    fn metadata_synthesis_formats_duration() {
        let metadata = MetadataArtifact {
            source: "spotify".to_string(),
            title: "Good News".to_string(),
            artists: vec!["Mac Miller".to_string()],
            album: Some("Circles".to_string()),
            release_date: Some("2020-01-17".to_string()),
            isrc: None,
            popularity: Some(80),
            duration_sec: Some(332),
        };
        let out = build_metadata_synthesis(&source(Provider::Spotify), Some(&metadata), None);
        assert!(out.natural_observation.contains("5:32"));
        assert!(out.natural_observation.contains("2020-01-17"));
        assert!(out
            .uncertainty_notes
            .iter()
            .any(|n| n.contains("No direct audio analysis")));
    }

    #[test]
    fn metadata_synthesis_survives_absent_metadata() {
        let out = build_metadata_synthesis(&source(Provider::Spotify), None, None);
        assert!(out.natural_observation.contains("unknown duration"));
        assert!(out.highlights.iter().any(|h| h.contains("unknown")));
    }
}
