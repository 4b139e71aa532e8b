//! Analysis mode resolution
//!
//! Pure precedence rule: explicit request, then configured default, then
//! `auto`. Unrecognized values are ignored rather than rejected.

use crate::models::ListenMode;

/// Resolve the effective analysis mode for one listen call.
pub fn resolve_mode(explicit: Option<&str>, configured_default: &str) -> ListenMode {
    if let Some(value) = explicit {
        if let Some(mode) = ListenMode::parse(value) {
            return mode;
        }
        tracing::debug!(requested = %value, "Ignoring unrecognized analysis mode");
    }
    ListenMode::parse(configured_default).unwrap_or(ListenMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_mode_wins() {
        assert_eq!(resolve_mode(Some("full_audio"), "auto"), ListenMode::FullAudio);
        assert_eq!(resolve_mode(Some("descriptor_only"), "full_audio"), ListenMode::DescriptorOnly);
    }

    #[test]
    fn unrecognized_explicit_falls_back_to_configured_default() {
        assert_eq!(resolve_mode(Some("vibes"), "metadata_only"), ListenMode::MetadataOnly);
    }

    #[test]
    fn unrecognized_default_falls_back_to_auto() {
        assert_eq!(resolve_mode(None, "whatever"), ListenMode::Auto);
        assert_eq!(resolve_mode(Some("nope"), ""), ListenMode::Auto);
    }

    #[test]
    fn no_explicit_uses_configured_default() {
        assert_eq!(resolve_mode(None, "metadata_only"), ListenMode::MetadataOnly);
    }
}
