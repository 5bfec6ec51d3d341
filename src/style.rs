//! Conversion style configuration and the archival compliance policy.
//!
//! Both are immutable value objects: built once per conversion (from CLI
//! flags merged over the config file) and handed read-only to every
//! pipeline stage.

use std::path::PathBuf;

/// Style settings for one conversion.
#[derive(Debug, Clone)]
pub struct StyleConfig {
    /// Regular TrueType font file. `None` falls back to the builtin
    /// Helvetica metrics (not embedded, see [`CompliancePolicy`]).
    pub font_regular: Option<PathBuf>,
    /// Bold TrueType font file for header labels. Optional; labels render
    /// in the regular face without it.
    pub font_bold: Option<PathBuf>,
    /// Body font size in points.
    pub font_size_pt: f32,
    /// Uniform page margin in millimetres.
    pub margins_mm: f32,
    /// ICC profile for the output intent. `None` produces a document
    /// without a color declaration.
    pub icc_profile: Option<PathBuf>,
    /// Embed the raw source message as an attachment.
    pub embed_original: bool,
    /// Embed inline parts (images referenced from the body) as standalone
    /// attachments in addition to listing them in the manifest.
    pub embed_inline_as_attachment: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            font_regular: None,
            font_bold: None,
            font_size_pt: 11.0,
            margins_mm: 20.0,
            icc_profile: None,
            embed_original: true,
            embed_inline_as_attachment: true,
        }
    }
}

/// The archival profile a conversion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceTarget {
    /// PDF/A-3B: output intent, embedded fonts, XMP conformance claim.
    PdfA3b,
    /// Plain PDF with embedded files, no conformance claim.
    None,
}

/// What the targeted profile mandates.
///
/// Rules live here as data so a stricter or looser profile is a new
/// instance, not a new code path.
#[derive(Debug, Clone, Copy)]
pub struct CompliancePolicy {
    pub target: ComplianceTarget,
    /// An ICC output intent must be present.
    pub requires_output_intent: bool,
    /// Every font referenced by a page must be embedded.
    pub requires_embedded_fonts: bool,
}

impl CompliancePolicy {
    /// The strict archival profile.
    pub fn pdfa_3b() -> Self {
        Self {
            target: ComplianceTarget::PdfA3b,
            requires_output_intent: true,
            requires_embedded_fonts: true,
        }
    }

    /// No conformance claim; everything optional.
    pub fn relaxed() -> Self {
        Self {
            target: ComplianceTarget::None,
            requires_output_intent: false,
            requires_embedded_fonts: false,
        }
    }

    /// Derive the effective policy for a style. Header labels always set
    /// text in the bold face, so the strict claim needs both font files
    /// in addition to the ICC profile; anything less produces the
    /// document without the claim rather than rejecting it.
    pub fn for_style(style: &StyleConfig) -> Self {
        if style.icc_profile.is_some()
            && style.font_regular.is_some()
            && style.font_bold.is_some()
        {
            Self::pdfa_3b()
        } else {
            Self::relaxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_downgrades_without_icc() {
        let style = StyleConfig {
            font_regular: Some("font.ttf".into()),
            ..StyleConfig::default()
        };
        assert_eq!(
            CompliancePolicy::for_style(&style).target,
            ComplianceTarget::None
        );
    }

    #[test]
    fn test_policy_downgrades_without_bold_font() {
        let style = StyleConfig {
            font_regular: Some("font.ttf".into()),
            icc_profile: Some("srgb.icc".into()),
            ..StyleConfig::default()
        };
        assert_eq!(
            CompliancePolicy::for_style(&style).target,
            ComplianceTarget::None
        );
    }

    #[test]
    fn test_policy_strict_with_fonts_and_icc() {
        let style = StyleConfig {
            font_regular: Some("font.ttf".into()),
            font_bold: Some("font-bold.ttf".into()),
            icc_profile: Some("srgb.icc".into()),
            ..StyleConfig::default()
        };
        let policy = CompliancePolicy::for_style(&style);
        assert_eq!(policy.target, ComplianceTarget::PdfA3b);
        assert!(policy.requires_output_intent);
        assert!(policy.requires_embedded_fonts);
    }
}
