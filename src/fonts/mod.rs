//! Font resources for page layout and embedding.
//!
//! Two kinds of resource: a subset TrueType font built from a file on
//! disk, or the builtin Helvetica metrics used when no font is supplied.
//! The builtin variant is not embedded, so documents using it cannot
//! claim the strict archival profile.

pub mod builtin;
pub mod cache;
pub mod subset;

use std::collections::BTreeSet;

use crate::error::{ArchiveError, Result};
use crate::style::StyleConfig;
use cache::FontCache;

/// Which face a text run is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Regular,
    Bold,
}

/// A font ready for layout and assembly.
#[derive(Debug)]
pub struct FontResource {
    /// PDF resource name the content streams reference (`F1`, `F2`).
    pub id: &'static str,
    pub kind: FontKind,
}

#[derive(Debug)]
pub enum FontKind {
    /// Subset TrueType program, embedded as CIDFontType2.
    Embedded(subset::SubsetFont),
    /// Builtin base-14 metrics, referenced but not embedded.
    Builtin(builtin::BuiltinFont),
}

impl FontResource {
    /// Advance width of `c` in 1/1000 em, if the font covers it.
    pub fn char_width(&self, c: char) -> Option<u16> {
        match &self.kind {
            FontKind::Embedded(f) => f.widths.get(&c).copied(),
            FontKind::Builtin(f) => f.char_width(c),
        }
    }

    /// Width of `text` in points at `size`.
    ///
    /// Coverage is validated when the resource is built, so an unmapped
    /// character here measures as the fallback width instead of failing.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let milli: u32 = text
            .chars()
            .map(|c| self.char_width(c).unwrap_or(500) as u32)
            .sum();
        milli as f32 / 1000.0 * size
    }

    /// Encode text into the byte form the content stream shows it in:
    /// big-endian glyph ids for the embedded CID font, WinAnsi bytes for
    /// the builtin face.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match &self.kind {
            FontKind::Embedded(f) => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let gid = f.char_to_gid.get(&c).copied().unwrap_or(0);
                    out.extend_from_slice(&gid.to_be_bytes());
                }
                out
            }
            FontKind::Builtin(f) => text.chars().map(|c| f.encode_char(c)).collect(),
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, FontKind::Embedded(_))
    }
}

/// The fonts one conversion renders with.
#[derive(Debug)]
pub struct FontSet {
    pub regular: FontResource,
    /// Bold face for header labels; labels fall back to the regular face
    /// when absent.
    pub bold: Option<FontResource>,
}

impl FontSet {
    pub fn for_role(&self, role: FontRole) -> &FontResource {
        match role {
            FontRole::Bold => self.bold.as_ref().unwrap_or(&self.regular),
            FontRole::Regular => &self.regular,
        }
    }

    /// True when every face a page can reference is embedded. Header
    /// labels set text in the bold role, so an absent bold resource
    /// counts as incomplete embedding even though the labels fall back
    /// to the regular face.
    pub fn fully_embedded(&self) -> bool {
        self.regular.is_embedded() && self.bold.as_ref().map_or(false, |b| b.is_embedded())
    }
}

/// Build the fonts for one message from the style and the characters the
/// document will draw.
///
/// Fails with a font error when a used character has no glyph in the
/// selected face: substituting would silently corrupt the archival record.
pub fn prepare(
    style: &StyleConfig,
    cache: &mut FontCache,
    used_chars: &BTreeSet<char>,
) -> Result<FontSet> {
    let regular = match &style.font_regular {
        Some(path) => {
            let data = cache.load(path)?;
            FontResource {
                id: "F1",
                kind: FontKind::Embedded(subset::subset(data, path, used_chars)?),
            }
        }
        None => {
            let font = builtin::BuiltinFont::helvetica();
            for &c in used_chars {
                if font.char_width(c).is_none() {
                    return Err(ArchiveError::MissingGlyph {
                        font: font.base_name.to_string(),
                        ch: c,
                    });
                }
            }
            FontResource {
                id: "F1",
                kind: FontKind::Builtin(font),
            }
        }
    };

    let bold = match &style.font_bold {
        Some(path) => {
            let data = cache.load(path)?;
            Some(FontResource {
                id: "F2",
                kind: FontKind::Embedded(subset::subset(data, path, used_chars)?),
            })
        }
        None => None,
    };

    Ok(FontSet { regular, bold })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prepare_rejects_uncovered_char() {
        let style = StyleConfig::default();
        let mut cache = FontCache::new();
        let chars: BTreeSet<char> = "日本".chars().collect();
        let err = prepare(&style, &mut cache, &chars).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingGlyph { ch: '日', .. }));
    }

    #[test]
    fn test_builtin_prepare_ascii() {
        let style = StyleConfig::default();
        let mut cache = FontCache::new();
        let chars: BTreeSet<char> = "Hello, world!".chars().collect();
        let fonts = prepare(&style, &mut cache, &chars).unwrap();
        assert!(!fonts.regular.is_embedded());
        assert!(fonts.bold.is_none());
        assert!(!fonts.fully_embedded());
    }

    #[test]
    fn test_missing_bold_counts_against_embedding() {
        use std::collections::BTreeMap;
        let regular = FontResource {
            id: "F1",
            kind: FontKind::Embedded(subset::SubsetFont {
                postscript_name: "AAAAAA+Dummy".into(),
                font_bytes: Vec::new(),
                widths: BTreeMap::new(),
                char_to_gid: BTreeMap::new(),
                glyph_widths: Vec::new(),
                ascent: 800,
                descent: -200,
                cap_height: 700,
                italic_angle: 0,
                bbox: (0, 0, 0, 0),
            }),
        };
        let fonts = FontSet {
            regular,
            bold: None,
        };
        assert!(!fonts.fully_embedded());
    }

    #[test]
    fn test_text_width_scales_with_size() {
        let font = FontResource {
            id: "F1",
            kind: FontKind::Builtin(builtin::BuiltinFont::helvetica()),
        };
        let w11 = font.text_width("mm", 11.0);
        let w22 = font.text_width("mm", 22.0);
        assert!((w22 - 2.0 * w11).abs() < 0.001);
    }
}
