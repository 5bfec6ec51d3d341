//! Centralized error types for mailarc.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailarc library.
///
/// The variants fall into four families matching the conversion stages:
/// parsing (`Parse`, `UnsupportedFormat`), fonts (`FontUnreadable`,
/// `MissingGlyph`), compliance metadata (`AmbiguousTimestamp`,
/// `InvalidDeviceClass`, `Metadata`) and final assembly (`Assembly`).
/// Assembly errors indicate an internal logic defect and are never retried.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// The message container could not be parsed.
    #[error("Parse error in '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The input extension is neither `.eml` nor `.msg`.
    #[error("Unsupported message format: {0}")]
    UnsupportedFormat(String),

    /// A font file could not be read or is not a valid TrueType font.
    #[error("Unreadable font '{path}': {reason}")]
    FontUnreadable { path: PathBuf, reason: String },

    /// The text requires a character the font has no glyph for.
    ///
    /// Reported rather than substituted: an unmapped glyph would silently
    /// corrupt a document meant to be a faithful long-term record.
    #[error("Font '{font}' has no glyph for character {ch:?}")]
    MissingGlyph { font: String, ch: char },

    /// A document timestamp lacks an unambiguous UTC offset.
    #[error("Ambiguous timestamp: {0}")]
    AmbiguousTimestamp(String),

    /// The ICC profile declares a device class other than monitor/printer.
    #[error("Invalid ICC device class '{0}' (expected 'mntr' or 'prtr')")]
    InvalidDeviceClass(String),

    /// Any other metadata construction failure.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Internal cross-reference inconsistency in the assembled document.
    #[error("Assembly error: {0}")]
    Assembly(String),
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Parse` variant from a path and a reason.
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short stage label used in batch status reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::FileNotFound(_) => "io",
            Self::Parse { .. } | Self::UnsupportedFormat(_) => "parse",
            Self::FontUnreadable { .. } | Self::MissingGlyph { .. } => "font",
            Self::AmbiguousTimestamp(_) | Self::InvalidDeviceClass(_) | Self::Metadata(_) => {
                "metadata"
            }
            Self::Assembly(_) => "assembly",
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `ArchiveError`
/// when no path context is available (rare — prefer `ArchiveError::io`).
impl From<std::io::Error> for ArchiveError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(
            ArchiveError::parse("mail.msg", "bad container").stage(),
            "parse"
        );
        assert_eq!(
            ArchiveError::MissingGlyph {
                font: "Helvetica".into(),
                ch: '€',
            }
            .stage(),
            "font"
        );
        assert_eq!(
            ArchiveError::AmbiguousTimestamp("no Date header".into()).stage(),
            "metadata"
        );
        assert_eq!(
            ArchiveError::Assembly("dangling reference".into()).stage(),
            "assembly"
        );
        assert_eq!(
            ArchiveError::FileNotFound(PathBuf::from("mail.eml")).stage(),
            "io"
        );
    }
}
