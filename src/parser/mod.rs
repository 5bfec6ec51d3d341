//! Message-container parsing: `.eml` (RFC 5322) and `.msg` (OLE compound).

pub mod cfb;
pub mod eml;
pub mod html;
pub mod msg;

use std::path::Path;

use crate::error::{ArchiveError, Result};
use crate::model::message::{Message, SourceFormat};

/// Parse raw message bytes according to the format hint.
///
/// `path` is only used for error context and to derive the embedded-source
/// filename; the bytes are taken as given and embedded verbatim.
pub fn parse_bytes(raw: &[u8], format: SourceFormat, path: &Path) -> Result<Message> {
    let source_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();

    match format {
        SourceFormat::Eml => eml::parse(raw, source_name)
            .map_err(|reason| ArchiveError::parse(path, reason)),
        SourceFormat::Msg => msg::parse(raw, source_name)
            .map_err(|reason| ArchiveError::parse(path, reason)),
    }
}

/// Read a file and parse it, detecting the format from the extension.
pub fn parse_file(path: &Path) -> Result<Message> {
    let format = SourceFormat::from_path(path).ok_or_else(|| {
        ArchiveError::UnsupportedFormat(path.display().to_string())
    })?;

    let raw = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArchiveError::FileNotFound(path.to_path_buf())
        } else {
            ArchiveError::io(path, e)
        }
    })?;

    parse_bytes(&raw, format, path)
}
