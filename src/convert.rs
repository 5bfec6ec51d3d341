//! The per-message conversion pipeline and batch helpers.
//!
//! One call converts one message; the output file is written in a single
//! step only after assembly succeeds, so a failed conversion leaves no
//! partial output behind.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};
use crate::fonts::{self, cache::FontCache};
use crate::layout;
use crate::model::message::{Message, SourceFormat};
use crate::parser;
use crate::pdf::{assemble, embed, metadata};
use crate::style::{CompliancePolicy, StyleConfig};

/// What one successful conversion produced.
#[derive(Debug, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub pages: usize,
    pub embedded_files: usize,
    pub bytes_written: u64,
}

/// Convert one message file to an archival PDF at `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    style: &StyleConfig,
    cache: &mut FontCache,
) -> Result<ConversionReport> {
    let message = parser::parse_file(input)?;
    debug!(
        input = %input.display(),
        attachments = message.attachments.len(),
        "parsed message"
    );
    convert_message(&message, input, output, style, cache)
}

fn convert_message(
    message: &Message,
    input: &Path,
    output: &Path,
    style: &StyleConfig,
    cache: &mut FontCache,
) -> Result<ConversionReport> {
    // Timestamp and color-profile problems surface before fonts are
    // subset or any page is laid out.
    metadata::normalize_date(message.date_header())?;
    let icc_bytes = match &style.icc_profile {
        Some(path) => {
            let bytes = std::fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
            metadata::validate_icc(bytes.clone())?;
            Some(bytes)
        }
        None => None,
    };

    let used = layout::used_characters(message);
    let fonts = fonts::prepare(style, cache, &used)?;
    let pages = layout::layout(message, style, &fonts);

    let policy = CompliancePolicy::for_style(style);
    let block = metadata::build(message, &policy, icc_bytes, fonts.fully_embedded())?;
    let embedded = embed::embed(message, style);
    let bytes = assemble::assemble(&pages, &fonts, &block, &embedded)?;

    std::fs::write(output, &bytes).map_err(|e| ArchiveError::io(output, e))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        pages = pages.len(),
        embedded = embedded.len(),
        conformant = block.claims_conformance,
        "converted"
    );

    Ok(ConversionReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        pages: pages.len(),
        embedded_files: embedded.len(),
        bytes_written: bytes.len() as u64,
    })
}

/// All convertible message files directly under `dir`, sorted by name.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
    let mut inputs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && SourceFormat::from_path(&path).is_some() {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Output path for `input` inside `out_dir`, substituting the extension.
pub fn output_path_for(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("message");
    out_dir.join(format!("{stem}.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>\r\n\
Subject: Hello\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0100\r\n\
\r\n\
Hi Bob\r\n";

    #[test]
    fn test_convert_simple_message() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        let output = dir.path().join("mail.pdf");
        fs::write(&input, SIMPLE).unwrap();

        let mut cache = FontCache::new();
        let report =
            convert_file(&input, &output, &StyleConfig::default(), &mut cache).unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.embedded_files, 1);
        assert!(fs::read(&output).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_missing_glyph_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        let output = dir.path().join("mail.pdf");
        fs::write(
            &input,
            b"From: a@example.com\r\nDate: Thu, 04 Jan 2024 10:00:00 +0000\r\n\r\n\xe6\x97\xa5\r\n",
        )
        .unwrap();

        let mut cache = FontCache::new();
        let err =
            convert_file(&input, &output, &StyleConfig::default(), &mut cache).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingGlyph { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_bad_icc_fails_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        let output = dir.path().join("mail.pdf");
        fs::write(&input, SIMPLE).unwrap();
        let icc = dir.path().join("scanner.icc");
        let mut profile = vec![0u8; 128];
        profile[12..16].copy_from_slice(b"scnr");
        fs::write(&icc, &profile).unwrap();

        let style = StyleConfig {
            icc_profile: Some(icc),
            ..StyleConfig::default()
        };
        let mut cache = FontCache::new();
        let err = convert_file(&input, &output, &style, &mut cache).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidDeviceClass(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_date_is_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        fs::write(&input, b"From: a@example.com\r\nSubject: x\r\n\r\nbody\r\n").unwrap();

        let mut cache = FontCache::new();
        let err = convert_file(
            &input,
            &dir.path().join("mail.pdf"),
            &StyleConfig::default(),
            &mut cache,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::AmbiguousTimestamp(_)));
    }

    #[test]
    fn test_discover_inputs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.eml"), b"x").unwrap();
        fs::write(dir.path().join("a.msg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let inputs = discover_inputs(dir.path()).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.msg", "b.eml"]);
    }

    #[test]
    fn test_output_path_substitutes_extension() {
        assert_eq!(
            output_path_for(Path::new("/in/mail.eml"), Path::new("/out")),
            PathBuf::from("/out/mail.pdf")
        );
    }
}
