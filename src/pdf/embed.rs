//! Embedded-file resources: the original message, attachments, and their
//! relationship labels.
//!
//! Embedding is byte-preserving: content is hashed and stored exactly as
//! it was decoded from the container, never re-encoded.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::model::message::Message;
use crate::style::StyleConfig;

/// Role of an embedded file within the document, recorded as its
/// `/AFRelationship`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// The original source the document was produced from.
    Source,
    /// Supplementary data carried by the message.
    Data,
    /// An alternative rendition of the document content.
    Alternative,
    Unspecified,
}

impl Relationship {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Relationship::Source => "Source",
            Relationship::Data => "Data",
            Relationship::Alternative => "Alternative",
            Relationship::Unspecified => "Unspecified",
        }
    }
}

/// One file embedded in the output document.
#[derive(Debug)]
pub struct EmbeddedFileResource {
    /// Unique name within the document's embedded-file name tree.
    pub name: String,
    pub bytes: Vec<u8>,
    pub relationship: Relationship,
    pub mime_type: String,
    /// SHA-256 of `bytes`, hex encoded, stored so consumers can verify
    /// integrity without re-deriving it.
    pub checksum: String,
}

impl EmbeddedFileResource {
    fn new(name: String, bytes: Vec<u8>, relationship: Relationship, mime_type: String) -> Self {
        let checksum = hex_digest(&bytes);
        Self {
            name,
            bytes,
            relationship,
            mime_type,
            checksum,
        }
    }
}

/// Collect the files to embed, in order: the raw source first, then each
/// attachment. Inline parts are skipped unless the style opts in; names
/// are sanitized and de-duplicated.
pub fn embed(message: &Message, style: &StyleConfig) -> Vec<EmbeddedFileResource> {
    let mut resources = Vec::new();
    let mut names = HashSet::new();

    if style.embed_original {
        let name = unique_name(&sanitize_filename(&message.source_filename()), &mut names);
        resources.push(EmbeddedFileResource::new(
            name,
            message.raw_bytes.clone(),
            Relationship::Source,
            message.source_format.mime_type().to_string(),
        ));
    }

    for att in &message.attachments {
        if att.is_inline && !style.embed_inline_as_attachment {
            continue;
        }
        let name = unique_name(&sanitize_filename(&att.filename), &mut names);
        resources.push(EmbeddedFileResource::new(
            name,
            att.content_bytes.clone(),
            Relationship::Data,
            att.mime_type.clone(),
        ));
    }

    resources
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Strip path components and control characters from an attachment name.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Disambiguate `doc.pdf` into `doc (1).pdf`, `doc (2).pdf`, … until the
/// name is unused.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };
    for i in 1.. {
        let candidate = format!("{stem} ({i}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::Attachment;
    use crate::model::message::SourceFormat;

    fn message_with(attachments: Vec<Attachment>) -> Message {
        Message {
            headers: Vec::new(),
            body_text: String::new(),
            body_html: None,
            attachments,
            raw_bytes: b"raw message bytes".to_vec(),
            source_format: SourceFormat::Eml,
            source_name: "mail".into(),
        }
    }

    fn attachment(name: &str, inline: bool) -> Attachment {
        Attachment {
            filename: name.into(),
            mime_type: "application/pdf".into(),
            content_bytes: b"%PDF-1.4".to_vec(),
            is_inline: inline,
        }
    }

    #[test]
    fn test_original_embedded_first_as_source() {
        let msg = message_with(vec![attachment("doc.pdf", false)]);
        let resources = embed(&msg, &StyleConfig::default());
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "mail.eml");
        assert_eq!(resources[0].relationship, Relationship::Source);
        assert_eq!(resources[0].bytes, b"raw message bytes");
        assert_eq!(resources[1].relationship, Relationship::Data);
    }

    #[test]
    fn test_duplicate_names_disambiguated() {
        let msg = message_with(vec![
            attachment("doc.pdf", false),
            attachment("doc.pdf", false),
        ]);
        let style = StyleConfig {
            embed_original: false,
            ..StyleConfig::default()
        };
        let resources = embed(&msg, &style);
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["doc.pdf", "doc (1).pdf"]);
    }

    #[test]
    fn test_inline_skipped_unless_opted_in() {
        let msg = message_with(vec![attachment("logo.png", true)]);
        let style = StyleConfig {
            embed_original: false,
            embed_inline_as_attachment: false,
            ..StyleConfig::default()
        };
        assert!(embed(&msg, &style).is_empty());

        let style = StyleConfig {
            embed_original: false,
            embed_inline_as_attachment: true,
            ..StyleConfig::default()
        };
        assert_eq!(embed(&msg, &style).len(), 1);
    }

    #[test]
    fn test_checksum_matches_content() {
        let msg = message_with(Vec::new());
        let resources = embed(&msg, &StyleConfig::default());
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].checksum, hex_digest(&resources[0].bytes));
        assert_eq!(resources[0].checksum.len(), 64);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("report:final?.pdf"), "report_final_.pdf");
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("..."), "attachment");
    }
}
