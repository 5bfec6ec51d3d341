//! The normalized, parser-independent representation of one email.

use std::path::Path;

use super::attachment::Attachment;

/// Container format of the source message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// RFC 5322 internet message (`.eml`).
    Eml,
    /// Outlook OLE compound document (`.msg`).
    Msg,
}

impl SourceFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("eml") => Some(Self::Eml),
            Some("msg") => Some(Self::Msg),
            _ => None,
        }
    }

    /// The canonical extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Eml => "eml",
            Self::Msg => "msg",
        }
    }

    /// MIME type used when embedding the raw source.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Eml => "message/rfc822",
            Self::Msg => "application/vnd.ms-outlook",
        }
    }
}

/// One parsed email message.
///
/// Produced once by the parser and read-only afterwards. `raw_bytes` holds
/// the original container verbatim and is never re-encoded; the archive
/// embeds exactly these bytes.
#[derive(Debug, Clone)]
pub struct Message {
    /// Header fields in display order (`("From", value)`, …).
    /// Only fields with a non-empty value are present.
    pub headers: Vec<(String, String)>,

    /// Plain-text body. HTML-only messages are downgraded to text by the
    /// parser; this field is what gets laid out on the page.
    pub body_text: String,

    /// Original rich (HTML) body, when the message had one. Kept for
    /// reference; never rendered directly.
    pub body_html: Option<String>,

    /// Attachments in the order they appear in the container,
    /// inline parts included.
    pub attachments: Vec<Attachment>,

    /// The unmodified source container bytes.
    pub raw_bytes: Vec<u8>,

    /// Container format the message was parsed from.
    pub source_format: SourceFormat,

    /// File stem of the input, used to derive the embedded-source filename.
    pub source_name: String,
}

impl Message {
    /// The raw `Date:` header value, if the message carries one.
    pub fn date_header(&self) -> Option<&str> {
        self.header("Date")
    }

    /// The `Subject:` header value, if present.
    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Filename under which the raw source is embedded:
    /// the input file name, or a generated fallback.
    pub fn source_filename(&self) -> String {
        let stem = if self.source_name.is_empty() {
            "original"
        } else {
            self.source_name.as_str()
        };
        format!("{stem}.{}", self.source_format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            SourceFormat::from_path(&PathBuf::from("a/b/mail.EML")),
            Some(SourceFormat::Eml)
        );
        assert_eq!(
            SourceFormat::from_path(&PathBuf::from("mail.msg")),
            Some(SourceFormat::Msg)
        );
        assert_eq!(SourceFormat::from_path(&PathBuf::from("mail.txt")), None);
        assert_eq!(SourceFormat::from_path(&PathBuf::from("mail")), None);
    }

    #[test]
    fn test_source_filename_fallback() {
        let msg = Message {
            headers: Vec::new(),
            body_text: String::new(),
            body_html: None,
            attachments: Vec::new(),
            raw_bytes: Vec::new(),
            source_format: SourceFormat::Eml,
            source_name: String::new(),
        };
        assert_eq!(msg.source_filename(), "original.eml");
    }
}
