//! Parser for `.eml` messages (RFC 5322), built on `mail-parser`.

use mail_parser::{Address, MessageParser, MimeHeaders};

use crate::model::attachment::Attachment;
use crate::model::message::{Message, SourceFormat};
use crate::parser::html::html_to_text;

/// Header fields rendered on the page, in display order.
const DISPLAY_HEADERS: [&str; 5] = ["From", "To", "Cc", "Date", "Subject"];

/// Parse a raw `.eml` message into the normalized [`Message`] model.
///
/// Returns the failure reason on malformed input; the caller attaches
/// path context.
pub fn parse(raw: &[u8], source_name: String) -> Result<Message, String> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| "not a parseable RFC 5322 message".to_string())?;

    let mut headers = Vec::new();
    for name in DISPLAY_HEADERS {
        let value = match name {
            "From" => parsed.from().map(format_address_list).unwrap_or_default(),
            "To" => parsed.to().map(format_address_list).unwrap_or_default(),
            "Cc" => parsed.cc().map(format_address_list).unwrap_or_default(),
            "Subject" => parsed.subject().unwrap_or_default().to_string(),
            // The raw Date value is kept as written: the metadata stage
            // normalizes it and must see the original offset notation.
            "Date" => raw_header_value(raw, "Date").unwrap_or_default(),
            _ => unreachable!(),
        };
        if !value.is_empty() {
            headers.push((name.to_string(), value));
        }
    }

    // Prefer the HTML rendition when both are present: multipart/alternative
    // messages duplicate the same content and the HTML side keeps link targets.
    let body_html = parsed.body_html(0).map(|s| s.into_owned());
    let body_text = match &body_html {
        Some(html) => {
            let text = html_to_text(html);
            if text.is_empty() {
                parsed.body_text(0).map(|s| s.into_owned()).unwrap_or_default()
            } else {
                text
            }
        }
        None => parsed.body_text(0).map(|s| s.into_owned()).unwrap_or_default(),
    };

    let mut attachments = Vec::new();
    for (idx, part) in parsed.attachments().enumerate() {
        let filename = part
            .attachment_name()
            .map(String::from)
            .unwrap_or_else(|| format!("attachment_{}", idx + 1));

        let mime_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{sub}", ct.ctype()),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let is_inline = part
            .content_disposition()
            .map(|d| d.ctype().eq_ignore_ascii_case("inline"))
            .unwrap_or(false)
            || part.content_id().is_some();

        attachments.push(Attachment {
            filename,
            mime_type,
            content_bytes: part.contents().to_vec(),
            is_inline,
        });
    }

    Ok(Message {
        headers,
        body_text,
        body_html,
        attachments,
        raw_bytes: raw.to_vec(),
        source_format: SourceFormat::Eml,
        source_name,
    })
}

/// Format an address header for display: `Name <addr>, Name <addr>`.
fn format_address_list(address: &Address<'_>) -> String {
    address
        .iter()
        .map(|addr| {
            let mail = addr.address().unwrap_or_default();
            match addr.name() {
                Some(name) if !name.is_empty() => format!("{name} <{mail}>"),
                _ => mail.to_string(),
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extract a raw, unfolded header value from the message's header block.
fn raw_header_value(raw: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let header_block = text
        .split("\r\n\r\n")
        .next()
        .and_then(|b| b.split("\n\n").next())
        .unwrap_or(&text);

    let prefix = format!("{}:", name.to_ascii_lowercase());
    let mut value: Option<String> = None;
    for line in header_block.lines() {
        if let Some(v) = value.as_mut() {
            // Folded continuation lines start with whitespace
            if line.starts_with(' ') || line.starts_with('\t') {
                v.push(' ');
                v.push_str(line.trim());
                continue;
            }
            break;
        }
        if line.to_ascii_lowercase().starts_with(&prefix) {
            value = Some(line[prefix.len()..].trim().to_string());
        }
    }
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>\r\n\
Subject: Hello\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0100\r\n\
\r\n\
Hi Bob,\r\nsee you soon.\r\n";

    #[test]
    fn test_parse_simple() {
        let msg = parse(SIMPLE, "mail".into()).unwrap();
        assert_eq!(msg.subject(), Some("Hello"));
        assert_eq!(
            msg.date_header(),
            Some("Thu, 04 Jan 2024 10:00:00 +0100")
        );
        assert!(msg.body_text.contains("Hi Bob"));
        assert!(msg.attachments.is_empty());
        assert_eq!(msg.raw_bytes, SIMPLE);
    }

    #[test]
    fn test_parse_headers_in_order() {
        let msg = parse(SIMPLE, "mail".into()).unwrap();
        let names: Vec<&str> = msg.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["From", "To", "Date", "Subject"]);
        assert_eq!(msg.headers[0].1, "Alice <alice@example.com>");
    }

    #[test]
    fn test_parse_attachment() {
        let raw = b"From: a@example.com\r\n\
Subject: With attachment\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
body text\r\n\
--b\r\n\
Content-Type: application/pdf; name=\"doc.pdf\"\r\n\
Content-Disposition: attachment; filename=\"doc.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b--\r\n";
        let msg = parse(raw, "mail".into()).unwrap();
        assert_eq!(msg.attachments.len(), 1);
        let att = &msg.attachments[0];
        assert_eq!(att.filename, "doc.pdf");
        assert_eq!(att.mime_type, "application/pdf");
        assert_eq!(att.content_bytes, b"%PDF-1.4");
        assert!(!att.is_inline);
    }

    #[test]
    fn test_inline_detection_via_content_id() {
        let raw = b"From: a@example.com\r\n\
Subject: Inline\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>logo: <img src=\"cid:logo1\"></p>\r\n\
--b\r\n\
Content-Type: image/png; name=\"logo.png\"\r\n\
Content-ID: <logo1>\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--b--\r\n";
        let msg = parse(raw, "mail".into()).unwrap();
        assert_eq!(msg.attachments.len(), 1);
        assert!(msg.attachments[0].is_inline);
    }

    #[test]
    fn test_html_only_body_downgraded() {
        let raw = b"From: a@example.com\r\n\
Subject: Html\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>Hello <b>there</b></p>\r\n";
        let msg = parse(raw, "mail".into()).unwrap();
        assert!(msg.body_text.contains("Hello there"));
        assert!(msg.body_html.is_some());
    }

    #[test]
    fn test_raw_header_value_folded() {
        let raw = b"Date: Thu, 04 Jan 2024\r\n 10:00:00 +0000\r\nSubject: x\r\n\r\nbody";
        assert_eq!(
            raw_header_value(raw, "Date").as_deref(),
            Some("Thu, 04 Jan 2024 10:00:00 +0000")
        );
        assert_eq!(raw_header_value(raw, "Missing"), None);
    }
}
