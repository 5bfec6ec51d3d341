//! Parser for Outlook `.msg` messages (MAPI properties inside an OLE
//! compound file).
//!
//! Property streams are named `__substg1.0_XXXXYYYY`, where `XXXX` is the
//! property id and `YYYY` the property type. Fixed-size properties such as
//! timestamps live in the `__properties_version1.0` stream instead.

use byteorder::{ByteOrder, LittleEndian};
use chrono::DateTime;

use crate::model::attachment::Attachment;
use crate::model::message::{Message, SourceFormat};
use crate::parser::cfb::{CompoundFile, TYPE_STORAGE};
use crate::parser::html::html_to_text;

// MAPI property ids
const PR_SUBJECT: u16 = 0x0037;
const PR_SENDER_NAME: u16 = 0x0C1A;
const PR_SENDER_EMAIL: u16 = 0x0C1F;
const PR_DISPLAY_TO: u16 = 0x0E04;
const PR_DISPLAY_CC: u16 = 0x0E03;
const PR_BODY: u16 = 0x1000;
const PR_HTML: u16 = 0x1013;
const PR_CLIENT_SUBMIT_TIME: u16 = 0x0039;
const PR_MESSAGE_DELIVERY_TIME: u16 = 0x0E06;
const PR_ATTACH_DATA: u16 = 0x3701;
const PR_ATTACH_FILENAME: u16 = 0x3704;
const PR_ATTACH_LONG_FILENAME: u16 = 0x3707;
const PR_ATTACH_MIME_TAG: u16 = 0x370E;
const PR_ATTACH_CONTENT_ID: u16 = 0x3712;

// Property types
const PT_UNICODE: u16 = 0x001F;
const PT_STRING8: u16 = 0x001E;
const PT_BINARY: u16 = 0x0102;
const PT_SYSTIME: u16 = 0x0040;

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch.
const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

/// Parse a raw `.msg` file into the normalized [`Message`] model.
///
/// Returns the failure reason on malformed input; the caller attaches
/// path context.
pub fn parse(raw: &[u8], source_name: String) -> Result<Message, String> {
    let file = CompoundFile::parse(raw)?;

    let subject = string_prop(&file, 0, PR_SUBJECT).unwrap_or_default();
    let to = string_prop(&file, 0, PR_DISPLAY_TO).unwrap_or_default();
    let cc = string_prop(&file, 0, PR_DISPLAY_CC).unwrap_or_default();
    let from = format_sender(
        string_prop(&file, 0, PR_SENDER_NAME),
        string_prop(&file, 0, PR_SENDER_EMAIL),
    );
    let date = message_date(&file)?;

    let mut headers = Vec::new();
    for (name, value) in [
        ("From", from),
        ("To", to),
        ("Cc", cc),
        ("Date", date),
        ("Subject", subject),
    ] {
        if !value.is_empty() {
            headers.push((name.to_string(), value));
        }
    }

    // HTML body is stored as raw bytes (PT_BINARY); prefer it over the
    // plain rendition for the same reason as with .eml input.
    let body_html = binary_prop(&file, 0, PR_HTML)
        .map(|bytes| decode_text(&bytes))
        .filter(|s| !s.is_empty());
    let body_text = match &body_html {
        Some(html) => {
            let text = html_to_text(html);
            if text.is_empty() {
                string_prop(&file, 0, PR_BODY).unwrap_or_default()
            } else {
                text
            }
        }
        None => string_prop(&file, 0, PR_BODY).unwrap_or_default(),
    };

    let mut attachments = Vec::new();
    for idx in attachment_storages(&file) {
        if let Some(att) = parse_attachment(&file, idx, attachments.len()) {
            attachments.push(att);
        }
    }

    Ok(Message {
        headers,
        body_text,
        body_html,
        attachments,
        raw_bytes: raw.to_vec(),
        source_format: SourceFormat::Msg,
        source_name,
    })
}

fn format_sender(name: Option<String>, email: Option<String>) -> String {
    match (name, email) {
        (Some(n), Some(e)) if !n.is_empty() && !e.is_empty() && n != e => {
            format!("{n} <{e}>")
        }
        (_, Some(e)) if !e.is_empty() => e,
        (Some(n), _) => n,
        _ => String::new(),
    }
}

/// Indices of `__attach_version1.0_#…` storages at the root, in name order.
fn attachment_storages(file: &CompoundFile<'_>) -> Vec<usize> {
    let mut out: Vec<usize> = file
        .children(0)
        .into_iter()
        .filter(|&i| {
            let e = &file.entries()[i];
            e.obj_type == TYPE_STORAGE && e.name.starts_with("__attach_version1.0_")
        })
        .collect();
    out.sort_by(|&a, &b| file.entries()[a].name.cmp(&file.entries()[b].name));
    out
}

fn parse_attachment(file: &CompoundFile<'_>, storage: usize, ordinal: usize) -> Option<Attachment> {
    let content_bytes = binary_prop(file, storage, PR_ATTACH_DATA)?;

    let filename = string_prop(file, storage, PR_ATTACH_LONG_FILENAME)
        .or_else(|| string_prop(file, storage, PR_ATTACH_FILENAME))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("attachment_{}", ordinal + 1));

    let mime_type = string_prop(file, storage, PR_ATTACH_MIME_TAG)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let is_inline = string_prop(file, storage, PR_ATTACH_CONTENT_ID)
        .map(|cid| !cid.is_empty())
        .unwrap_or(false);

    Some(Attachment {
        filename,
        mime_type,
        content_bytes,
        is_inline,
    })
}

/// Read a string property, trying the UTF-16 variant before the 8-bit one.
fn string_prop(file: &CompoundFile<'_>, storage: usize, prop: u16) -> Option<String> {
    if let Some(bytes) = prop_stream(file, storage, prop, PT_UNICODE) {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(&bytes);
        return Some(decoded.trim_end_matches('\0').to_string());
    }
    prop_stream(file, storage, prop, PT_STRING8).map(|bytes| decode_text(&bytes))
}

fn binary_prop(file: &CompoundFile<'_>, storage: usize, prop: u16) -> Option<Vec<u8>> {
    prop_stream(file, storage, prop, PT_BINARY)
}

fn prop_stream(
    file: &CompoundFile<'_>,
    storage: usize,
    prop: u16,
    ptype: u16,
) -> Option<Vec<u8>> {
    let name = format!("__substg1.0_{prop:04X}{ptype:04X}");
    let index = file.child_by_name(storage, &name)?;
    file.read_stream(index).ok()
}

/// 8-bit text: decode as Windows-1252, the usual legacy encoding here.
fn decode_text(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    decoded.trim_end_matches('\0').to_string()
}

/// Derive the Date header value from the fixed-property stream.
///
/// Prefers the client submit time, falling back to the delivery time.
/// The value is rendered in RFC 2822 form with an explicit `+0000` offset;
/// FILETIME is always UTC.
fn message_date(file: &CompoundFile<'_>) -> Result<String, String> {
    let index = file
        .child_by_name(0, "__properties_version1.0")
        .ok_or_else(|| "missing __properties_version1.0 stream".to_string())?;
    let bytes = file.read_stream(index)?;

    // Root-storage property stream carries a 32-byte header before the
    // 16-byte fixed-property records.
    if bytes.len() < 32 {
        return Err("property stream too short".to_string());
    }
    let mut submit = None;
    let mut delivery = None;
    for record in bytes[32..].chunks_exact(16) {
        let ptype = LittleEndian::read_u16(&record[0..2]);
        let prop = LittleEndian::read_u16(&record[2..4]);
        if ptype != PT_SYSTIME {
            continue;
        }
        let filetime = LittleEndian::read_u64(&record[8..16]);
        match prop {
            PR_CLIENT_SUBMIT_TIME => submit = Some(filetime),
            PR_MESSAGE_DELIVERY_TIME => delivery = Some(filetime),
            _ => {}
        }
    }

    let filetime = submit
        .or(delivery)
        .filter(|&ft| ft != 0)
        .ok_or_else(|| "message carries no timestamp property".to_string())?;
    filetime_to_rfc2822(filetime)
}

fn filetime_to_rfc2822(filetime: u64) -> Result<String, String> {
    let secs = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let dt = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| format!("timestamp out of range: {filetime}"))?;
    Ok(dt.to_rfc2822())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_conversion() {
        // 2024-01-04 10:00:00 UTC
        let unix = 1_704_362_400i64;
        let filetime = ((unix + FILETIME_UNIX_DIFF) as u64) * 10_000_000;
        let date = filetime_to_rfc2822(filetime).unwrap();
        assert_eq!(date, "Thu, 4 Jan 2024 10:00:00 +0000");
    }

    #[test]
    fn test_format_sender() {
        assert_eq!(
            format_sender(Some("Alice".into()), Some("alice@example.com".into())),
            "Alice <alice@example.com>"
        );
        assert_eq!(
            format_sender(None, Some("alice@example.com".into())),
            "alice@example.com"
        );
        assert_eq!(format_sender(Some("Alice".into()), None), "Alice");
        assert_eq!(format_sender(None, None), "");
    }

    #[test]
    fn test_rejects_non_msg_bytes() {
        assert!(parse(b"From: a@example.com\r\n\r\nbody", "x".into()).is_err());
    }

    #[test]
    fn test_decode_text_strips_trailing_nul() {
        assert_eq!(decode_text(b"hello\0"), "hello");
    }
}
