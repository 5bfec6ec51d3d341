//! Compliance metadata: XMP packet, normalized timestamps, output intent.
//!
//! Deterministic by construction: every timestamp derives from the
//! message's own Date header, never from the wall clock, so repeated runs
//! over the same input produce identical metadata.

use chrono::{DateTime, FixedOffset};

use crate::error::{ArchiveError, Result};
use crate::model::message::Message;
use crate::style::{CompliancePolicy, ComplianceTarget};

/// Fixed, versioned producer identity.
pub const PRODUCER: &str = concat!("mailarc ", env!("CARGO_PKG_VERSION"));

/// Document-level metadata handed to the assembler.
#[derive(Debug)]
pub struct MetadataBlock {
    pub title: String,
    pub producer: String,
    /// Creation and modification timestamp (both the message's Date).
    pub date: DateTime<FixedOffset>,
    /// The same timestamp in PDF string form (`D:YYYYMMDDHHMMSS+HH'mm'`).
    pub pdf_date: String,
    /// Serialized XMP packet for the `/Metadata` stream.
    pub xmp_packet: String,
    pub output_intent: Option<OutputIntent>,
    /// True when the document claims PDF/A-3B conformance.
    pub claims_conformance: bool,
}

/// A validated ICC profile for the `/OutputIntents` entry.
#[derive(Debug)]
pub struct OutputIntent {
    pub icc_bytes: Vec<u8>,
    /// Color component count from the profile's color space field.
    pub components: i64,
    /// Device class tag (`mntr` or `prtr`).
    pub device_class: String,
    /// Output condition identifier recorded in the intent.
    pub condition: String,
}

/// Build the metadata block. Runs before any page is laid out so that
/// timestamp and color-profile errors stop the conversion early.
pub fn build(
    message: &Message,
    policy: &CompliancePolicy,
    icc_bytes: Option<Vec<u8>>,
    fonts_embedded: bool,
) -> Result<MetadataBlock> {
    let date = normalize_date(message.date_header())?;
    let output_intent = icc_bytes.map(validate_icc).transpose()?;

    // The conformance claim is only made when everything it asserts is
    // actually true of the file.
    let claims_conformance = policy.target == ComplianceTarget::PdfA3b
        && output_intent.is_some()
        && fonts_embedded;

    let title = message
        .subject()
        .filter(|s| !s.is_empty())
        .unwrap_or(&message.source_name)
        .to_string();

    let xmp_packet = xmp_packet(&title, &date, claims_conformance);

    Ok(MetadataBlock {
        title,
        producer: PRODUCER.to_string(),
        pdf_date: pdf_date(&date),
        date,
        xmp_packet,
        output_intent,
        claims_conformance,
    })
}

/// Parse the message's Date header into a timestamp with an explicit UTC
/// offset.
///
/// A missing header or the RFC 5322 `-0000` notation (meaning "offset
/// unknown") is rejected: archival timestamps must not be guessed.
pub fn normalize_date(raw: Option<&str>) -> Result<DateTime<FixedOffset>> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ArchiveError::AmbiguousTimestamp("no Date header".to_string()))?;

    if raw.ends_with("-0000") {
        return Err(ArchiveError::AmbiguousTimestamp(format!(
            "'{raw}' declares an unknown UTC offset"
        )));
    }

    DateTime::parse_from_rfc2822(raw)
        .map_err(|e| ArchiveError::Metadata(format!("unparseable Date header '{raw}': {e}")))
}

/// Render a timestamp as a PDF date string: `D:YYYYMMDDHHMMSS+HH'mm'`.
pub fn pdf_date(date: &DateTime<FixedOffset>) -> String {
    let offset_secs = date.offset().local_minus_utc();
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.abs();
    format!(
        "D:{}{sign}{:02}'{:02}'",
        date.format("%Y%m%d%H%M%S"),
        abs / 3600,
        (abs % 3600) / 60,
    )
}

/// Validate an ICC profile header and derive the output intent.
///
/// Only monitor and printer profiles are accepted; any other device class
/// is a configuration error, not a fallback.
pub fn validate_icc(bytes: Vec<u8>) -> Result<OutputIntent> {
    if bytes.len() < 128 {
        return Err(ArchiveError::Metadata(format!(
            "ICC profile too short ({} bytes)",
            bytes.len()
        )));
    }
    let device_class = String::from_utf8_lossy(&bytes[12..16]).to_string();
    if device_class != "mntr" && device_class != "prtr" {
        return Err(ArchiveError::InvalidDeviceClass(device_class));
    }
    let color_space = &bytes[16..20];
    let (components, condition) = match color_space {
        b"RGB " => (3, "sRGB"),
        b"GRAY" => (1, "Gray"),
        b"CMYK" => (4, "CMYK"),
        other => {
            return Err(ArchiveError::Metadata(format!(
                "unsupported ICC color space '{}'",
                String::from_utf8_lossy(other)
            )))
        }
    };
    Ok(OutputIntent {
        icc_bytes: bytes,
        components,
        device_class,
        condition: condition.to_string(),
    })
}

/// Serialize the XMP packet. The conformance identification block is only
/// present when the document actually claims the profile.
fn xmp_packet(title: &str, date: &DateTime<FixedOffset>, claims_conformance: bool) -> String {
    let iso = date.to_rfc3339();
    let title = xml_escape(title);
    let pdfaid = if claims_conformance {
        "\n   <pdfaid:part>3</pdfaid:part>\n   <pdfaid:conformance>B</pdfaid:conformance>"
    } else {
        ""
    };
    format!(
        r#"<?xpacket begin="{bom}" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:pdf="http://ns.adobe.com/pdf/1.3/"
    xmlns:pdfaid="http://www.aiim.org/pdfa/ns/id/">
   <dc:format>application/pdf</dc:format>
   <dc:title>
    <rdf:Alt>
     <rdf:li xml:lang="x-default">{title}</rdf:li>
    </rdf:Alt>
   </dc:title>
   <xmp:CreateDate>{iso}</xmp:CreateDate>
   <xmp:ModifyDate>{iso}</xmp:ModifyDate>
   <xmp:CreatorTool>{producer}</xmp:CreatorTool>
   <pdf:Producer>{producer}</pdf:Producer>{pdfaid}
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#,
        bom = '\u{FEFF}',
        producer = PRODUCER,
    )
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_date_explicit_offset() {
        let dt = normalize_date(Some("Thu, 04 Jan 2024 10:00:00 +0100")).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_normalize_date_rejects_unknown_offset() {
        let err = normalize_date(Some("Thu, 04 Jan 2024 10:00:00 -0000")).unwrap_err();
        assert!(matches!(err, ArchiveError::AmbiguousTimestamp(_)));
    }

    #[test]
    fn test_normalize_date_rejects_missing() {
        assert!(matches!(
            normalize_date(None),
            Err(ArchiveError::AmbiguousTimestamp(_))
        ));
        assert!(matches!(
            normalize_date(Some("  ")),
            Err(ArchiveError::AmbiguousTimestamp(_))
        ));
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert!(matches!(
            normalize_date(Some("not a date")),
            Err(ArchiveError::Metadata(_))
        ));
    }

    #[test]
    fn test_pdf_date_format() {
        let dt = normalize_date(Some("Thu, 04 Jan 2024 10:30:00 +0100")).unwrap();
        assert_eq!(pdf_date(&dt), "D:20240104103000+01'00'");
        let dt = normalize_date(Some("Thu, 04 Jan 2024 10:30:00 -0530")).unwrap();
        assert_eq!(pdf_date(&dt), "D:20240104103000-05'30'");
    }

    fn fake_icc(device_class: &[u8; 4], color_space: &[u8; 4]) -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[12..16].copy_from_slice(device_class);
        bytes[16..20].copy_from_slice(color_space);
        bytes
    }

    #[test]
    fn test_icc_accepts_monitor_rgb() {
        let intent = validate_icc(fake_icc(b"mntr", b"RGB ")).unwrap();
        assert_eq!(intent.components, 3);
        assert_eq!(intent.condition, "sRGB");
    }

    #[test]
    fn test_icc_rejects_scanner_class() {
        let err = validate_icc(fake_icc(b"scnr", b"RGB ")).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidDeviceClass(c) if c == "scnr"));
    }

    #[test]
    fn test_icc_rejects_short_profile() {
        assert!(matches!(
            validate_icc(vec![0; 64]),
            Err(ArchiveError::Metadata(_))
        ));
    }

    #[test]
    fn test_conformance_claim_needs_policy_intent_and_fonts() {
        use crate::model::message::SourceFormat;
        let message = Message {
            headers: vec![("Date".into(), "Thu, 04 Jan 2024 10:00:00 +0000".into())],
            body_text: String::new(),
            body_html: None,
            attachments: Vec::new(),
            raw_bytes: Vec::new(),
            source_format: SourceFormat::Eml,
            source_name: "mail".into(),
        };
        let icc = fake_icc(b"mntr", b"RGB ");

        // A relaxed policy never claims, whatever else is present.
        let block = build(&message, &CompliancePolicy::relaxed(), Some(icc.clone()), true).unwrap();
        assert!(!block.claims_conformance);
        assert!(!block.xmp_packet.contains("pdfaid:part"));

        // The strict target alone is not enough without embedded fonts.
        let block = build(&message, &CompliancePolicy::pdfa_3b(), Some(icc.clone()), false).unwrap();
        assert!(!block.claims_conformance);

        let block = build(&message, &CompliancePolicy::pdfa_3b(), Some(icc), true).unwrap();
        assert!(block.claims_conformance);
    }

    #[test]
    fn test_xmp_escapes_title() {
        let dt = normalize_date(Some("Thu, 04 Jan 2024 10:00:00 +0000")).unwrap();
        let xmp = xmp_packet("Offer <1 & 2>", &dt, true);
        assert!(xmp.contains("Offer &lt;1 &amp; 2&gt;"));
        assert!(xmp.contains("<pdfaid:part>3</pdfaid:part>"));
        let relaxed = xmp_packet("x", &dt, false);
        assert!(!relaxed.contains("pdfaid:part"));
    }
}
