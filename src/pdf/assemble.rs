//! Final document assembly.
//!
//! Composes pages, fonts, metadata, embedded files, and the output intent
//! into the output byte stream, then audits the cross-reference structure
//! before serializing. Assembly is deterministic: object ids are assigned
//! in construction order and the document id derives from the content.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use sha2::{Digest, Sha256};

use crate::error::{ArchiveError, Result};
use crate::fonts::{FontKind, FontResource, FontSet};
use crate::layout::{Page, A4_HEIGHT_PT, A4_WIDTH_PT};
use crate::pdf::embed::EmbeddedFileResource;
use crate::pdf::metadata::MetadataBlock;

const RULE_WIDTH_PT: f32 = 0.7;

/// Assemble the final document.
///
/// Every referenced object must resolve and embedded-file names must be
/// unique; a violation is a logic defect reported as an assembly error,
/// never a malformed file.
pub fn assemble(
    pages: &[Page],
    fonts: &FontSet,
    metadata: &MetadataBlock,
    embedded: &[EmbeddedFileResource],
) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let regular_id = add_font(&mut doc, &fonts.regular);
    let bold_id = fonts.bold.as_ref().map(|b| add_font(&mut doc, b));

    let mut font_resources = Dictionary::new();
    font_resources.set(fonts.regular.id, Object::Reference(regular_id));
    if let (Some(bold), Some(id)) = (&fonts.bold, bold_id) {
        font_resources.set(bold.id, Object::Reference(id));
    }

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content = page_content(page, fonts);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(A4_WIDTH_PT),
                Object::Real(A4_HEIGHT_PT),
            ],
            "Resources" => dictionary! {
                "Font" => font_resources.clone(),
            },
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }
    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );

    // Embedded files: name tree entries must be unique and sorted.
    let mut filespecs: Vec<(String, ObjectId)> = Vec::with_capacity(embedded.len());
    for resource in embedded {
        if filespecs.iter().any(|(name, _)| name == &resource.name) {
            return Err(ArchiveError::Assembly(format!(
                "duplicate embedded file name '{}'",
                resource.name
            )));
        }
        let spec_id = add_embedded_file(&mut doc, resource);
        filespecs.push((resource.name.clone(), spec_id));
    }
    filespecs.sort_by(|a, b| a.0.cmp(&b.0));

    let metadata_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "Metadata",
            "Subtype" => "XML",
        },
        metadata.xmp_packet.as_bytes().to_vec(),
    ));

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
        "Metadata" => Object::Reference(metadata_id),
    };
    if !filespecs.is_empty() {
        let mut names = Vec::with_capacity(filespecs.len() * 2);
        let mut af = Vec::with_capacity(filespecs.len());
        for (name, id) in &filespecs {
            names.push(Object::string_literal(name.as_str()));
            names.push(Object::Reference(*id));
            af.push(Object::Reference(*id));
        }
        catalog.set(
            "Names",
            dictionary! {
                "EmbeddedFiles" => dictionary! { "Names" => names },
            },
        );
        catalog.set("AF", af);
    }
    if let Some(intent) = &metadata.output_intent {
        let icc_id = doc.add_object(Stream::new(
            dictionary! { "N" => intent.components },
            intent.icc_bytes.clone(),
        ));
        catalog.set(
            "OutputIntents",
            vec![Object::Dictionary(dictionary! {
                "Type" => "OutputIntent",
                "S" => "GTS_PDFA1",
                "OutputConditionIdentifier" => Object::string_literal(intent.condition.as_str()),
                "Info" => Object::string_literal(intent.condition.as_str()),
                "DestOutputProfile" => Object::Reference(icc_id),
            })],
        );
    }
    let catalog_id = doc.add_object(catalog);

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(metadata.title.as_str()),
        "Producer" => Object::string_literal(metadata.producer.as_str()),
        "Creator" => Object::string_literal(metadata.producer.as_str()),
        "CreationDate" => Object::string_literal(metadata.pdf_date.as_str()),
        "ModDate" => Object::string_literal(metadata.pdf_date.as_str()),
    });

    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    let id = document_id(metadata, embedded, pages.len());
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ],
    );

    audit_references(&doc)?;

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ArchiveError::Assembly(e.to_string()))?;
    Ok(out)
}

/// Content stream for one page: rules first, then one text object per run.
fn page_content(page: &Page, fonts: &FontSet) -> Vec<u8> {
    let mut operations = Vec::new();
    for rule in &page.rules {
        operations.push(Operation::new("w", vec![Object::Real(RULE_WIDTH_PT)]));
        operations.push(Operation::new(
            "m",
            vec![Object::Real(rule.x1), Object::Real(rule.y)],
        ));
        operations.push(Operation::new(
            "l",
            vec![Object::Real(rule.x2), Object::Real(rule.y)],
        ));
        operations.push(Operation::new("S", vec![]));
    }
    for run in &page.runs {
        let font = fonts.for_role(run.role);
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(font.id.into()), Object::Real(run.size)],
        ));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(run.x), Object::Real(run.y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(
                font.encode(&run.text),
                StringFormat::Hexadecimal,
            )],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    // Content::encode over these operators cannot fail
    Content { operations }.encode().unwrap_or_default()
}

/// Add one font and return the id the page resources reference.
fn add_font(doc: &mut Document, font: &FontResource) -> ObjectId {
    match &font.kind {
        FontKind::Builtin(builtin) => doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => builtin.base_name,
            "Encoding" => "WinAnsiEncoding",
        }),
        FontKind::Embedded(subset) => {
            let file_id = doc.add_object(Stream::new(
                dictionary! { "Length1" => subset.font_bytes.len() as i64 },
                subset.font_bytes.clone(),
            ));
            let descriptor_id = doc.add_object(dictionary! {
                "Type" => "FontDescriptor",
                "FontName" => Object::Name(subset.postscript_name.as_bytes().to_vec()),
                "Flags" => 4,
                "FontBBox" => vec![
                    Object::Integer(subset.bbox.0 as i64),
                    Object::Integer(subset.bbox.1 as i64),
                    Object::Integer(subset.bbox.2 as i64),
                    Object::Integer(subset.bbox.3 as i64),
                ],
                "ItalicAngle" => subset.italic_angle as i64,
                "Ascent" => subset.ascent as i64,
                "Descent" => subset.descent as i64,
                "CapHeight" => subset.cap_height as i64,
                "StemV" => 80,
                "FontFile2" => Object::Reference(file_id),
            });

            let mut widths = Vec::with_capacity(subset.glyph_widths.len() * 2);
            for (gid, &w) in subset.glyph_widths.iter().enumerate() {
                widths.push(Object::Integer(gid as i64));
                widths.push(Object::Array(vec![Object::Integer(w as i64)]));
            }
            let cid_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType2",
                "BaseFont" => Object::Name(subset.postscript_name.as_bytes().to_vec()),
                "CIDSystemInfo" => dictionary! {
                    "Registry" => Object::string_literal("Adobe"),
                    "Ordering" => Object::string_literal("Identity"),
                    "Supplement" => 0,
                },
                "FontDescriptor" => Object::Reference(descriptor_id),
                "DW" => 1000,
                "W" => widths,
                "CIDToGIDMap" => "Identity",
            });

            let to_unicode_id = doc.add_object(Stream::new(
                dictionary! {},
                to_unicode_cmap(subset),
            ));
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => Object::Name(subset.postscript_name.as_bytes().to_vec()),
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(cid_id)],
                "ToUnicode" => Object::Reference(to_unicode_id),
            })
        }
    }
}

/// ToUnicode CMap mapping glyph ids back to their characters, so text
/// extraction from the archival file round-trips.
fn to_unicode_cmap(subset: &crate::fonts::subset::SubsetFont) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    let entries: Vec<(u16, char)> = subset.char_to_gid.iter().map(|(&c, &g)| (g, c)).collect();
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for &(gid, c) in chunk {
            let mut units = [0u16; 2];
            let encoded = c.encode_utf16(&mut units);
            let target: String = encoded.iter().map(|u| format!("{u:04X}")).collect();
            cmap.push_str(&format!("<{gid:04X}> <{target}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap.into_bytes()
}

/// Embedded-file stream plus its file specification dictionary.
fn add_embedded_file(doc: &mut Document, resource: &EmbeddedFileResource) -> ObjectId {
    let ef_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => Object::Name(resource.mime_type.as_bytes().to_vec()),
            "Params" => dictionary! {
                "Size" => resource.bytes.len() as i64,
                "CheckSum" => Object::string_literal(resource.checksum.as_str()),
            },
        },
        resource.bytes.clone(),
    ));
    doc.add_object(dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(resource.name.as_str()),
        "UF" => Object::string_literal(resource.name.as_str()),
        "EF" => dictionary! { "F" => Object::Reference(ef_id) },
        "AFRelationship" => resource.relationship.pdf_name(),
    })
}

/// Deterministic document id from the content that defines the file.
fn document_id(
    metadata: &MetadataBlock,
    embedded: &[EmbeddedFileResource],
    page_count: usize,
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(metadata.xmp_packet.as_bytes());
    hasher.update(metadata.pdf_date.as_bytes());
    hasher.update((page_count as u64).to_be_bytes());
    for resource in embedded {
        hasher.update(resource.name.as_bytes());
        hasher.update(resource.checksum.as_bytes());
    }
    hasher.finalize()[..16].to_vec()
}

/// Verify that every reference in the document resolves. A dangling
/// reference is a bug in assembly, caught here instead of shipping a
/// broken file.
fn audit_references(doc: &Document) -> Result<()> {
    let mut referenced = Vec::new();
    for object in doc.objects.values() {
        collect_references(object, &mut referenced);
    }
    for (_, value) in doc.trailer.iter() {
        collect_references(value, &mut referenced);
    }
    for id in referenced {
        if !doc.objects.contains_key(&id) {
            return Err(ArchiveError::Assembly(format!(
                "dangling reference to object {} {}",
                id.0, id.1
            )));
        }
    }
    Ok(())
}

fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_references(value, out);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_references(value, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::builtin::BuiltinFont;
    use crate::model::message::{Message, SourceFormat};
    use crate::pdf::metadata;
    use crate::style::{CompliancePolicy, StyleConfig};

    fn builtin_fonts() -> FontSet {
        FontSet {
            regular: FontResource {
                id: "F1",
                kind: FontKind::Builtin(BuiltinFont::helvetica()),
            },
            bold: None,
        }
    }

    fn test_message() -> Message {
        Message {
            headers: vec![
                ("From".into(), "alice@example.com".into()),
                ("Date".into(), "Thu, 04 Jan 2024 10:00:00 +0100".into()),
                ("Subject".into(), "Hello".into()),
            ],
            body_text: "Hi Bob".into(),
            body_html: None,
            attachments: Vec::new(),
            raw_bytes: b"From: alice@example.com\r\n\r\nHi Bob".to_vec(),
            source_format: SourceFormat::Eml,
            source_name: "mail".into(),
        }
    }

    fn build_all() -> (Vec<Page>, FontSet, MetadataBlock, Vec<EmbeddedFileResource>) {
        let message = test_message();
        let style = StyleConfig::default();
        let fonts = builtin_fonts();
        let pages = crate::layout::layout(&message, &style, &fonts);
        let block = metadata::build(&message, &CompliancePolicy::relaxed(), None, false).unwrap();
        let embedded = crate::pdf::embed::embed(&message, &style);
        (pages, fonts, block, embedded)
    }

    #[test]
    fn test_assemble_produces_pdf() {
        let (pages, fonts, block, embedded) = build_all();
        let bytes = assemble(&pages, &fonts, &block, &embedded).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let (pages, fonts, block, embedded) = build_all();
        let first = assemble(&pages, &fonts, &block, &embedded).unwrap();
        let second = assemble(&pages, &fonts, &block, &embedded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_assembled_document_loads_back() {
        let (pages, fonts, block, embedded) = build_all();
        let bytes = assemble(&pages, &fonts, &block, &embedded).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), pages.len());
        let catalog = doc.catalog().unwrap();
        assert!(catalog.has(b"Names"));
        assert!(catalog.has(b"AF"));
        assert!(catalog.has(b"Metadata"));
    }

    #[test]
    fn test_duplicate_embedded_names_rejected() {
        let (pages, fonts, block, mut embedded) = build_all();
        let clone = EmbeddedFileResource {
            name: embedded[0].name.clone(),
            bytes: Vec::new(),
            relationship: crate::pdf::embed::Relationship::Data,
            mime_type: "application/octet-stream".into(),
            checksum: String::new(),
        };
        embedded.push(clone);
        let err = assemble(&pages, &fonts, &block, &embedded).unwrap_err();
        assert!(matches!(err, ArchiveError::Assembly(_)));
    }

    #[test]
    fn test_output_intent_present_when_icc_supplied() {
        let message = test_message();
        let style = StyleConfig::default();
        let fonts = builtin_fonts();
        let pages = crate::layout::layout(&message, &style, &fonts);
        let mut icc = vec![0u8; 128];
        icc[12..16].copy_from_slice(b"mntr");
        icc[16..20].copy_from_slice(b"RGB ");
        let block =
            metadata::build(&message, &CompliancePolicy::pdfa_3b(), Some(icc), true).unwrap();
        let bytes = assemble(&pages, &fonts, &block, &[]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.catalog().unwrap().has(b"OutputIntents"));
    }
}
