//! TrueType glyph subsetting.
//!
//! Builds an embeddable font containing only the glyphs the document
//! uses: the used characters, space, `.notdef`, and every component glyph
//! reachable from composites. Glyph ids are renumbered densely and the
//! sfnt container is rebuilt with correct table and file checksums.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};
use ttf_parser::{Face, GlyphId};

use crate::error::{ArchiveError, Result};

// Composite glyph flags
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// A subset font ready for layout and embedding.
#[derive(Debug)]
pub struct SubsetFont {
    /// PostScript name with the six-letter subset tag prefix.
    pub postscript_name: String,
    /// Rebuilt sfnt program (the `FontFile2` stream content).
    pub font_bytes: Vec<u8>,
    /// Advance width per character in 1/1000 em.
    pub widths: BTreeMap<char, u16>,
    /// Character to renumbered glyph id.
    pub char_to_gid: BTreeMap<char, u16>,
    /// Advance width per renumbered glyph id in 1/1000 em.
    pub glyph_widths: Vec<u16>,
    /// Descriptor metrics, scaled to 1/1000 em.
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    pub italic_angle: i16,
    pub bbox: (i16, i16, i16, i16),
}

/// Subset `data` down to `used` characters.
///
/// Fails when a used character has no glyph: substitution would silently
/// corrupt the text of an archival record.
pub fn subset(data: &[u8], source: &Path, used: &BTreeSet<char>) -> Result<SubsetFont> {
    let unreadable = |reason: String| ArchiveError::FontUnreadable {
        path: source.to_path_buf(),
        reason,
    };

    let face = Face::parse(data, 0).map_err(|e| unreadable(e.to_string()))?;
    let tables = parse_sfnt_directory(data).map_err(&unreadable)?;
    let glyf = *tables
        .get(b"glyf")
        .ok_or_else(|| unreadable("no TrueType outlines (glyf table missing)".into()))?;
    let loca = *tables
        .get(b"loca")
        .ok_or_else(|| unreadable("loca table missing".into()))?;
    let head = *tables
        .get(b"head")
        .ok_or_else(|| unreadable("head table missing".into()))?;
    let hhea = *tables
        .get(b"hhea")
        .ok_or_else(|| unreadable("hhea table missing".into()))?;
    let maxp = *tables
        .get(b"maxp")
        .ok_or_else(|| unreadable("maxp table missing".into()))?;
    if head.len() < 54 || hhea.len() < 36 || maxp.len() < 6 {
        return Err(unreadable("core table truncated".into()));
    }

    let font_name = postscript_name(&face).unwrap_or_else(|| {
        source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unnamed")
            .to_string()
    });

    // Map characters to source glyph ids; space is always included.
    let mut chars: BTreeSet<char> = used.clone();
    chars.insert(' ');
    let mut char_to_old = BTreeMap::new();
    for &c in &chars {
        let gid = face.glyph_index(c).ok_or_else(|| ArchiveError::MissingGlyph {
            font: font_name.clone(),
            ch: c,
        })?;
        char_to_old.insert(c, gid.0);
    }

    let long_loca = BigEndian::read_i16(&head[50..52]) == 1;
    let num_glyphs = BigEndian::read_u16(&maxp[4..6]);
    let glyph_range = |gid: u16| -> std::result::Result<(usize, usize), String> {
        glyph_location(loca, gid, num_glyphs, long_loca)
    };

    // Glyph closure: used glyphs plus composite components, .notdef first.
    let mut keep: BTreeSet<u16> = char_to_old.values().copied().collect();
    keep.insert(0);
    let mut worklist: Vec<u16> = keep.iter().copied().collect();
    while let Some(gid) = worklist.pop() {
        let (start, end) = glyph_range(gid).map_err(&unreadable)?;
        let outline = &glyf[start..end];
        for component in composite_components(outline) {
            if keep.insert(component) {
                worklist.push(component);
            }
        }
    }

    let order: Vec<u16> = keep.into_iter().collect();
    let old_to_new: BTreeMap<u16, u16> =
        order.iter().enumerate().map(|(i, &g)| (g, i as u16)).collect();

    // Rebuild glyf and a long-format loca.
    let mut glyf_out = Vec::new();
    let mut loca_out = Vec::with_capacity((order.len() + 1) * 4);
    for &old in &order {
        push_u32(&mut loca_out, glyf_out.len() as u32);
        let (start, end) = glyph_range(old).map_err(&unreadable)?;
        let mut outline = glyf[start..end].to_vec();
        renumber_components(&mut outline, &old_to_new);
        glyf_out.extend_from_slice(&outline);
        while glyf_out.len() % 4 != 0 {
            glyf_out.push(0);
        }
    }
    push_u32(&mut loca_out, glyf_out.len() as u32);

    // hmtx with one long metric per glyph.
    let mut hmtx_out = Vec::with_capacity(order.len() * 4);
    for &old in &order {
        let advance = face.glyph_hor_advance(GlyphId(old)).unwrap_or(0);
        let lsb = face.glyph_hor_side_bearing(GlyphId(old)).unwrap_or(0);
        push_u16(&mut hmtx_out, advance);
        push_u16(&mut hmtx_out, lsb as u16);
    }

    let mut head_out = head[..54].to_vec();
    BigEndian::write_u32(&mut head_out[8..12], 0); // checkSumAdjustment
    BigEndian::write_i16(&mut head_out[50..52], 1); // long loca

    let mut hhea_out = hhea[..36].to_vec();
    BigEndian::write_u16(&mut hhea_out[34..36], order.len() as u16);

    let mut maxp_out = maxp.to_vec();
    BigEndian::write_u16(&mut maxp_out[4..6], order.len() as u16);

    let char_to_gid: BTreeMap<char, u16> = char_to_old
        .iter()
        .map(|(&c, old)| (c, old_to_new[old]))
        .collect();
    let cmap_out = build_cmap_format4(&char_to_gid);

    let mut sfnt_tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap_out),
        (*b"glyf", glyf_out),
        (*b"head", head_out),
        (*b"hhea", hhea_out),
        (*b"hmtx", hmtx_out),
        (*b"loca", loca_out),
        (*b"maxp", maxp_out),
    ];
    // Hinting tables carry over unchanged when present.
    for tag in [b"cvt ", b"fpgm", b"prep"] {
        if let Some(table) = tables.get(tag) {
            sfnt_tables.push((*tag, table.to_vec()));
        }
    }
    sfnt_tables.sort_by(|a, b| a.0.cmp(&b.0));
    let font_bytes = assemble_sfnt(&sfnt_tables);

    // Metrics scaled to 1/1000 em.
    let units = face.units_per_em().max(1);
    let scale = 1000.0 / units as f32;
    let milli = |v: i16| -> i16 { (v as f32 * scale).round() as i16 };
    let widths: BTreeMap<char, u16> = char_to_old
        .iter()
        .map(|(&c, &old)| {
            let advance = face.glyph_hor_advance(GlyphId(old)).unwrap_or(0);
            (c, ((advance as f32 * scale).round()) as u16)
        })
        .collect();
    let glyph_widths: Vec<u16> = order
        .iter()
        .map(|&old| {
            let advance = face.glyph_hor_advance(GlyphId(old)).unwrap_or(0);
            (advance as f32 * scale).round() as u16
        })
        .collect();

    let ascent = milli(face.ascender());
    let bbox = face.global_bounding_box();

    Ok(SubsetFont {
        postscript_name: format!("{}+{}", subset_tag(data, &chars), font_name),
        font_bytes,
        widths,
        char_to_gid,
        glyph_widths,
        ascent,
        descent: milli(face.descender()),
        cap_height: face.capital_height().map(milli).unwrap_or(ascent),
        italic_angle: face
            .italic_angle()
            .map(|v| v.round() as i16)
            .unwrap_or(0),
        bbox: (
            milli(bbox.x_min),
            milli(bbox.y_min),
            milli(bbox.x_max),
            milli(bbox.y_max),
        ),
    })
}

fn postscript_name(face: &Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;
    face.names()
        .into_iter()
        .filter(|n| n.name_id == name_id::POST_SCRIPT_NAME)
        .find_map(|n| n.to_string())
}

/// Deterministic six-letter subset tag derived from the font bytes and
/// the character set.
fn subset_tag(data: &[u8], chars: &BTreeSet<char>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    for &c in chars {
        hasher.update((c as u32).to_be_bytes());
    }
    let digest = hasher.finalize();
    digest[..6].iter().map(|b| char::from(b'A' + b % 26)).collect()
}

/// Tag → table bytes from the sfnt table directory.
fn parse_sfnt_directory(data: &[u8]) -> std::result::Result<BTreeMap<[u8; 4], &[u8]>, String> {
    if data.len() < 12 {
        return Err("file too short for an sfnt header".into());
    }
    let version = BigEndian::read_u32(&data[0..4]);
    if version != 0x0001_0000 && &data[0..4] != b"true" {
        return Err(format!("unsupported sfnt version 0x{version:08X}"));
    }
    let num_tables = BigEndian::read_u16(&data[4..6]) as usize;
    let mut tables = BTreeMap::new();
    for i in 0..num_tables {
        let record = data
            .get(12 + i * 16..12 + i * 16 + 16)
            .ok_or("table directory truncated")?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&record[0..4]);
        let offset = BigEndian::read_u32(&record[8..12]) as usize;
        let length = BigEndian::read_u32(&record[12..16]) as usize;
        let table = data
            .get(offset..offset + length)
            .ok_or_else(|| format!("table {} extends past end of file", String::from_utf8_lossy(&tag)))?;
        tables.insert(tag, table);
    }
    Ok(tables)
}

/// Byte range of one glyph's outline within glyf.
fn glyph_location(
    loca: &[u8],
    gid: u16,
    num_glyphs: u16,
    long_loca: bool,
) -> std::result::Result<(usize, usize), String> {
    if gid >= num_glyphs {
        return Err(format!("glyph id {gid} out of range"));
    }
    let idx = gid as usize;
    let (start, end) = if long_loca {
        if loca.len() < (idx + 2) * 4 {
            return Err("loca table truncated".into());
        }
        (
            BigEndian::read_u32(&loca[idx * 4..]) as usize,
            BigEndian::read_u32(&loca[(idx + 1) * 4..]) as usize,
        )
    } else {
        if loca.len() < (idx + 2) * 2 {
            return Err("loca table truncated".into());
        }
        (
            BigEndian::read_u16(&loca[idx * 2..]) as usize * 2,
            BigEndian::read_u16(&loca[(idx + 1) * 2..]) as usize * 2,
        )
    };
    if start > end {
        return Err("loca offsets out of order".into());
    }
    Ok((start, end))
}

/// Component glyph ids referenced by a composite outline. Empty for
/// simple and empty glyphs.
fn composite_components(outline: &[u8]) -> Vec<u16> {
    let mut components = Vec::new();
    if outline.len() < 10 || BigEndian::read_i16(&outline[0..2]) >= 0 {
        return components;
    }
    let mut pos = 10;
    loop {
        if pos + 4 > outline.len() {
            break;
        }
        let flags = BigEndian::read_u16(&outline[pos..]);
        components.push(BigEndian::read_u16(&outline[pos + 2..]));
        pos += 4;
        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    components
}

/// Rewrite the component glyph ids of a composite outline in place.
fn renumber_components(outline: &mut [u8], old_to_new: &BTreeMap<u16, u16>) {
    if outline.len() < 10 || BigEndian::read_i16(&outline[0..2]) >= 0 {
        return;
    }
    let mut pos = 10;
    loop {
        if pos + 4 > outline.len() {
            break;
        }
        let flags = BigEndian::read_u16(&outline[pos..]);
        let old = BigEndian::read_u16(&outline[pos + 2..]);
        if let Some(&new) = old_to_new.get(&old) {
            BigEndian::write_u16(&mut outline[pos + 2..pos + 4], new);
        }
        pos += 4;
        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
}

/// Build a format 4 cmap (platform 3, encoding 1) over the BMP subset of
/// the mapped characters. Supplementary-plane characters are reachable
/// through the CID mapping and need no cmap entry.
fn build_cmap_format4(char_to_gid: &BTreeMap<char, u16>) -> Vec<u8> {
    let bmp: Vec<(u16, u16)> = char_to_gid
        .iter()
        .filter(|(&c, _)| (c as u32) < 0xFFFF)
        .map(|(&c, &gid)| (c as u16, gid))
        .collect();

    // Segments of consecutive character codes.
    let mut segments: Vec<(u16, u16, Vec<u16>)> = Vec::new();
    for &(code, gid) in &bmp {
        match segments.last_mut() {
            Some((_, end, gids)) if *end + 1 == code => {
                *end = code;
                gids.push(gid);
            }
            _ => segments.push((code, code, vec![gid])),
        }
    }

    let seg_count = segments.len() + 1; // plus the 0xFFFF terminator
    let seg_count_x2 = (seg_count * 2) as u16;
    let entry_selector = (seg_count as f32).log2().floor() as u16;
    let search_range = 2 * 2u16.pow(entry_selector as u32);
    let range_shift = seg_count_x2 - search_range;

    let glyph_array: Vec<u16> = segments.iter().flat_map(|(_, _, g)| g.clone()).collect();
    let subtable_len = 16 + seg_count * 8 + glyph_array.len() * 2;

    let mut sub = Vec::with_capacity(subtable_len);
    push_u16(&mut sub, 4);
    push_u16(&mut sub, subtable_len as u16);
    push_u16(&mut sub, 0); // language
    push_u16(&mut sub, seg_count_x2);
    push_u16(&mut sub, search_range);
    push_u16(&mut sub, entry_selector);
    push_u16(&mut sub, range_shift);
    for (_, end, _) in &segments {
        push_u16(&mut sub, *end);
    }
    push_u16(&mut sub, 0xFFFF);
    push_u16(&mut sub, 0); // reservedPad
    for (start, _, _) in &segments {
        push_u16(&mut sub, *start);
    }
    push_u16(&mut sub, 0xFFFF);
    // idDelta: 0 for real segments (ids come from the glyph array),
    // 1 for the terminator so 0xFFFF maps to glyph 0.
    for _ in &segments {
        push_u16(&mut sub, 0);
    }
    push_u16(&mut sub, 1);
    // idRangeOffset: byte distance from this slot into the glyph array.
    let mut array_pos = 0usize;
    for (i, (_, _, gids)) in segments.iter().enumerate() {
        let slots_after = seg_count - i;
        push_u16(&mut sub, ((slots_after + array_pos) * 2) as u16);
        array_pos += gids.len();
    }
    push_u16(&mut sub, 0);
    for gid in &glyph_array {
        push_u16(&mut sub, *gid);
    }

    let mut cmap = Vec::with_capacity(12 + sub.len());
    push_u16(&mut cmap, 0); // version
    push_u16(&mut cmap, 1); // one encoding record
    push_u16(&mut cmap, 3); // platform: Windows
    push_u16(&mut cmap, 1); // encoding: Unicode BMP
    push_u32(&mut cmap, 12);
    cmap.extend_from_slice(&sub);
    cmap
}

/// Assemble the final sfnt container and fix up the file checksum.
fn assemble_sfnt(tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let num_tables = tables.len() as u16;
    let entry_selector = (num_tables as f32).log2().floor() as u16;
    let search_range = 16 * 2u16.pow(entry_selector as u32);

    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    push_u16(&mut out, num_tables);
    push_u16(&mut out, search_range);
    push_u16(&mut out, entry_selector);
    push_u16(&mut out, num_tables * 16 - search_range);

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for (tag, data) in tables {
        out.extend_from_slice(tag);
        push_u32(&mut out, table_checksum(data));
        push_u32(&mut out, offset as u32);
        push_u32(&mut out, data.len() as u32);
        if tag == b"head" {
            head_offset = Some(offset);
        }
        offset += (data.len() + 3) & !3;
    }
    for (_, data) in tables {
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    let adjustment = CHECKSUM_MAGIC.wrapping_sub(table_checksum(&out));
    if let Some(head) = head_offset {
        BigEndian::write_u32(&mut out[head + 8..head + 12], adjustment);
    }
    out
}

/// Big-endian u32 sum over the zero-padded table.
fn table_checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(BigEndian::read_u32(chunk));
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut last = [0u8; 4];
        last[..rest.len()].copy_from_slice(rest);
        sum = sum.wrapping_add(BigEndian::read_u32(&last));
    }
    sum
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_checksum() {
        assert_eq!(table_checksum(&[0, 0, 0, 1, 0, 0, 0, 2]), 3);
        // Remainder is zero-padded, not dropped
        assert_eq!(table_checksum(&[0x01]), 0x0100_0000);
    }

    #[test]
    fn test_composite_component_parsing() {
        // numberOfContours = -1, bbox, one component: flags (words, no
        // scale, last), glyph 7, args 0/0
        let mut outline = Vec::new();
        push_u16(&mut outline, 0xFFFF); // -1
        outline.extend_from_slice(&[0u8; 8]); // bbox
        push_u16(&mut outline, ARG_1_AND_2_ARE_WORDS);
        push_u16(&mut outline, 7);
        outline.extend_from_slice(&[0u8; 4]);
        assert_eq!(composite_components(&outline), vec![7]);

        let mut map = BTreeMap::new();
        map.insert(7u16, 2u16);
        renumber_components(&mut outline, &map);
        assert_eq!(composite_components(&outline), vec![2]);
    }

    #[test]
    fn test_simple_glyph_has_no_components() {
        let mut outline = Vec::new();
        push_u16(&mut outline, 1); // one contour
        outline.extend_from_slice(&[0u8; 8]);
        assert!(composite_components(&outline).is_empty());
    }

    #[test]
    fn test_cmap_format4_layout() {
        let mut map = BTreeMap::new();
        map.insert('A', 1u16);
        map.insert('B', 2u16);
        map.insert('a', 3u16);
        let cmap = build_cmap_format4(&map);
        // Header: version 0, one table, platform 3 encoding 1 at offset 12
        assert_eq!(BigEndian::read_u16(&cmap[0..2]), 0);
        assert_eq!(BigEndian::read_u16(&cmap[2..4]), 1);
        assert_eq!(BigEndian::read_u32(&cmap[8..12]), 12);
        // Subtable: format 4, three segments ('A'-'B', 'a', terminator)
        assert_eq!(BigEndian::read_u16(&cmap[12..14]), 4);
        assert_eq!(BigEndian::read_u16(&cmap[18..20]), 6);
    }

    #[test]
    fn test_subset_tag_is_deterministic() {
        let chars: BTreeSet<char> = "abc".chars().collect();
        let tag1 = subset_tag(b"font", &chars);
        let tag2 = subset_tag(b"font", &chars);
        assert_eq!(tag1, tag2);
        assert_eq!(tag1.len(), 6);
        assert!(tag1.chars().all(|c| c.is_ascii_uppercase()));
        assert_ne!(tag1, subset_tag(b"other", &chars));
    }

    #[test]
    fn test_loca_short_format() {
        // Short loca stores offsets divided by two.
        let loca = [0u8, 0, 0, 5, 0, 8];
        assert_eq!(glyph_location(&loca, 0, 2, false).unwrap(), (0, 10));
        assert_eq!(glyph_location(&loca, 1, 2, false).unwrap(), (10, 16));
        assert!(glyph_location(&loca, 2, 2, false).is_err());
    }
}
