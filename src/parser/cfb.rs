//! Minimal reader for OLE compound files (MS-CFB), the container used by
//! Outlook `.msg` messages.
//!
//! Only what `.msg` extraction needs: FAT and mini-FAT chains, the
//! directory tree, and stream reads. No write support.

use byteorder::{ByteOrder, LittleEndian};

const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const NOSTREAM: u32 = 0xFFFF_FFFF;

/// Directory entry object types.
pub const TYPE_STORAGE: u8 = 1;
pub const TYPE_STREAM: u8 = 2;
pub const TYPE_ROOT: u8 = 5;

/// One entry of the compound-file directory.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Decoded UTF-16 entry name.
    pub name: String,
    /// Object type (`TYPE_STORAGE`, `TYPE_STREAM`, `TYPE_ROOT`).
    pub obj_type: u8,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    size: u64,
}

/// A parsed compound file.
pub struct CompoundFile<'a> {
    data: &'a [u8],
    sector_size: usize,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_cutoff: u64,
    mini_stream: Vec<u8>,
    entries: Vec<DirEntry>,
}

impl<'a> CompoundFile<'a> {
    /// Parse the header, FAT structures and directory of a compound file.
    pub fn parse(data: &'a [u8]) -> Result<Self, String> {
        if data.len() < 512 || data[..8] != SIGNATURE {
            return Err("not an OLE compound file".into());
        }

        let sector_shift = LittleEndian::read_u16(&data[30..32]);
        if sector_shift != 9 && sector_shift != 12 {
            return Err(format!("unsupported sector shift {sector_shift}"));
        }
        let sector_size = 1usize << sector_shift;

        let first_dir_sector = LittleEndian::read_u32(&data[48..52]);
        let mini_cutoff = LittleEndian::read_u32(&data[56..60]) as u64;
        let first_mini_fat = LittleEndian::read_u32(&data[60..64]);
        let first_difat = LittleEndian::read_u32(&data[68..72]);
        let num_difat = LittleEndian::read_u32(&data[72..76]);

        // FAT sector list: 109 header entries plus chained DIFAT sectors.
        let mut fat_sectors = Vec::new();
        for i in 0..109 {
            let sect = LittleEndian::read_u32(&data[76 + i * 4..80 + i * 4]);
            if sect != FREESECT && sect != ENDOFCHAIN {
                fat_sectors.push(sect);
            }
        }
        let mut difat_sector = first_difat;
        let mut difat_seen = 0u32;
        while difat_sector != ENDOFCHAIN && difat_sector != FREESECT {
            if difat_seen > num_difat + 1 {
                return Err("DIFAT chain loop".into());
            }
            let sect = sector(data, sector_size, difat_sector)?;
            let per_sector = sector_size / 4 - 1;
            for i in 0..per_sector {
                let entry = LittleEndian::read_u32(&sect[i * 4..i * 4 + 4]);
                if entry != FREESECT && entry != ENDOFCHAIN {
                    fat_sectors.push(entry);
                }
            }
            difat_sector = LittleEndian::read_u32(&sect[sector_size - 4..]);
            difat_seen += 1;
        }

        let mut fat = Vec::with_capacity(fat_sectors.len() * (sector_size / 4));
        for &s in &fat_sectors {
            let sect = sector(data, sector_size, s)?;
            for chunk in sect.chunks_exact(4) {
                fat.push(LittleEndian::read_u32(chunk));
            }
        }

        let mut file = Self {
            data,
            sector_size,
            fat,
            mini_fat: Vec::new(),
            mini_cutoff,
            mini_stream: Vec::new(),
            entries: Vec::new(),
        };

        // Directory
        let dir_bytes = file.read_chain(first_dir_sector, usize::MAX)?;
        for raw in dir_bytes.chunks_exact(128) {
            file.entries.push(parse_dir_entry(raw));
        }
        if file.entries.is_empty() || file.entries[0].obj_type != TYPE_ROOT {
            return Err("missing root directory entry".into());
        }

        // Mini FAT and the mini stream (held by the root entry)
        let mini_fat_bytes = file.read_chain(first_mini_fat, usize::MAX)?;
        file.mini_fat = mini_fat_bytes
            .chunks_exact(4)
            .map(LittleEndian::read_u32)
            .collect();
        let root = file.entries[0].clone();
        file.mini_stream = file.read_chain(root.start_sector, root.size as usize)?;

        Ok(file)
    }

    /// All directory entries. Index 0 is the root storage.
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Indices of the direct children of a storage entry, left-to-right.
    pub fn children(&self, storage: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(entry) = self.entries.get(storage) else {
            return out;
        };
        // Pre-order stack walk of the sibling tree; the index sort below
        // restores a stable order, so tree balance and color never matter.
        let mut stack = vec![entry.child];
        let mut visited = 0usize;
        while let Some(id) = stack.pop() {
            if id == NOSTREAM || id as usize >= self.entries.len() {
                continue;
            }
            visited += 1;
            if visited > self.entries.len() {
                break;
            }
            let node = &self.entries[id as usize];
            out.push(id as usize);
            stack.push(node.left);
            stack.push(node.right);
        }
        out.sort_unstable();
        out
    }

    /// Find a direct child of `storage` by exact name.
    pub fn child_by_name(&self, storage: usize, name: &str) -> Option<usize> {
        self.children(storage)
            .into_iter()
            .find(|&i| self.entries[i].name == name)
    }

    /// Read the full content of a stream entry.
    pub fn read_stream(&self, index: usize) -> Result<Vec<u8>, String> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| "directory index out of range".to_string())?;
        if entry.obj_type != TYPE_STREAM {
            return Err(format!("'{}' is not a stream", entry.name));
        }
        let size = entry.size as usize;
        if entry.size < self.mini_cutoff {
            self.read_mini_chain(entry.start_sector, size)
        } else {
            self.read_chain(entry.start_sector, size)
        }
    }

    fn read_chain(&self, start: u32, limit: usize) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        let mut sect = start;
        let max_sectors = self.data.len() / self.sector_size + 1;
        let mut count = 0usize;
        while sect != ENDOFCHAIN && sect != FREESECT {
            count += 1;
            if count > max_sectors {
                return Err("sector chain loop".into());
            }
            out.extend_from_slice(sector(self.data, self.sector_size, sect)?);
            sect = *self
                .fat
                .get(sect as usize)
                .ok_or_else(|| "sector index outside FAT".to_string())?;
        }
        if limit < out.len() {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn read_mini_chain(&self, start: u32, limit: usize) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        let mut sect = start;
        let max_sectors = self.mini_stream.len() / 64 + 1;
        let mut count = 0usize;
        while sect != ENDOFCHAIN && sect != FREESECT {
            count += 1;
            if count > max_sectors {
                return Err("mini sector chain loop".into());
            }
            let off = sect as usize * 64;
            if off + 64 > self.mini_stream.len() {
                return Err("mini sector outside mini stream".into());
            }
            out.extend_from_slice(&self.mini_stream[off..off + 64]);
            sect = *self
                .mini_fat
                .get(sect as usize)
                .ok_or_else(|| "mini sector index outside mini FAT".to_string())?;
        }
        if limit < out.len() {
            out.truncate(limit);
        }
        Ok(out)
    }
}

/// Slice one sector out of the file. Sector 0 starts right after the header.
fn sector(data: &[u8], sector_size: usize, index: u32) -> Result<&[u8], String> {
    let off = (index as usize + 1) * sector_size;
    if off + sector_size > data.len() {
        return Err(format!("sector {index} outside file"));
    }
    Ok(&data[off..off + sector_size])
}

fn parse_dir_entry(raw: &[u8]) -> DirEntry {
    let name_len = LittleEndian::read_u16(&raw[64..66]) as usize;
    // name_len counts bytes including the trailing NUL
    let name = if name_len >= 2 && name_len <= 64 {
        let (decoded, _, _) = encoding_rs::UTF_16LE.decode(&raw[..name_len - 2]);
        decoded.into_owned()
    } else {
        String::new()
    };

    DirEntry {
        name,
        obj_type: raw[66],
        left: LittleEndian::read_u32(&raw[68..72]),
        right: LittleEndian::read_u32(&raw[72..76]),
        child: LittleEndian::read_u32(&raw[76..80]),
        start_sector: LittleEndian::read_u32(&raw[116..120]),
        size: LittleEndian::read_u64(&raw[120..128]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_cfb() {
        assert!(CompoundFile::parse(b"not a compound file").is_err());
        let mut data = vec![0u8; 1024];
        data[..4].copy_from_slice(b"%PDF");
        assert!(CompoundFile::parse(&data).is_err());
    }

    #[test]
    fn test_dir_entry_name_decoding() {
        let mut raw = [0u8; 128];
        // "Root" as UTF-16LE
        for (i, b) in [b'R', 0, b'o', 0, b'o', 0, b't', 0].iter().enumerate() {
            raw[i] = *b;
        }
        raw[64] = 10; // 4 chars * 2 + NUL pair
        raw[66] = TYPE_ROOT;
        let entry = parse_dir_entry(&raw);
        assert_eq!(entry.name, "Root");
        assert_eq!(entry.obj_type, TYPE_ROOT);
    }
}
