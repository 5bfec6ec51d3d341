//! Batch-scoped font file cache.
//!
//! One cache is created per run and passed into each conversion, so a
//! batch reads every font file once without any process-global state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Caches raw font file bytes by path. Subsetting stays per-message
/// because the used character set differs between messages.
#[derive(Debug, Default)]
pub struct FontCache {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bytes of the font at `path`, reading it on first use.
    pub fn load(&mut self, path: &Path) -> Result<&[u8]> {
        if !self.files.contains_key(path) {
            let data = std::fs::read(path).map_err(|e| ArchiveError::FontUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            self.files.insert(path.to_path_buf(), data);
        }
        Ok(&self.files[path])
    }
}
