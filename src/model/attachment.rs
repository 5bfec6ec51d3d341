//! Attachment data.
//!
//! Created once during parsing, read-only thereafter, owned by the
//! `Message`. Content bytes are kept exactly as decoded from the
//! container — embedding never re-encodes them.

/// One binary part of a message: a regular attachment or an inline object.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename of the attachment. Generated if missing from the headers.
    pub filename: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub mime_type: String,

    /// Decoded content bytes.
    pub content_bytes: Vec<u8>,

    /// `true` if the part is referenced inline from the body (inline
    /// disposition or a Content-ID), `false` for a standalone attachment.
    pub is_inline: bool,
}

impl Attachment {
    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.content_bytes.len() as u64
    }
}
