//! Archival PDF production: compliance metadata, embedded files, and
//! final document assembly.

pub mod assemble;
pub mod embed;
pub mod metadata;
