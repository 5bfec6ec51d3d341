//! `mailarc` converts email messages (`.eml`, `.msg`) into single,
//! self-contained archival PDF documents.
//!
//! The produced file renders the message as pages, embeds every
//! attachment and the original source message as retrievable files with
//! explicit relationship labels, and carries the metadata the PDF/A-3B
//! profile requires: XMP packet, normalized timestamps, color output
//! intent, and subset embedded fonts.
//!
//! The pipeline is a strict sequence of near-pure stages:
//! parse → validate metadata → subset fonts → layout → embed → assemble,
//! with the output written in one step only after assembly succeeds.

pub mod config;
pub mod convert;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod model;
pub mod parser;
pub mod pdf;
pub mod style;

pub use error::{ArchiveError, Result};
