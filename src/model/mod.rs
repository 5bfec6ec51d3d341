//! Data model: the normalized message and its attachments.

pub mod attachment;
pub mod message;
