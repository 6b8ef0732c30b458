//! Decoder for the MO3 compressed tracker-module container.
//!
//! A container is a small header, an LZ-compressed "music chunk"
//! (title/message strings, file header, order list, track pool,
//! instrument and sample records), and a tail of per-sample payload
//! blocks. [`load`] turns a whole container into an [`mo3_ir::Module`];
//! [`probe`] is the cheap header check used to route a file between
//! loaders without decoding anything.
//!
//! Decoding is synchronous and pure: one input slice in, one module (or
//! one error) out. All decompressor state lives in per-call structs, so
//! independent decodes can run on separate threads freely.

mod bitstream;
mod delta;
mod loader;
mod lz;
mod reader;
mod records;
mod tracks;

pub use loader::{load, probe, LoadOptions};

use thiserror::Error;

/// Error type for container decoding.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Missing magic bytes or a nonsensical declared size; the file is
    /// not an MO3 container and the caller should try its next loader.
    #[error("not an MO3 container")]
    InvalidHeader,
    /// Valid magic, but a format revision this decoder does not know.
    #[error("unsupported MO3 format revision {0}")]
    UnsupportedVersion(u8),
    /// A read ran past the end of the input or of the music chunk.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// Structurally invalid data inside an otherwise readable container.
    #[error("corrupted container: {0}")]
    Corrupted(&'static str),
}
