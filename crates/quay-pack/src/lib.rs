//! Pack container codec.
//!
//! A pack is the interchange format for object transfer: a 12-byte
//! header, a run of framed zlib-compressed objects (full or
//! delta-encoded against an earlier entry), and a SHA-1 trailer over
//! everything before it. This crate parses packs arriving off the wire
//! into fully resolved objects and writes new packs with delta
//! compression.

pub mod delta;
pub mod entry;
pub mod parse;
pub mod varint;
pub mod write;

pub use entry::{EntryHeader, RawEntry};
pub use parse::{parse_pack, ParsedObject, ParsedPack, Progress};
pub use write::{write_pack, write_thin_pack, ExternalBase, WriteOptions};

use quay_hash::Oid;
use quay_object::ObjectType;

/// Pack container constants.
pub const PACK_MAGIC: &[u8; 4] = b"PACK";
/// Version emitted by the writer.
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_LEN: usize = 12;
/// Trailer width: packs are checksummed with SHA-1 regardless of the
/// repository's object hash.
pub const PACK_TRAILER_LEN: usize = 20;

/// Errors from pack parsing, writing, and delta processing.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("truncated pack: {context} at offset {offset}")]
    Truncated { offset: u64, context: &'static str },

    #[error("not a pack: bad magic bytes")]
    BadMagic,

    #[error("unsupported pack version {0}")]
    UnsupportedVersion(u32),

    #[error("pack trailer mismatch: computed {computed}, stored {stored}")]
    TrailerMismatch { computed: Oid, stored: Oid },

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta opcode 0 at instruction offset {offset}")]
    BadDeltaOp { offset: u64 },

    #[error("{remaining} deltas left unresolved ({} base ids matched no object)", .missing_bases.len())]
    UnresolvedDelta {
        remaining: usize,
        /// REF-delta base ids that matched neither the recomputed hash
        /// of any pack object nor anything the caller could supply.
        missing_bases: Vec<Oid>,
    },

    #[error(transparent)]
    Object(#[from] quay_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] quay_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pack entry type codes (bits 6-4 of the first header byte).
pub(crate) fn type_code(kind: ObjectType) -> u8 {
    match kind {
        ObjectType::Commit => 1,
        ObjectType::Tree => 2,
        ObjectType::Blob => 3,
        ObjectType::Tag => 4,
    }
}

pub(crate) const OFS_DELTA_CODE: u8 = 6;
pub(crate) const REF_DELTA_CODE: u8 = 7;

pub(crate) fn kind_from_code(code: u8) -> Option<ObjectType> {
    match code {
        1 => Some(ObjectType::Commit),
        2 => Some(ObjectType::Tree),
        3 => Some(ObjectType::Blob),
        4 => Some(ObjectType::Tag),
        _ => None,
    }
}
