//! Per-object framing inside a pack.
//!
//! The first byte packs the type code (bits 6-4), the low four size
//! bits (bits 3-0), and a continuation flag (bit 7); further size bytes
//! carry seven bits each, least significant first. OFS-deltas follow
//! with a biased offset varint, REF-deltas with a raw 20-byte SHA-1.

use quay_hash::{HashKind, Oid};
use quay_object::ObjectType;

use crate::varint::{read_ofs_offset, write_ofs_offset};
use crate::{kind_from_code, type_code, PackError, OFS_DELTA_CODE, REF_DELTA_CODE};

/// How an entry's payload is represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryHeader {
    /// A full object of this kind.
    Plain(ObjectType),
    /// Delta whose base lives earlier in the same pack, identified by
    /// its absolute entry offset.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by id. Always SHA-1: packs are
    /// interchange format.
    RefDelta { base: Oid },
}

/// A parsed entry header: representation, declared inflated size, and
/// where in the pack the zlib stream starts.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub header: EntryHeader,
    pub inflated_size: u64,
    /// Absolute offset of the zlib stream.
    pub data_start: u64,
}

/// Parse the entry starting at `data[0]`, which sits at absolute pack
/// offset `entry_offset`.
pub fn parse_entry(data: &[u8], entry_offset: u64) -> Result<RawEntry, PackError> {
    let truncated = |context| PackError::Truncated {
        offset: entry_offset,
        context,
    };

    let mut pos = 0usize;
    let first = *data.first().ok_or_else(|| truncated("entry header"))?;
    pos += 1;

    let code = (first >> 4) & 0x07;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4u32;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(|| truncated("entry size"))?;
        pos += 1;
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    let header = match code {
        c if kind_from_code(c).is_some() => {
            EntryHeader::Plain(kind_from_code(c).expect("guard checked the code"))
        }
        OFS_DELTA_CODE => {
            let (distance, consumed) =
                read_ofs_offset(&data[pos..]).ok_or_else(|| truncated("ofs-delta base"))?;
            pos += consumed;
            if distance > entry_offset {
                return Err(PackError::Corrupt {
                    offset: entry_offset,
                    reason: format!("ofs-delta base distance {distance} points before the pack"),
                });
            }
            EntryHeader::OfsDelta {
                base_offset: entry_offset - distance,
            }
        }
        REF_DELTA_CODE => {
            let digest_len = HashKind::Sha1.digest_len();
            let raw = data
                .get(pos..pos + digest_len)
                .ok_or_else(|| truncated("ref-delta base id"))?;
            pos += digest_len;
            let base = Oid::from_bytes(raw, HashKind::Sha1)
                .expect("slice length just checked");
            EntryHeader::RefDelta { base }
        }
        other => {
            return Err(PackError::Corrupt {
                offset: entry_offset,
                reason: format!("unknown entry type code {other}"),
            })
        }
    };

    Ok(RawEntry {
        header,
        inflated_size: size,
        data_start: entry_offset + pos as u64,
    })
}

/// Encode a plain-object entry header.
pub fn encode_plain_header(kind: ObjectType, size: u64) -> Vec<u8> {
    encode_header(type_code(kind), size)
}

/// Encode an OFS-delta entry header including the base distance.
pub fn encode_ofs_header(size: u64, distance: u64) -> Vec<u8> {
    let mut out = encode_header(OFS_DELTA_CODE, size);
    out.extend_from_slice(&write_ofs_offset(distance));
    out
}

/// Encode a REF-delta entry header including the base id.
pub fn encode_ref_header(size: u64, base: &Oid) -> Vec<u8> {
    let mut out = encode_header(REF_DELTA_CODE, size);
    out.extend_from_slice(base.as_bytes());
    out
}

fn encode_header(code: u8, size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    let mut rest = size >> 4;
    let mut current = (code << 4) | (size & 0x0f) as u8;
    while rest > 0 {
        out.push(current | 0x80);
        current = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(current);
    out
}
