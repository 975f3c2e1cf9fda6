use std::collections::HashMap;

use super::{encode_copy, encode_insert};
use crate::varint::write_varint_le7;

/// Chunk width for the source index. Matches must start on one of these
/// boundaries in the source but can extend past them byte-by-byte.
const CHUNK: usize = 16;

/// Largest literal one insert instruction can carry.
const MAX_INSERT: usize = 127;

/// Largest span one copy instruction can address (24-bit size).
const MAX_COPY: usize = 0x0100_0000;

/// Compute a delta turning `source` into `target`.
///
/// Returns `None` when a delta cannot pay for itself: tiny targets
/// (under 16 bytes) or a result that is not strictly smaller than the
/// target.
pub fn make_delta(source: &[u8], target: &[u8]) -> Option<Vec<u8>> {
    if target.len() < 16 {
        return None;
    }

    let mut delta = write_varint_le7(source.len() as u64);
    delta.extend_from_slice(&write_varint_le7(target.len() as u64));

    let index = chunk_index(source);

    let mut pos = 0usize;
    let mut literal_start = 0usize;

    while pos < target.len() {
        let matched = if target.len() - pos >= CHUNK {
            index
                .get(&target[pos..pos + CHUNK])
                .map(|&src_off| (src_off, extend(source, src_off, target, pos)))
        } else {
            None
        };

        match matched {
            Some((src_off, len)) => {
                flush_literal(&mut delta, &target[literal_start..pos]);
                emit_copy(&mut delta, src_off as u64, len);
                pos += len;
                literal_start = pos;
            }
            None => pos += 1,
        }

        if delta.len() >= target.len() {
            // Already larger than the target; no point finishing.
            return None;
        }
    }
    flush_literal(&mut delta, &target[literal_start..]);

    (delta.len() < target.len()).then_some(delta)
}

/// Map each CHUNK-wide slice of source (on chunk boundaries) to its
/// first occurrence.
fn chunk_index(source: &[u8]) -> HashMap<&[u8], usize> {
    let mut index = HashMap::new();
    if source.len() >= CHUNK {
        for offset in (0..=source.len() - CHUNK).step_by(CHUNK) {
            index.entry(&source[offset..offset + CHUNK]).or_insert(offset);
        }
    }
    index
}

/// Length of the match between `source[src_off..]` and `target[tgt_off..]`,
/// at least CHUNK, extended greedily.
fn extend(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let limit = (source.len() - src_off).min(target.len() - tgt_off);
    let mut len = CHUNK;
    while len < limit && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

/// Emit pending literal bytes as insert instructions of at most
/// MAX_INSERT each.
fn flush_literal(delta: &mut Vec<u8>, mut literal: &[u8]) {
    while !literal.is_empty() {
        let take = literal.len().min(MAX_INSERT);
        delta.extend_from_slice(&encode_insert(&literal[..take]));
        literal = &literal[take..];
    }
}

/// Emit a copy, split to respect the 24-bit per-instruction size cap.
fn emit_copy(delta: &mut Vec<u8>, mut offset: u64, mut len: usize) {
    while len > 0 {
        let take = len.min(MAX_COPY);
        delta.extend_from_slice(&encode_copy(offset, take));
        offset += take as u64;
        len -= take;
    }
}
