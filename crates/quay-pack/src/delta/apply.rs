use crate::varint::read_varint_le7;
use crate::PackError;

/// Reconstruct a target object from its base and a delta stream.
///
/// The declared source size must equal `base.len()` and the output must
/// land exactly on the declared target size; every copy is bounds
/// checked against the base.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0usize;

    let (source_size, consumed) =
        read_varint_le7(delta).ok_or_else(|| PackError::InvalidDelta {
            offset: 0,
            reason: "truncated source size".into(),
        })?;
    pos += consumed;

    let (target_size, consumed) =
        read_varint_le7(&delta[pos..]).ok_or_else(|| PackError::InvalidDelta {
            offset: pos as u64,
            reason: "truncated target size".into(),
        })?;
    pos += consumed;

    if source_size != base.len() as u64 {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "declared source size {source_size} but base is {} bytes",
                base.len()
            ),
        });
    }

    let mut out = Vec::with_capacity(target_size as usize);

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;

        if op & 0x80 != 0 {
            let (offset, size) = decode_copy(op, delta, &mut pos)?;
            let end = offset
                .checked_add(size)
                .filter(|&e| e <= base.len())
                .ok_or_else(|| PackError::InvalidDelta {
                    offset: pos as u64,
                    reason: format!(
                        "copy past base end: offset {offset} + size {size} > {}",
                        base.len()
                    ),
                })?;
            out.extend_from_slice(&base[offset..end]);
        } else if op != 0 {
            let len = op as usize;
            let literal = delta.get(pos..pos + len).ok_or_else(|| {
                PackError::InvalidDelta {
                    offset: pos as u64,
                    reason: "truncated insert literal".into(),
                }
            })?;
            out.extend_from_slice(literal);
            pos += len;
        } else {
            return Err(PackError::BadDeltaOp {
                offset: (pos - 1) as u64,
            });
        }
    }

    if out.len() as u64 != target_size {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "declared target size {target_size} but produced {}",
                out.len()
            ),
        });
    }

    Ok(out)
}

/// Decode the sparse offset/size bytes of a copy instruction. The seven
/// low bits of `op` say which of the seven little-endian bytes follow.
fn decode_copy(op: u8, delta: &[u8], pos: &mut usize) -> Result<(usize, usize), PackError> {
    let mut take = |what: &'static str| -> Result<usize, PackError> {
        let byte = *delta.get(*pos).ok_or_else(|| PackError::InvalidDelta {
            offset: *pos as u64,
            reason: format!("truncated copy {what}"),
        })?;
        *pos += 1;
        Ok(byte as usize)
    };

    let mut offset = 0usize;
    for (bit, shift) in [(0x01u8, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
        if op & bit != 0 {
            offset |= take("offset")? << shift;
        }
    }

    let mut size = 0usize;
    for (bit, shift) in [(0x10u8, 0), (0x20, 8), (0x40, 16)] {
        if op & bit != 0 {
            size |= take("size")? << shift;
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}
