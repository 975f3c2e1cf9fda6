//! The framing header every stored object carries: `"<kind> <size>\0"`.

use crate::{ObjectError, ObjectType};

/// Parse a framing header. Returns `(kind, payload_size, header_len)`
/// where `header_len` includes the NUL.
pub fn parse(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;
    let head = &data[..nul];

    let space = head
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space separator".into()))?;

    let obj_type = ObjectType::from_bytes(&head[..space])?;
    let size = std::str::from_utf8(&head[space + 1..])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ObjectError::InvalidHeader(format!(
                "unparseable size: {:?}",
                String::from_utf8_lossy(&head[space + 1..])
            ))
        })?;

    Ok((obj_type, size, nul + 1))
}

/// Write a framing header for `size` payload bytes.
pub fn write(obj_type: ObjectType, size: usize) -> Vec<u8> {
    format!("{} {}\0", obj_type, size).into_bytes()
}
