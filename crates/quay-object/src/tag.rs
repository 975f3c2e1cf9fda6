use bstr::{BStr, BString, ByteSlice};
use quay_hash::Oid;
use quay_utils::ident::Identity;

use crate::{ObjectError, ObjectType};

/// An annotated tag: a named, messaged pointer at another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: Oid,
    pub target_type: ObjectType,
    pub name: BString,
    /// Very old tags in the wild omit the tagger.
    pub tagger: Option<Identity>,
    /// Message, including any trailing signature block.
    pub message: BString,
}

impl Tag {
    /// Parse a tag payload (no framing header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let (head, message) = match payload.find(b"\n\n") {
            Some(split) => (&payload[..split], BString::from(&payload[split + 2..])),
            None => (payload, BString::new(Vec::new())),
        };

        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        for line in head.split(|&b| b == b'\n') {
            let Some(space) = line.iter().position(|&b| b == b' ') else {
                continue;
            };
            let (key, value) = (&line[..space], &line[space + 1..]);
            match key {
                b"object" => {
                    let hex = std::str::from_utf8(value).map_err(|_| {
                        ObjectError::InvalidHeader("non-UTF-8 target id".into())
                    })?;
                    target = Some(Oid::from_hex(hex)?);
                }
                b"type" => target_type = Some(ObjectType::from_bytes(value)?),
                b"tag" => name = Some(BString::from(value)),
                b"tagger" => {
                    tagger = Some(Identity::parse(BStr::new(value)).map_err(|e| {
                        ObjectError::InvalidIdentity(e.to_string())
                    })?);
                }
                _ => {}
            }
        }

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_type: target_type.ok_or(ObjectError::MissingTagField { field: "type" })?,
            name: name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message,
        })
    }

    /// Serialize back to the canonical payload.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}
