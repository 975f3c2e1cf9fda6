use bstr::{BStr, BString, ByteSlice};
use quay_hash::Oid;
use quay_utils::ident::Identity;

use crate::ObjectError;

/// A commit: a snapshot (tree) plus history links (parents) plus the
/// identities and message that describe the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Identity,
    pub committer: Identity,
    /// Headers this engine has no opinion about (encoding, gpgsig,
    /// mergetag, …), preserved verbatim so payloads roundtrip.
    pub extra: Vec<(BString, BString)>,
    pub message: BString,
}

/// Split a header block into `(key, value)` pairs, folding continuation
/// lines (leading space) into the preceding value with `\n` joints.
fn header_fields(block: &[u8]) -> Vec<(&[u8], BString)> {
    let mut fields: Vec<(&[u8], BString)> = Vec::new();
    for line in block.split(|&b| b == b'\n') {
        if let Some(cont) = line.strip_prefix(b" ") {
            if let Some(last) = fields.last_mut() {
                last.1.push(b'\n');
                last.1.extend_from_slice(cont);
            }
            continue;
        }
        match line.iter().position(|&b| b == b' ') {
            Some(space) => fields.push((&line[..space], BString::from(&line[space + 1..]))),
            None if line.is_empty() => {}
            None => fields.push((line, BString::new(Vec::new()))),
        }
    }
    fields
}

/// Write one header field, re-expanding embedded newlines into
/// continuation lines.
fn put_field(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    for (i, part) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(part);
    }
    out.push(b'\n');
}

impl Commit {
    /// Parse a commit payload (no framing header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        // The first blank line ends the header block; the rest is message.
        let (head, message) = match payload.find(b"\n\n") {
            Some(split) => (&payload[..split], BString::from(&payload[split + 2..])),
            None => (payload, BString::new(Vec::new())),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra = Vec::new();

        for (key, value) in header_fields(head) {
            match key {
                b"tree" => tree = Some(parse_oid_value(&value, "tree")?),
                b"parent" => parents.push(parse_oid_value(&value, "parent")?),
                b"author" => author = Some(parse_identity(&value)?),
                b"committer" => committer = Some(parse_identity(&value)?),
                _ => extra.push((BString::from(key), value)),
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer
                .ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            extra,
            message,
        })
    }

    /// Serialize back to the canonical payload.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_field(&mut out, b"tree", self.tree.to_hex().as_bytes());
        for parent in &self.parents {
            put_field(&mut out, b"parent", parent.to_hex().as_bytes());
        }
        put_field(&mut out, b"author", &self.author.to_bytes());
        put_field(&mut out, b"committer", &self.committer.to_bytes());
        for (key, value) in &self.extra {
            put_field(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(end) => BStr::new(&msg[..end]),
            None => BStr::new(msg),
        }
    }
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<Oid, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF-8 {field} id")))?;
    Ok(Oid::from_hex(hex)?)
}

fn parse_identity(value: &[u8]) -> Result<Identity, ObjectError> {
    Identity::parse(BStr::new(value)).map_err(|e| ObjectError::InvalidIdentity(e.to_string()))
}
