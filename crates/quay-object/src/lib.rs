//! Object model for the quay storage engine.
//!
//! The four object kinds of a content-addressed repository (blobs,
//! trees, commits, annotated tags) with parsing from canonical
//! bytes, serialization back to them, and the framing header codec.

mod blob;
pub mod cache;
mod commit;
pub mod header;
mod tag;
mod tree;

pub use blob::Blob;
pub use cache::ObjectCache;
pub use commit::Commit;
pub use tag::Tag;
pub use tree::{EntryMode, Tree, TreeEntry};

use bstr::BString;
use quay_hash::{HashError, HashKind, Oid};

/// Errors produced by object parsing and serialization.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown object kind: {0}")]
    UnknownKind(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: header declares {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("commit is missing its '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("tag is missing its '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid entry mode: {0}")]
    InvalidMode(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four object kinds, with their pack type numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// Parse the kind string used in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::UnknownKind(BString::from(s))),
        }
    }

    /// The canonical byte form used in headers and hashing.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Commit => b"commit",
            Self::Tree => b"tree",
            Self::Blob => b"blob",
            Self::Tag => b"tag",
        }
    }

    /// Kind name as a str (the byte form is pure ASCII).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A fully parsed object of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse framed bytes (`"<kind> <size>\0<payload>"`).
    ///
    /// Trees embed raw digests, so the repository's hash kind is needed
    /// to know their width.
    pub fn parse(data: &[u8], hash_kind: HashKind) -> Result<Self, ObjectError> {
        let (obj_type, size, header_len) = header::parse(data)?;
        let payload = &data[header_len..];
        if payload.len() < size {
            return Err(ObjectError::Truncated {
                expected: size,
                actual: payload.len(),
            });
        }
        Self::parse_payload(obj_type, &payload[..size], hash_kind)
    }

    /// Parse a bare payload of known kind (no framing header).
    pub fn parse_payload(
        obj_type: ObjectType,
        payload: &[u8],
        hash_kind: HashKind,
    ) -> Result<Self, ObjectError> {
        Ok(match obj_type {
            ObjectType::Blob => Self::Blob(Blob::parse(payload)),
            ObjectType::Tree => Self::Tree(Tree::parse(payload, hash_kind)?),
            ObjectType::Commit => Self::Commit(Commit::parse(payload)?),
            ObjectType::Tag => Self::Tag(Tag::parse(payload)?),
        })
    }

    /// Serialize the payload (no framing header).
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone().into(),
            Self::Tree(t) => t.to_payload(),
            Self::Commit(c) => c.to_payload(),
            Self::Tag(t) => t.to_payload(),
        }
    }

    /// Serialize with the framing header prepended.
    pub fn to_framed(&self) -> Vec<u8> {
        let payload = self.to_payload();
        let mut out = header::write(self.object_type(), payload.len());
        out.extend_from_slice(&payload);
        out
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// The id this object would have under `kind`.
    pub fn id(&self, kind: HashKind) -> Result<Oid, HashError> {
        quay_hash::hasher::ObjectHasher::hash_object(
            kind,
            self.object_type().as_str(),
            &self.to_payload(),
        )
    }
}
