//! Content-addressed object store.
//!
//! Every object lives at `<objects>/xx/yyyy...` (first hex byte of the
//! id, then the rest) as zlib-compressed `"<kind> <size>\0<payload>"`.
//! Objects are write-once: a put of an existing id is a no-op, writers
//! race safely through tmp-file + atomic rename, and readers never see a
//! partial file.

mod enumerate;
mod read;
mod write;

pub use enumerate::HashIter;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quay_hash::{HashKind, Oid};
use quay_object::{ObjectCache, ObjectType};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(Oid),

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: Oid, reason: String },

    #[error("object {oid} is a {actual}, expected {expected}")]
    WrongKind {
        oid: Oid,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("hash mismatch: computed {computed}, expected {expected}")]
    HashMismatch { computed: Oid, expected: Oid },

    #[error(transparent)]
    Object(#[from] quay_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] quay_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw object as handed out by [`ObjectStore::get`]: its kind and the
/// uncompressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectType,
    pub payload: Vec<u8>,
}

/// The on-disk object store rooted at an `objects/` directory.
#[derive(Debug)]
pub struct ObjectStore {
    objects_dir: PathBuf,
    hash_kind: HashKind,
    compression: flate2::Compression,
    cache: Mutex<ObjectCache>,
}

impl ObjectStore {
    /// Open (or lazily create on first write) the store at `objects_dir`.
    pub fn open(objects_dir: impl AsRef<Path>, hash_kind: HashKind) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            hash_kind,
            compression: flate2::Compression::default(),
            cache: Mutex::new(ObjectCache::new(1024)),
        }
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash_kind
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// On-disk path for an id.
    pub fn object_path(&self, oid: &Oid) -> PathBuf {
        self.objects_dir.join(oid.store_path())
    }

    pub(crate) fn cache(&self) -> &Mutex<ObjectCache> {
        &self.cache
    }

    pub(crate) fn compression(&self) -> flate2::Compression {
        self.compression
    }
}
