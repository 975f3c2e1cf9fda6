use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use quay_hash::Oid;
use quay_object::{header, Commit, Object, ObjectType, Tag, Tree};

use crate::{ObjectStore, OdbError, RawObject};

impl ObjectStore {
    /// Existence check without decompression.
    pub fn has(&self, oid: &Oid) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read an object. `Ok(None)` when absent, `Corrupt` when the stored
    /// bytes don't inflate to a well-formed framed object.
    pub fn get(&self, oid: &Oid) -> Result<Option<RawObject>, OdbError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OdbError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut framed = Vec::new();
        decoder.read_to_end(&mut framed).map_err(|e| OdbError::Corrupt {
            oid: *oid,
            reason: format!("zlib: {e}"),
        })?;

        let (kind, size, header_len) = header::parse(&framed).map_err(|e| OdbError::Corrupt {
            oid: *oid,
            reason: e.to_string(),
        })?;
        let payload = &framed[header_len..];
        if payload.len() != size {
            return Err(OdbError::Corrupt {
                oid: *oid,
                reason: format!("declared {size} payload bytes, found {}", payload.len()),
            });
        }

        Ok(Some(RawObject {
            kind,
            payload: payload.to_vec(),
        }))
    }

    /// Like [`get`](Self::get) but absence is an error.
    pub fn require(&self, oid: &Oid) -> Result<RawObject, OdbError> {
        self.get(oid)?.ok_or(OdbError::NotFound(*oid))
    }

    /// Read and parse, going through the parsed-object cache.
    pub fn get_parsed(&self, oid: &Oid) -> Result<Option<Object>, OdbError> {
        {
            let mut cache = self.cache().lock().unwrap();
            if let Some(obj) = cache.get(oid) {
                return Ok(Some(obj.clone()));
            }
        }

        let Some(raw) = self.get(oid)? else {
            return Ok(None);
        };
        let obj = Object::parse_payload(raw.kind, &raw.payload, self.hash_kind())?;

        let mut cache = self.cache().lock().unwrap();
        cache.insert(*oid, obj.clone());
        Ok(Some(obj))
    }

    /// Typed read: the object must be a commit.
    pub fn read_commit(&self, oid: &Oid) -> Result<Commit, OdbError> {
        match self.get_parsed(oid)?.ok_or(OdbError::NotFound(*oid))? {
            Object::Commit(c) => Ok(c),
            other => Err(self.wrong_kind(oid, ObjectType::Commit, &other)),
        }
    }

    /// Typed read: the object must be a tree.
    pub fn read_tree(&self, oid: &Oid) -> Result<Tree, OdbError> {
        match self.get_parsed(oid)?.ok_or(OdbError::NotFound(*oid))? {
            Object::Tree(t) => Ok(t),
            other => Err(self.wrong_kind(oid, ObjectType::Tree, &other)),
        }
    }

    /// Typed read: the object must be an annotated tag.
    pub fn read_tag(&self, oid: &Oid) -> Result<Tag, OdbError> {
        match self.get_parsed(oid)?.ok_or(OdbError::NotFound(*oid))? {
            Object::Tag(t) => Ok(t),
            other => Err(self.wrong_kind(oid, ObjectType::Tag, &other)),
        }
    }

    fn wrong_kind(&self, oid: &Oid, expected: ObjectType, actual: &Object) -> OdbError {
        OdbError::WrongKind {
            oid: *oid,
            expected,
            actual: actual.object_type(),
        }
    }
}
