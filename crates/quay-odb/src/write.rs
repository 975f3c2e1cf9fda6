use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::write::ZlibEncoder;
use quay_hash::hasher::ObjectHasher;
use quay_hash::Oid;
use quay_object::{header, ObjectType};

use crate::{ObjectStore, OdbError};

/// Process-wide sequence making in-flight object files unique; combined
/// with the pid so writers in different processes never collide either.
static IN_FLIGHT: AtomicU64 = AtomicU64::new(0);

impl ObjectStore {
    /// Store a payload under its content address. Returns the id.
    ///
    /// Idempotent: storing an already-present object is a no-op.
    pub fn put(&self, kind: ObjectType, payload: &[u8]) -> Result<Oid, OdbError> {
        let oid = self.hash_payload(kind, payload)?;
        self.persist(&oid, kind, payload)?;
        Ok(oid)
    }

    /// Store a payload whose id the caller already computed (objects
    /// lifted out of a pack). The id is recomputed and must match before
    /// anything touches disk.
    pub fn put_raw(
        &self,
        kind: ObjectType,
        payload: &[u8],
        expected: &Oid,
    ) -> Result<Oid, OdbError> {
        let computed = self.hash_payload(kind, payload)?;
        if computed != *expected {
            return Err(OdbError::HashMismatch {
                computed,
                expected: *expected,
            });
        }
        self.persist(&computed, kind, payload)?;
        Ok(computed)
    }

    fn hash_payload(&self, kind: ObjectType, payload: &[u8]) -> Result<Oid, OdbError> {
        Ok(ObjectHasher::hash_object(
            self.hash_kind(),
            kind.as_str(),
            payload,
        )?)
    }

    /// Compress into a uniquely named `.part` file beside the final
    /// path, then rename into place. The `.part` sibling lives in the
    /// same fan-out directory, so the rename never crosses filesystems
    /// and readers polling the final path see either nothing or the
    /// complete object.
    fn persist(&self, oid: &Oid, kind: ObjectType, payload: &[u8]) -> Result<(), OdbError> {
        let final_path = self.object_path(oid);
        if final_path.is_file() {
            return Ok(());
        }

        let fanout_dir = final_path
            .parent()
            .expect("object paths always have a fan-out parent");
        fs::create_dir_all(fanout_dir)?;

        let part_path = in_flight_path(fanout_dir);
        let result = write_part_file(&part_path, kind, payload, self.compression());

        // Whatever happened, the `.part` file must not outlive this call.
        match result {
            Ok(()) => match fs::rename(&part_path, &final_path) {
                Ok(()) => Ok(()),
                Err(rename_err) => {
                    let _ = fs::remove_file(&part_path);
                    // A concurrent writer of the same id landing first is
                    // the one rename failure that counts as success: the
                    // content under a content address is interchangeable.
                    if final_path.is_file() {
                        Ok(())
                    } else {
                        Err(OdbError::Io(rename_err))
                    }
                }
            },
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(e)
            }
        }
    }
}

fn in_flight_path(fanout_dir: &std::path::Path) -> PathBuf {
    let seq = IN_FLIGHT.fetch_add(1, Ordering::Relaxed);
    fanout_dir.join(format!("obj-{}-{}.part", std::process::id(), seq))
}

fn write_part_file(
    part_path: &std::path::Path,
    kind: ObjectType,
    payload: &[u8],
    level: flate2::Compression,
) -> Result<(), OdbError> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(part_path)?;

    let mut encoder = ZlibEncoder::new(file, level);
    encoder.write_all(&header::write(kind, payload.len()))?;
    encoder.write_all(payload)?;
    let file = encoder.finish()?;
    file.sync_all()?;

    // Objects are immutable once landed; reflect that in the file bits.
    let mut perms = file.metadata()?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(part_path, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_hash::HashKind;

    #[test]
    fn put_returns_known_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path(), HashKind::Sha1);
        let oid = store.put(ObjectType::Blob, b"hello\n").unwrap();
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(store.object_path(&oid).is_file());
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path(), HashKind::Sha1);
        let a = store.put(ObjectType::Blob, b"twice").unwrap();
        let b = store.put(ObjectType::Blob, b"twice").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn put_raw_verifies_expected_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path(), HashKind::Sha1);
        let right = Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let wrong = Oid::from_hex("0000000000000000000000000000000000000001").unwrap();

        assert!(store.put_raw(ObjectType::Blob, b"hello\n", &right).is_ok());
        let err = store
            .put_raw(ObjectType::Blob, b"hello\n", &wrong)
            .unwrap_err();
        assert!(matches!(err, OdbError::HashMismatch { .. }));
        // Nothing landed under the wrong id.
        assert!(!store.has(&wrong));
    }

    #[test]
    fn stored_objects_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path(), HashKind::Sha1);
        let oid = store.put(ObjectType::Blob, b"frozen").unwrap();
        let meta = fs::metadata(store.object_path(&oid)).unwrap();
        assert!(meta.permissions().readonly());
    }

    #[test]
    fn no_part_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path(), HashKind::Sha1);
        store.put(ObjectType::Blob, b"a").unwrap();
        store.put(ObjectType::Blob, b"b").unwrap();

        let mut leftovers = Vec::new();
        for fanout in fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()) {
            if !fanout.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(fanout.path()).unwrap().filter_map(|e| e.ok()) {
                if entry.file_name().to_string_lossy().ends_with(".part") {
                    leftovers.push(entry.path());
                }
            }
        }
        assert!(leftovers.is_empty(), "stray files: {leftovers:?}");
    }
}
