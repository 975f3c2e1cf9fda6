//! Repository handle: the directory layout binding an object store and
//! a ref store together, with the hash kind chosen at creation.
//!
//! Only bare repositories exist here; this engine serves transports, it
//! has no working tree.

mod init;

pub use init::InitOptions;

use std::path::{Path, PathBuf};

use quay_hash::HashKind;
use quay_odb::ObjectStore;
use quay_ref::{RefName, RefStore, Reference};

/// Errors from repository open/init.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("unsupported object format: {0}")]
    UnsupportedObjectFormat(String),

    #[error(transparent)]
    Ref(#[from] quay_ref::RefError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open repository.
#[derive(Debug)]
pub struct Repository {
    git_dir: PathBuf,
    hash_kind: HashKind,
    objects: ObjectStore,
    refs: RefStore,
}

impl Repository {
    /// Open an existing bare repository.
    ///
    /// The hash kind is re-read from the config written at init time.
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self, RepoError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        if !git_dir.join("HEAD").is_file() {
            return Err(RepoError::NotARepository(git_dir));
        }

        let hash_kind = read_object_format(&git_dir)?;
        Ok(Self {
            objects: ObjectStore::open(git_dir.join("objects"), hash_kind),
            refs: RefStore::new(&git_dir),
            git_dir,
            hash_kind,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash_kind
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// The branch HEAD points at, when it is symbolic.
    pub fn head_target(&self) -> Result<Option<RefName>, RepoError> {
        let head = RefName::new("HEAD")?;
        Ok(match self.refs.lookup(&head)? {
            Some(Reference::Symbolic { target, .. }) => Some(target),
            _ => None,
        })
    }
}

/// Pull `objectformat` out of the config. Absent means SHA-1.
fn read_object_format(git_dir: &Path) -> Result<HashKind, RepoError> {
    let config = match std::fs::read_to_string(git_dir.join("config")) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashKind::Sha1),
        Err(e) => return Err(RepoError::Io(e)),
    };

    for line in config.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("objectformat") {
            let value = value.trim_start_matches([' ', '=']).trim();
            return HashKind::from_name(value)
                .ok_or_else(|| RepoError::UnsupportedObjectFormat(value.to_string()));
        }
    }
    Ok(HashKind::Sha1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RepoError::NotARepository(_)));
    }

    #[test]
    fn init_then_open_sha1() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        assert_eq!(repo.hash_kind(), HashKind::Sha1);

        let reopened = Repository::open(dir.path()).unwrap();
        assert_eq!(reopened.hash_kind(), HashKind::Sha1);
        assert_eq!(
            reopened.head_target().unwrap().unwrap().as_str(),
            "refs/heads/main"
        );
    }

    #[test]
    fn init_then_open_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let options = InitOptions {
            hash_kind: HashKind::Sha256,
            ..Default::default()
        };
        Repository::init(dir.path(), &options).unwrap();

        let reopened = Repository::open(dir.path()).unwrap();
        assert_eq!(reopened.hash_kind(), HashKind::Sha256);
    }

    #[test]
    fn bogus_object_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path(), &InitOptions::default()).unwrap();
        std::fs::write(
            dir.path().join("config"),
            "[extensions]\n\tobjectformat = md5\n",
        )
        .unwrap();

        assert!(matches!(
            Repository::open(dir.path()).unwrap_err(),
            RepoError::UnsupportedObjectFormat(_)
        ));
    }
}
