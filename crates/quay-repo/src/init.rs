use std::fs;
use std::path::Path;

use quay_hash::HashKind;
use quay_ref::RefName;

use crate::{RepoError, Repository};

/// Choices fixed at repository creation.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Branch HEAD points at before the first push.
    pub default_branch: String,
    /// Object hash, immutable for the repository's lifetime.
    pub hash_kind: HashKind,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            default_branch: "main".into(),
            hash_kind: HashKind::default(),
        }
    }
}

impl Repository {
    /// Create a bare repository at `git_dir`.
    ///
    /// Re-running init on an existing repository is a safe no-op that
    /// opens it instead; existing data is never overwritten.
    pub fn init(git_dir: impl AsRef<Path>, options: &InitOptions) -> Result<Self, RepoError> {
        let git_dir = git_dir.as_ref();

        if git_dir.join("HEAD").is_file() {
            return Self::open(git_dir);
        }

        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs").join("heads"))?;
        fs::create_dir_all(git_dir.join("refs").join("tags"))?;

        let mut config = String::from(
            "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = true\n",
        );
        if options.hash_kind != HashKind::Sha1 {
            config = format!(
                "[core]\n\trepositoryformatversion = 1\n\tfilemode = true\n\tbare = true\n\
                 [extensions]\n\tobjectformat = {}\n",
                options.hash_kind.name()
            );
        }
        fs::write(git_dir.join("config"), config)?;

        fs::write(
            git_dir.join("description"),
            "Unnamed repository; edit this file 'description' to name the repository.\n",
        )?;

        let repo = Self {
            objects: quay_odb::ObjectStore::open(git_dir.join("objects"), options.hash_kind),
            refs: quay_ref::RefStore::new(git_dir),
            git_dir: git_dir.to_path_buf(),
            hash_kind: options.hash_kind,
        };

        // HEAD is born symbolic, aimed at the (still unborn) default branch.
        let head = RefName::new("HEAD")?;
        let branch = RefName::new(format!("refs/heads/{}", options.default_branch))?;
        repo.refs.create_symbolic(&head, &branch)?;

        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_bare_layout() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path(), &InitOptions::default()).unwrap();

        for expected in ["objects", "refs/heads", "refs/tags"] {
            assert!(dir.path().join(expected).is_dir(), "{expected}");
        }
        let head = fs::read_to_string(dir.path().join("HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/main\n");
        let config = fs::read_to_string(dir.path().join("config")).unwrap();
        assert!(config.contains("bare = true"));
    }

    #[test]
    fn custom_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let options = InitOptions {
            default_branch: "trunk".into(),
            ..Default::default()
        };
        let repo = Repository::init(dir.path(), &options).unwrap();
        assert_eq!(
            repo.head_target().unwrap().unwrap().as_str(),
            "refs/heads/trunk"
        );
    }

    #[test]
    fn sha256_records_object_format() {
        let dir = tempfile::tempdir().unwrap();
        let options = InitOptions {
            hash_kind: HashKind::Sha256,
            ..Default::default()
        };
        Repository::init(dir.path(), &options).unwrap();
        let config = fs::read_to_string(dir.path().join("config")).unwrap();
        assert!(config.contains("objectformat = sha256"));
        assert!(config.contains("repositoryformatversion = 1"));
    }

    #[test]
    fn reinit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();

        // Seed a ref, re-init, confirm it survived.
        let main = RefName::new("refs/heads/main").unwrap();
        repo.refs()
            .set(
                &main,
                quay_hash::Oid::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap(),
                quay_ref::Expect::Absent,
            )
            .unwrap();

        let again = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        assert!(again.refs().resolve(&main).unwrap().is_some());
    }
}
