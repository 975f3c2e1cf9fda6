use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use quay_hash::Oid;
use quay_utils::lockfile::Lockfile;

use crate::error::RefError;
use crate::name::RefName;
use crate::packed::PackedRefs;
use crate::Reference;

/// How many symbolic hops resolution will follow before declaring a loop.
const MAX_SYMREF_HOPS: usize = 10;

/// The expectation a mutation carries about the ref's prior value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Unconditional: overwrite whatever is there.
    Any,
    /// The ref must not exist yet (creation).
    Absent,
    /// The ref must currently hold exactly this id.
    Value(Oid),
}

/// The on-disk ref store rooted at a repository directory.
///
/// Loose refs live at `<git_dir>/<name>`; `packed-refs` supplies the
/// rest. All mutations go through a per-ref lock file and re-check the
/// prior value while holding it, so updates are compare-and-set.
#[derive(Debug)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.git_dir.join(name.as_str())
    }

    /// Read one level: the ref as stored, without following symlinks.
    pub fn lookup(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(reference) = self.read_loose(name)? {
            return Ok(Some(reference));
        }
        let packed = PackedRefs::load(&self.git_dir)?;
        Ok(packed.find(name).map(|e| Reference::Direct {
            name: e.name.clone(),
            target: e.target,
        }))
    }

    /// Resolve to the final id, following symbolic hops (bounded).
    ///
    /// `Ok(None)` means the chain ended at a ref that does not exist
    /// yet, the unborn-branch state of a fresh repository's HEAD.
    pub fn resolve(&self, name: &RefName) -> Result<Option<Oid>, RefError> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMREF_HOPS {
            match self.lookup(&current)? {
                Some(Reference::Direct { target, .. }) => return Ok(Some(target)),
                Some(Reference::Symbolic { target, .. }) => current = target,
                None => return Ok(None),
            }
        }
        Err(RefError::SymrefLoop(name.to_string()))
    }

    /// Compare-and-set a direct ref to `new`.
    pub fn set(&self, name: &RefName, new: Oid, expected: Expect) -> Result<(), RefError> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock = Lockfile::hold(&path)?;
        let current = self.current_id(name)?;
        self.check_expectation(name, expected, current)?;

        lock.write_all(format!("{}\n", new.to_hex()).as_bytes())?;
        lock.commit()?;
        Ok(())
    }

    /// Compare-and-set deletion. Removes the loose file and any packed
    /// entry of the same name.
    pub fn delete(&self, name: &RefName, expected: Expect) -> Result<(), RefError> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock = Lockfile::hold(&path)?;
        let current = self.current_id(name)?;
        if current.is_none() {
            lock.abort()?;
            return Err(RefError::NotFound(name.to_string()));
        }
        self.check_expectation(name, expected, current)?;

        if path.is_file() {
            fs::remove_file(&path)?;
        }
        let mut packed = PackedRefs::load(&self.git_dir)?;
        if packed.remove(name) {
            packed.write(&self.git_dir)?;
        }
        lock.abort()?;

        self.prune_empty_dirs(&path);
        Ok(())
    }

    /// Point `name` at another ref symbolically (`ref: <target>`).
    pub fn create_symbolic(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut lock = Lockfile::hold(&path)?;
        lock.write_all(format!("ref: {}\n", target).as_bytes())?;
        lock.commit()?;
        Ok(())
    }

    /// All refs under `prefix` (or all refs), sorted by name, loose
    /// entries shadowing packed ones. HEAD is included only without a
    /// prefix filter.
    pub fn list(&self, prefix: Option<&str>) -> Result<Vec<Reference>, RefError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<Reference> = Vec::new();

        for name in self.loose_names(prefix)? {
            if let Some(reference) = self.read_loose(&name)? {
                seen.insert(name.as_str().to_string());
                out.push(reference);
            }
        }

        let packed = PackedRefs::load(&self.git_dir)?;
        for entry in packed.entries() {
            if seen.contains(entry.name.as_str()) {
                continue;
            }
            if let Some(p) = prefix {
                if !entry.name.as_str().starts_with(p) {
                    continue;
                }
            }
            out.push(Reference::Direct {
                name: entry.name.clone(),
                target: entry.target,
            });
        }

        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    fn read_loose(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        let path = self.ref_path(name);
        let contents = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RefError::Io(e)),
        };
        let trimmed = contents.trim();

        if let Some(target) = trimmed.strip_prefix(b"ref: ") {
            let target_str = std::str::from_utf8(target.trim())
                .map_err(|_| RefError::Parse("non-UTF-8 symbolic target".into()))?;
            return Ok(Some(Reference::Symbolic {
                name: name.clone(),
                target: RefName::new(target_str)?,
            }));
        }

        let hex = std::str::from_utf8(trimmed)
            .map_err(|_| RefError::Parse("non-UTF-8 ref contents".into()))?;
        Ok(Some(Reference::Direct {
            name: name.clone(),
            target: Oid::from_hex(hex)?,
        }))
    }

    /// The id a CAS expectation is checked against: the stored direct
    /// value, or the resolved chain for a symbolic ref.
    fn current_id(&self, name: &RefName) -> Result<Option<Oid>, RefError> {
        match self.lookup(name)? {
            Some(Reference::Direct { target, .. }) => Ok(Some(target)),
            Some(Reference::Symbolic { target, .. }) => self.resolve(&target),
            None => Ok(None),
        }
    }

    fn check_expectation(
        &self,
        name: &RefName,
        expected: Expect,
        actual: Option<Oid>,
    ) -> Result<(), RefError> {
        let ok = match expected {
            Expect::Any => true,
            Expect::Absent => actual.is_none(),
            Expect::Value(v) => actual == Some(v),
        };
        if ok {
            Ok(())
        } else {
            Err(RefError::RefRaced {
                name: name.to_string(),
                expected: match expected {
                    Expect::Value(v) => Some(v),
                    _ => None,
                },
                actual,
            })
        }
    }

    fn loose_names(&self, prefix: Option<&str>) -> Result<Vec<RefName>, RefError> {
        let mut names = Vec::new();

        if prefix.is_none() {
            let head = RefName::trusted("HEAD");
            if self.ref_path(&head).is_file() {
                names.push(head);
            }
        }

        let refs_root = self.git_dir.join("refs");
        if refs_root.is_dir() {
            self.walk(&refs_root, &mut names)?;
        }

        if let Some(p) = prefix {
            names.retain(|n| n.as_str().starts_with(p));
        }
        names.sort();
        Ok(names)
    }

    fn walk(&self, dir: &Path, names: &mut Vec<RefName>) -> Result<(), RefError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, names)?;
            } else if path.is_file() {
                let Ok(rel) = path.strip_prefix(&self.git_dir) else {
                    continue;
                };
                let Some(rel_str) = rel.to_str() else {
                    continue;
                };
                if rel_str.ends_with(".lock") {
                    continue;
                }
                if let Ok(name) = RefName::new(rel_str) {
                    names.push(name);
                }
            }
        }
        Ok(())
    }

    /// Best-effort removal of directories a delete left empty.
    fn prune_empty_dirs(&self, from: &Path) {
        let refs_root = self.git_dir.join("refs");
        let mut dir = from.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == refs_root || d == self.git_dir {
                break;
            }
            if fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
    }
}
