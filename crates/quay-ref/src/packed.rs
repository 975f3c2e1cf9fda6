//! The `packed-refs` file: many refs collapsed into one sorted listing.
//!
//! Format:
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex-id> <refname>
//! ^<hex-id>        (peeled target of the annotated tag above)
//! ```
//!
//! Loose refs always win over packed entries with the same name.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use quay_hash::Oid;
use quay_utils::lockfile::Lockfile;

use crate::error::RefError;
use crate::name::RefName;

/// One packed ref, with the peeled tag target when recorded.
#[derive(Debug, Clone)]
pub struct PackedEntry {
    pub name: RefName,
    pub target: Oid,
    pub peeled: Option<Oid>,
}

/// In-memory image of a `packed-refs` file.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    entries: Vec<PackedEntry>,
    sorted: bool,
}

impl PackedRefs {
    /// Parse file contents. `#` lines are headers, `^` lines attach a
    /// peeled id to the preceding entry.
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let mut entries: Vec<PackedEntry> = Vec::new();
        let mut sorted = false;

        for line in data.lines() {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(b"#") {
                sorted |= line.find(b"sorted").is_some();
                continue;
            }
            if let Some(peel) = line.strip_prefix(b"^") {
                let hex = std::str::from_utf8(peel.trim())
                    .map_err(|_| RefError::Parse("non-UTF-8 peel line".into()))?;
                let peeled = Oid::from_hex(hex)?;
                if let Some(last) = entries.last_mut() {
                    last.peeled = Some(peeled);
                }
                continue;
            }

            let space = line
                .find_byte(b' ')
                .ok_or_else(|| RefError::Parse("packed-refs line without space".into()))?;
            let hex = std::str::from_utf8(&line[..space])
                .map_err(|_| RefError::Parse("non-UTF-8 id".into()))?;
            let target = Oid::from_hex(hex)?;
            let name_str = std::str::from_utf8(line[space + 1..].trim())
                .map_err(|_| RefError::Parse("non-UTF-8 ref name".into()))?;
            entries.push(PackedEntry {
                name: RefName::new(name_str)?,
                target,
                peeled: None,
            });
        }

        Ok(Self { entries, sorted })
    }

    /// Load from `<git_dir>/packed-refs`; an absent file is an empty set.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let path = file_path(git_dir);
        if !path.exists() {
            return Ok(Self {
                entries: Vec::new(),
                sorted: true,
            });
        }
        Self::parse(&fs::read(path)?)
    }

    pub fn find(&self, name: &RefName) -> Option<&PackedEntry> {
        if self.sorted {
            self.entries
                .binary_search_by(|e| e.name.cmp(name))
                .ok()
                .map(|i| &self.entries[i])
        } else {
            self.entries.iter().find(|e| e.name == *name)
        }
    }

    pub fn entries(&self) -> &[PackedEntry] {
        &self.entries
    }

    /// Remove an entry by name. Returns whether anything was removed.
    pub fn remove(&mut self, name: &RefName) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != *name);
        before != self.entries.len()
    }

    /// Rewrite `<git_dir>/packed-refs` atomically.
    pub fn write(&self, git_dir: &Path) -> Result<(), RefError> {
        let mut ordered = self.entries.clone();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut lock = Lockfile::hold(file_path(git_dir))?;
        lock.write_all(b"# pack-refs with: peeled fully-peeled sorted \n")?;
        for entry in &ordered {
            lock.write_all(format!("{} {}\n", entry.target.to_hex(), entry.name).as_bytes())?;
            if let Some(peeled) = entry.peeled {
                lock.write_all(format!("^{}\n", peeled.to_hex()).as_bytes())?;
            }
        }
        lock.commit()?;
        Ok(())
    }
}

fn file_path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}
