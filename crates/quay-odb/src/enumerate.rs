use std::fs;
use std::path::PathBuf;

use quay_hash::{hex, Oid};

use crate::{ObjectStore, OdbError};

impl ObjectStore {
    /// Lazily enumerate every stored id. Order is unspecified; files that
    /// don't look like objects are ignored.
    pub fn iter_hashes(&self) -> Result<HashIter, OdbError> {
        let fanout_dirs = match fs::read_dir(self.objects_dir()) {
            Ok(entries) => {
                let mut dirs: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.is_dir()
                            && p.file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.len() == 2 && hex::is_hex(n))
                    })
                    .collect();
                dirs.sort();
                dirs
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(OdbError::Io(e)),
        };

        Ok(HashIter {
            fanout_dirs,
            current: Vec::new().into_iter(),
        })
    }
}

/// Iterator over stored ids, one fan-out directory at a time.
pub struct HashIter {
    fanout_dirs: Vec<PathBuf>,
    current: std::vec::IntoIter<Oid>,
}

impl Iterator for HashIter {
    type Item = Result<Oid, OdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(oid) = self.current.next() {
                return Some(Ok(oid));
            }
            let dir = self.fanout_dirs.pop()?;
            match load_fanout(&dir) {
                Ok(oids) => self.current = oids.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn load_fanout(dir: &PathBuf) -> Result<Vec<Oid>, OdbError> {
    let prefix = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut oids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let full = format!("{prefix}{name}");
        if let Ok(oid) = Oid::from_hex(&full) {
            oids.push(oid);
        }
        // Anything unparseable is a stray file; skip it.
    }
    Ok(oids)
}
