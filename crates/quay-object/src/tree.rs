use std::cmp::Ordering;

use bstr::{BStr, BString};
use quay_hash::{HashKind, Oid};

use crate::ObjectError;

/// Mode bits of a tree entry, stored as octal ASCII in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// 100644
    File,
    /// 100755
    Executable,
    /// 120000
    Symlink,
    /// 160000 (submodule pointer)
    Commit,
    /// 040000
    Directory,
    /// Anything else, kept verbatim so payloads survive a roundtrip.
    Other(u32),
}

impl EntryMode {
    pub fn from_octal(s: &[u8]) -> Result<Self, ObjectError> {
        let mut raw: u32 = 0;
        if s.is_empty() {
            return Err(ObjectError::InvalidMode("empty mode".into()));
        }
        for &b in s {
            if !(b'0'..=b'7').contains(&b) {
                return Err(ObjectError::InvalidMode(
                    String::from_utf8_lossy(s).into_owned(),
                ));
            }
            raw = raw
                .checked_mul(8)
                .and_then(|v| v.checked_add(u32::from(b - b'0')))
                .ok_or_else(|| {
                    ObjectError::InvalidMode(String::from_utf8_lossy(s).into_owned())
                })?;
        }
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::File,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Commit,
            0o040000 => Self::Directory,
            other => Self::Other(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::File => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Commit => 0o160000,
            Self::Directory => 0o40000,
            Self::Other(v) => *v,
        }
    }

    /// Canonical octal form (no leading zero on directories).
    pub fn to_octal(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One entry of a tree: `<mode> <name>\0<raw digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: BString,
    pub oid: Oid,
}

impl TreeEntry {
    /// Canonical entry ordering: names compare bytewise, with directory
    /// names behaving as if they ended in `/`.
    pub fn canonical_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        let (an, bn): (&[u8], &[u8]) = (a.name.as_ref(), b.name.as_ref());
        let shared = an.len().min(bn.len());
        match an[..shared].cmp(&bn[..shared]) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        let next = |name: &[u8], is_dir: bool| -> u8 {
            if name.len() > shared {
                name[shared]
            } else if is_dir {
                b'/'
            } else {
                0
            }
        };
        next(an, a.mode.is_directory()).cmp(&next(bn, b.mode.is_directory()))
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::canonical_cmp(self, other)
    }
}

/// A directory listing. Entries are unique by name and serialized in
/// canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tree payload. The digest width follows the repository's
    /// hash kind.
    pub fn parse(payload: &[u8], hash_kind: HashKind) -> Result<Self, ObjectError> {
        let digest_len = hash_kind.digest_len();
        let mut entries = Vec::new();
        let mut rest = payload;
        let mut offset = 0;

        while !rest.is_empty() {
            let space = rest.iter().position(|&b| b == b' ').ok_or_else(|| {
                ObjectError::InvalidTreeEntry {
                    offset,
                    reason: "missing space after mode".into(),
                }
            })?;
            let mode = EntryMode::from_octal(&rest[..space]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset,
                    reason: "invalid octal mode".into(),
                }
            })?;

            let after_mode = &rest[space + 1..];
            let nul = after_mode.iter().position(|&b| b == 0).ok_or_else(|| {
                ObjectError::InvalidTreeEntry {
                    offset,
                    reason: "missing NUL after name".into(),
                }
            })?;
            let name = &after_mode[..nul];
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset,
                    reason: "empty entry name".into(),
                });
            }

            let digest = &after_mode[nul + 1..];
            if digest.len() < digest_len {
                return Err(ObjectError::InvalidTreeEntry {
                    offset,
                    reason: "truncated digest".into(),
                });
            }
            let oid = Oid::from_bytes(&digest[..digest_len], hash_kind)?;

            entries.push(TreeEntry {
                mode,
                name: BString::from(name),
                oid,
            });

            let consumed = space + 1 + nul + 1 + digest_len;
            offset += consumed;
            rest = &rest[consumed..];
        }

        Ok(Self { entries })
    }

    /// Serialize in canonical order.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut ordered = self.entries.clone();
        ordered.sort();

        let mut out = Vec::new();
        for entry in &ordered {
            out.extend_from_slice(&entry.mode.to_octal());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        let name: &[u8] = name.as_ref();
        self.entries.iter().find(|e| e.name.as_slice() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
