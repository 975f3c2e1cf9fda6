use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::error::RefError;

/// A validated ref name: `refs/…` or one of the special top-level names.
///
/// Validation follows the reference-name rules every compatible client
/// enforces: no control bytes, no ` ~^:?*[\`, no `..` or `@{`, no
/// leading/trailing/doubled `/`, no trailing `.` or `.lock` component,
/// not the single character `@`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

const BANNED: &[u8] = b" ~^:?*[\\";

const TOP_LEVEL: &[&str] = &["HEAD", "FETCH_HEAD", "ORIG_HEAD", "MERGE_HEAD"];

impl RefName {
    pub fn new(name: impl Into<BString>) -> Result<Self, RefError> {
        let name = name.into();
        check(&name)?;
        Ok(Self(name))
    }

    /// Skip validation for names this crate produced itself.
    pub(crate) fn trusted(name: impl Into<BString>) -> Self {
        Self(name.into())
    }

    /// `main` for `refs/heads/main`, `v1` for `refs/tags/v1`, else as-is.
    pub fn short(&self) -> &BStr {
        let s = self.0.as_bstr();
        for prefix in [b"refs/heads/".as_slice(), b"refs/tags/", b"refs/remotes/"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return rest.as_bstr();
            }
        }
        s
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(b"refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(b"refs/tags/")
    }

    pub fn is_head(&self) -> bool {
        self.0.as_slice() == b"HEAD"
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }

    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check(name: &[u8]) -> Result<(), RefError> {
    let shown = || String::from_utf8_lossy(name).into_owned();

    if name.is_empty() {
        return Err(RefError::InvalidName("empty name".into()));
    }
    if name == b"@" {
        return Err(RefError::InvalidName("'@' alone is reserved".into()));
    }
    for &b in name {
        if b < 0x20 || b == 0x7f || BANNED.contains(&b) {
            return Err(RefError::InvalidName(format!(
                "'{}': forbidden byte 0x{b:02x}",
                shown()
            )));
        }
    }
    if name.starts_with(b"/") || name.ends_with(b"/") || name.find(b"//").is_some() {
        return Err(RefError::InvalidName(format!("'{}': bad slashes", shown())));
    }
    if name.ends_with(b".") || name.find(b"..").is_some() || name.find(b"@{").is_some() {
        return Err(RefError::InvalidName(format!("'{}': bad dots", shown())));
    }
    for component in name.split(|&b| b == b'/') {
        if component.starts_with(b".") {
            return Err(RefError::InvalidName(format!(
                "'{}': component starts with '.'",
                shown()
            )));
        }
        if component.ends_with(b".lock") {
            return Err(RefError::InvalidName(format!(
                "'{}': component ends with '.lock'",
                shown()
            )));
        }
    }

    // Anything outside refs/ must be one of the known top-level names.
    if !name.starts_with(b"refs/") {
        let s = String::from_utf8_lossy(name);
        if !TOP_LEVEL.contains(&s.as_ref()) {
            return Err(RefError::InvalidName(format!(
                "'{}': outside refs/ and not a recognized special name",
                shown()
            )));
        }
    }

    Ok(())
}
