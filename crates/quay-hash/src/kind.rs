use crate::Oid;

/// The hash function a repository was created with.
///
/// Chosen once at repository creation and never mixed afterwards; every
/// object id in a repository uses the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum HashKind {
    /// SHA-1, 20 bytes. The interchange default.
    #[default]
    Sha1,
    /// SHA-256, 32 bytes.
    Sha256,
}

impl HashKind {
    /// Raw digest width in bytes.
    pub const fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Width of the hex form.
    pub const fn hex_len(&self) -> usize {
        self.digest_len() * 2
    }

    /// The all-zeros id of this kind (the wire encoding of "no object").
    pub const fn zero(&self) -> Oid {
        match self {
            Self::Sha1 => Oid::ZERO_SHA1,
            Self::Sha256 => Oid::ZERO_SHA256,
        }
    }

    /// Configuration name (`objectformat` value).
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            20 => Some(Self::Sha1),
            32 => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
