use std::fmt;
use std::str::FromStr;

use crate::hex::{decode_into, encode_string};
use crate::{HashError, HashKind};

/// Widest digest any supported hash kind produces.
pub const MAX_DIGEST_LEN: usize = 32;

/// An object id: the digest of an object's canonical serialization.
///
/// Stored as one fixed-width buffer with the kind tagging how much of
/// it is live; unused tail bytes are always zero, so derived equality,
/// hashing, and ordering need no per-kind handling. Two objects with
/// equal ids are byte-identical.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    kind: HashKind,
    buf: [u8; MAX_DIGEST_LEN],
}

impl Oid {
    pub const ZERO_SHA1: Self = Self {
        kind: HashKind::Sha1,
        buf: [0u8; MAX_DIGEST_LEN],
    };
    pub const ZERO_SHA256: Self = Self {
        kind: HashKind::Sha256,
        buf: [0u8; MAX_DIGEST_LEN],
    };

    /// Build from raw digest bytes of the given kind.
    pub fn from_bytes(bytes: &[u8], kind: HashKind) -> Result<Self, HashError> {
        if bytes.len() != kind.digest_len() {
            return Err(HashError::InvalidDigestLength {
                expected: kind.digest_len(),
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; MAX_DIGEST_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { kind, buf })
    }

    /// Parse a hex string; the kind is inferred from the length
    /// (40 chars for SHA-1, 64 for SHA-256).
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let kind = HashKind::from_hex_len(hex.len())
            .ok_or(HashError::InvalidHexLength { actual: hex.len() })?;
        let mut buf = [0u8; MAX_DIGEST_LEN];
        decode_into(hex, &mut buf[..kind.digest_len()])?;
        Ok(Self { kind, buf })
    }

    /// The live digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.kind.digest_len()]
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// The all-zeros id stands for "no object" in ref updates and
    /// advertisements.
    pub fn is_zero(&self) -> bool {
        self.buf == [0u8; MAX_DIGEST_LEN]
    }

    pub fn to_hex(&self) -> String {
        encode_string(self.as_bytes())
    }

    /// First digest byte, the fan-out directory selector.
    pub fn first_byte(&self) -> u8 {
        self.buf[0]
    }

    /// Relative store path: `"xx/yyyy…"`.
    pub fn store_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.to_hex()[..8])
    }
}

impl FromStr for Oid {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
