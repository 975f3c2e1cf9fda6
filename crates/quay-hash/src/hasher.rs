use digest::Digest;

use crate::{HashError, HashKind, Oid};

/// What the hasher needs from a digest backend: feed bytes, then hand
/// back the raw digest (or refuse, for a detected SHA-1 collision).
trait DigestSink {
    fn absorb(&mut self, data: &[u8]);
    fn complete(self: Box<Self>) -> Result<Vec<u8>, HashError>;
}

impl DigestSink for sha1_checked::Sha1 {
    fn absorb(&mut self, data: &[u8]) {
        self.update(data);
    }

    fn complete(self: Box<Self>) -> Result<Vec<u8>, HashError> {
        let outcome = self.try_finalize();
        if outcome.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        Ok(outcome.hash().to_vec())
    }
}

impl DigestSink for sha2::Sha256 {
    fn absorb(&mut self, data: &[u8]) {
        self.update(data);
    }

    fn complete(self: Box<Self>) -> Result<Vec<u8>, HashError> {
        Ok(self.finalize().to_vec())
    }
}

/// Streaming digest computation over either hash kind.
///
/// The backend sits behind a trait object so feeding data is
/// kind-agnostic; the kind chosen at construction turns the final raw
/// digest into an [`Oid`]. SHA-1 always runs with collision detection,
/// surfacing an attack as an error instead of a silently wrong id.
pub struct ObjectHasher {
    kind: HashKind,
    sink: Box<dyn DigestSink>,
}

impl ObjectHasher {
    pub fn new(kind: HashKind) -> Self {
        let sink: Box<dyn DigestSink> = match kind {
            HashKind::Sha1 => Box::new(sha1_checked::Sha1::new()),
            HashKind::Sha256 => Box::new(sha2::Sha256::new()),
        };
        Self { kind, sink }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sink.absorb(data);
    }

    /// Finish and return the id; errors if SHA-1 collision detection fired.
    pub fn finalize(self) -> Result<Oid, HashError> {
        let raw = self.sink.complete()?;
        Oid::from_bytes(&raw, self.kind)
    }

    /// One-shot digest of a byte slice.
    pub fn digest(kind: HashKind, data: &[u8]) -> Result<Oid, HashError> {
        let mut hasher = Self::new(kind);
        hasher.update(data);
        hasher.finalize()
    }

    /// Digest an object in canonical framing: `"<kind> <len>\0<payload>"`.
    pub fn hash_object(kind: HashKind, obj_kind: &str, payload: &[u8]) -> Result<Oid, HashError> {
        let mut hasher = Self::new(kind);
        hasher.update(obj_kind.as_bytes());
        hasher.update(b" ");
        hasher.update(itoa(payload.len()).as_bytes());
        hasher.update(b"\0");
        hasher.update(payload);
        hasher.finalize()
    }
}

/// Decimal rendering of a payload length for the framing header.
fn itoa(mut n: usize) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = [0u8; 20];
    let mut at = digits.len();
    while n > 0 {
        at -= 1;
        digits[at] = b'0' + (n % 10) as u8;
        n /= 10;
    }
    String::from_utf8_lossy(&digits[at..]).into_owned()
}

impl std::io::Write for ObjectHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
