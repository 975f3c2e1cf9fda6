use bstr::BString;

/// A blob: opaque file content. No structure beyond the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: BString,
}

impl Blob {
    pub fn from_data(data: impl Into<BString>) -> Self {
        Self { data: data.into() }
    }

    /// Blobs have no grammar; parsing never fails.
    pub fn parse(payload: &[u8]) -> Self {
        Self {
            data: BString::from(payload),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
