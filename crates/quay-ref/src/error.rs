use quay_hash::Oid;

/// Errors from ref store operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref not found: {0}")]
    NotFound(String),

    /// The compare-and-set expectation did not hold; a concurrent
    /// updater got there first.
    #[error("ref update raced on {name}: expected {expected:?}, found {actual:?}")]
    RefRaced {
        name: String,
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    #[error("symbolic ref chain too deep at {0}")]
    SymrefLoop(String),

    #[error("ref parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Util(#[from] quay_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] quay_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
