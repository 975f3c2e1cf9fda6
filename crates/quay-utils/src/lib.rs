//! Foundation utilities shared by the quay storage engine crates.
//!
//! Provides the lock-file primitive used for atomic file replacement,
//! author/committer identity parsing, and progress counters rendered in
//! the format clients expect on the progress side-band.

pub mod error;
pub mod ident;
pub mod lockfile;
pub mod progress;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use error::{LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
