//! Object identity and hash computation for the quay storage engine.
//!
//! Provides the `Oid` type naming every stored object, the pluggable
//! `HashKind` (SHA-1 with collision detection, or SHA-256), streaming
//! digest computation, and hex codecs.

mod error;
pub mod hex;
mod kind;
mod oid;
pub mod hasher;

pub use error::HashError;
pub use kind::HashKind;
pub use oid::Oid;
