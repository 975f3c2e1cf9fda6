//! Reference store for the quay storage engine.
//!
//! Refs map textual names to object ids (direct) or to other refs
//! (symbolic). Loose refs are one file per name under the repository
//! directory; a read-only view of `packed-refs` fills in the rest.
//! Every mutation is a compare-and-set through a lock file, so
//! concurrent updaters serialize per ref and losers see `RefRaced`.

mod error;
mod name;
pub mod packed;
mod store;

pub use error::RefError;
pub use name::RefName;
pub use packed::{PackedEntry, PackedRefs};
pub use store::{Expect, RefStore};

use quay_hash::Oid;

/// A ref as stored: direct to an id, or symbolic to another name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct { name: RefName, target: Oid },
    Symbolic { name: RefName, target: RefName },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Reference::Direct { name, .. } | Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    pub fn direct_target(&self) -> Option<Oid> {
        match self {
            Reference::Direct { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Direct { .. } => None,
        }
    }
}
