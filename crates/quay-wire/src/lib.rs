//! The smart-transport wire protocol engine.
//!
//! Speaks protocol v1 over any byte channel: ref advertisement, fetch
//! negotiation (wants/haves), receive-pack (commands + pack + status
//! report), and side-band multiplexing. The engine owns no sockets and
//! no policy; transports hand it a [`ByteChannel`](session::ByteChannel)
//! and an [`AccessControl`](access::AccessControl) and get back applied
//! state changes.

pub mod access;
pub mod advertise;
pub mod capability;
pub mod closure;
pub mod pktline;
pub mod receive;
pub mod session;
pub mod sideband;
pub mod upload;

pub use access::{AccessControl, Action, Principal};
pub use capability::{Capabilities, SidebandMode};
pub use pktline::{parse_pkt_lines, Packet, PktReader, PktWriter};
pub use receive::{ReceiveSummary, RefUpdateRecord};
pub use session::{
    serve, serve_anonymous, ByteChannel, ServeOutcome, Service, SessionContext, SessionState,
};

/// Errors from the wire engine.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A frame violated pkt-line structure (bad hex length, reserved
    /// length value, payload over the cap).
    #[error("bad framing: {0}")]
    BadFraming(String),

    /// The channel ended in the middle of a frame or phase.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    #[error("frame payload of {0} bytes exceeds the pkt-line limit")]
    OversizeFrame(usize),

    #[error("capability not advertised: {0}")]
    UnknownCapability(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The update would lose commits and force was not requested.
    #[error("non-fast-forward update of {0}")]
    NonFastForward(String),

    #[error("access denied")]
    Forbidden,

    /// The connection went away mid-operation.
    #[error("connection cancelled")]
    Cancelled,

    #[error(transparent)]
    Pack(#[from] quay_pack::PackError),

    #[error(transparent)]
    Odb(#[from] quay_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] quay_ref::RefError),

    #[error(transparent)]
    Repo(#[from] quay_repo::RepoError),

    #[error(transparent)]
    Object(#[from] quay_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] quay_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Fold transport-level interruptions into the cancellation state.
    pub(crate) fn from_channel(e: std::io::Error, reading: &'static str) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated(reading),
            std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted => Self::Cancelled,
            _ => Self::Io(e),
        }
    }
}
