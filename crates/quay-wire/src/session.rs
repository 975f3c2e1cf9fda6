//! Per-connection session driver.
//!
//! One connection serves exactly one service and walks a fixed state
//! machine:
//!
//! ```text
//! Init -> Advertise -> Negotiate -> SendPack --------> Closed
//!                  \-> Commands  -> RecvPack -> ReportStatus -^
//! ```
//!
//! Fetch takes the upper path, push the lower. Any protocol error
//! closes the connection, reported on side-band channel 3 when a
//! side-band was negotiated.

use std::io::{Read, Write};

use quay_repo::Repository;

use crate::access::{AccessControl, Action};
use crate::receive::ReceiveSummary;
use crate::WireError;

/// The byte stream a transport hands the engine. TLS, SSH pipes, HTTP
/// bodies, and test buffers all look the same from here.
pub trait ByteChannel: Read + Write {
    /// Release the underlying resource. The default is a no-op for
    /// channels whose drop already closes them.
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T: Read + Write> ByteChannel for T {}

/// The two smart-transport services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }
}

/// Connection phases, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Advertise,
    Negotiate,
    Commands,
    SendPack,
    RecvPack,
    ReportStatus,
    Closed,
}

/// What a completed session produced.
#[derive(Debug)]
pub enum ServeOutcome {
    /// A fetch ran to completion (possibly sending no pack).
    Fetched,
    /// A push ran to completion; the summary names every applied update.
    Pushed(ReceiveSummary),
}

/// Everything a session needs from its surroundings.
pub struct SessionContext<'a> {
    pub repo: &'a Repository,
    /// Repository name as the provider knows it (for access checks and
    /// the push summary).
    pub repo_name: &'a str,
    pub access: &'a dyn AccessControl,
    /// Transport-supplied peer identity hint, if any.
    pub remote: Option<&'a str>,
}

/// Serve one connection.
pub fn serve<C: ByteChannel>(
    ctx: &SessionContext<'_>,
    service: Service,
    mut channel: C,
) -> Result<ServeOutcome, WireError> {
    let principal = ctx.access.who_is(ctx.remote);
    tracing::debug!(
        service = service.as_str(),
        repo = ctx.repo_name,
        principal = %principal.0,
        "session start"
    );

    let action = match service {
        Service::UploadPack => Action::Fetch,
        Service::ReceivePack => Action::Push,
    };
    if !ctx.access.may(&principal, action, ctx.repo_name) {
        return Err(WireError::Forbidden);
    }

    let outcome = match service {
        Service::UploadPack => {
            crate::upload::serve_upload_pack(ctx.repo, &mut channel).map(|_| ServeOutcome::Fetched)
        }
        Service::ReceivePack => {
            crate::receive::serve_receive_pack(ctx.repo, ctx.repo_name, &principal, &mut channel)
                .map(ServeOutcome::Pushed)
        }
    };

    let _ = channel.close();
    match &outcome {
        Ok(_) => tracing::debug!(service = service.as_str(), "session closed"),
        Err(e) => tracing::debug!(service = service.as_str(), error = %e, "session failed"),
    }
    outcome
}

/// Convenience for the common anonymous case.
pub fn serve_anonymous<C: ByteChannel>(
    repo: &Repository,
    repo_name: &str,
    service: Service,
    channel: C,
) -> Result<ServeOutcome, WireError> {
    let ctx = SessionContext {
        repo,
        repo_name,
        access: &crate::access::AllowAll,
        remote: None,
    };
    serve(&ctx, service, channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Principal;

    #[test]
    fn service_names_roundtrip() {
        for service in [Service::UploadPack, Service::ReceivePack] {
            assert_eq!(Service::from_name(service.as_str()), Some(service));
        }
        assert_eq!(Service::from_name("git-archive"), None);
    }

    #[test]
    fn forbidden_push_is_refused() {
        struct ReadOnly;
        impl AccessControl for ReadOnly {
            fn who_is(&self, _remote: Option<&str>) -> Principal {
                Principal::anonymous()
            }
            fn may(&self, _p: &Principal, action: Action, _repo: &str) -> bool {
                action == Action::Fetch
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &quay_repo::InitOptions::default()).unwrap();
        let ctx = SessionContext {
            repo: &repo,
            repo_name: "example",
            access: &ReadOnly,
            remote: None,
        };

        let channel = std::io::Cursor::new(Vec::new());
        let err = serve(&ctx, Service::ReceivePack, channel).unwrap_err();
        assert!(matches!(err, WireError::Forbidden));
    }
}
