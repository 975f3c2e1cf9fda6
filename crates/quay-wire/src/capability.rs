//! Capability sets: what the server offers per service and what the
//! client picked from that offer.

use bstr::ByteSlice;

use crate::session::Service;
use crate::WireError;

/// Advertised agent string.
pub const AGENT: &str = "quay/0.2";

const UPLOAD_PACK_CAPS: &[&str] = &[
    "multi_ack",
    "thin-pack",
    "side-band",
    "side-band-64k",
    "ofs-delta",
    "shallow",
    "no-progress",
    "include-tag",
];

const RECEIVE_PACK_CAPS: &[&str] = &[
    "report-status",
    "delete-refs",
    "ofs-delta",
    "side-band-64k",
    "no-progress",
];

/// Capabilities the client may request without the server having
/// advertised them (informational or request-scoped).
const ALWAYS_ACCEPTED: &[&str] = &["agent", "force"];

/// Build the capability suffix for the first advertisement line.
pub fn advertised(service: Service, symref_head: Option<&str>) -> String {
    let base = match service {
        Service::UploadPack => UPLOAD_PACK_CAPS,
        Service::ReceivePack => RECEIVE_PACK_CAPS,
    };
    let mut caps: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    if let Some(target) = symref_head {
        caps.push(format!("symref=HEAD:{target}"));
    }
    caps.push(format!("agent={AGENT}"));
    caps.join(" ")
}

/// The capability set a client sent back on its first request line.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<(String, Option<String>)>,
}

impl Capabilities {
    /// Parse a space-separated capability list (`name` or `name=value`).
    pub fn parse(raw: &[u8]) -> Self {
        let text = raw.to_str_lossy();
        let entries = text
            .split_whitespace()
            .map(|word| match word.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (word.to_string(), None),
            })
            .collect();
        Self { entries }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject any capability the server did not put on the table.
    pub fn check_subset_of(&self, service: Service) -> Result<(), WireError> {
        let base = match service {
            Service::UploadPack => UPLOAD_PACK_CAPS,
            Service::ReceivePack => RECEIVE_PACK_CAPS,
        };
        for (name, _) in &self.entries {
            let known = base.contains(&name.as_str())
                || ALWAYS_ACCEPTED.contains(&name.as_str())
                || name == "symref";
            if !known {
                return Err(WireError::UnknownCapability(name.clone()));
            }
        }
        Ok(())
    }
}

/// Side-band flavor negotiated for a response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandMode {
    /// Raw bytes, no multiplexing.
    None,
    /// `side-band`: 1000-byte frames.
    Narrow,
    /// `side-band-64k`: full-width frames.
    Wide,
}

impl SidebandMode {
    pub fn from_caps(caps: &Capabilities) -> Self {
        if caps.has("side-band-64k") {
            Self::Wide
        } else if caps.has("side-band") {
            Self::Narrow
        } else {
            Self::None
        }
    }

    /// Largest payload per frame, after the band byte.
    pub fn chunk_len(&self) -> usize {
        match self {
            Self::None => usize::MAX,
            Self::Narrow => 999,
            Self::Wide => crate::pktline::MAX_FRAME_DATA - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_and_values() {
        let caps = Capabilities::parse(b"side-band-64k ofs-delta agent=git/2.43.0");
        assert!(caps.has("side-band-64k"));
        assert!(caps.has("ofs-delta"));
        assert_eq!(caps.get("agent"), Some("git/2.43.0"));
        assert!(!caps.has("thin-pack"));
    }

    #[test]
    fn advertised_upload_caps_include_fetch_set() {
        let caps = advertised(Service::UploadPack, Some("refs/heads/main"));
        for expected in [
            "multi_ack",
            "thin-pack",
            "side-band-64k",
            "ofs-delta",
            "include-tag",
            "symref=HEAD:refs/heads/main",
        ] {
            assert!(caps.contains(expected), "missing {expected} in {caps}");
        }
        assert!(!caps.contains("report-status"));
    }

    #[test]
    fn advertised_receive_caps_include_push_set() {
        let caps = advertised(Service::ReceivePack, None);
        for expected in ["report-status", "delete-refs", "ofs-delta", "side-band-64k"] {
            assert!(caps.contains(expected), "missing {expected} in {caps}");
        }
        assert!(!caps.contains("thin-pack"));
        assert!(!caps.contains("symref"));
    }

    #[test]
    fn unknown_choice_rejected() {
        let caps = Capabilities::parse(b"report-status filter");
        let err = caps.check_subset_of(Service::ReceivePack).unwrap_err();
        assert!(matches!(err, WireError::UnknownCapability(name) if name == "filter"));
    }

    #[test]
    fn agent_and_force_always_pass() {
        let caps = Capabilities::parse(b"report-status force agent=quay/0.2");
        caps.check_subset_of(Service::ReceivePack).unwrap();
    }

    #[test]
    fn sideband_selection_prefers_wide() {
        let both = Capabilities::parse(b"side-band side-band-64k");
        assert_eq!(SidebandMode::from_caps(&both), SidebandMode::Wide);
        let narrow = Capabilities::parse(b"side-band");
        assert_eq!(SidebandMode::from_caps(&narrow), SidebandMode::Narrow);
        let none = Capabilities::parse(b"ofs-delta");
        assert_eq!(SidebandMode::from_caps(&none), SidebandMode::None);
    }
}
