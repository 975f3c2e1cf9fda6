//! Server side of push: commands, pack ingestion, ref updates, status
//! report.
//!
//! Ordering is the engine's one hard promise: every object in the pack
//! is durably in the store before the first ref moves, and a pack
//! failure leaves every ref untouched.

use std::io::{Read, Write};

use quay_hash::{HashKind, Oid};
use quay_object::ObjectType;
use quay_pack::parse_pack;
use quay_ref::{Expect, RefName};
use quay_repo::Repository;
use quay_utils::progress::Counter;

use crate::access::Principal;
use crate::advertise::write_advertisement;
use crate::capability::{Capabilities, SidebandMode};
use crate::closure::is_ancestor;
use crate::pktline::{Packet, PktReader, PktWriter};
use crate::session::{Service, SessionState};
use crate::sideband::{send, Band};
use crate::WireError;

/// One applied ref change, as reported outward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateRecord {
    pub name: RefName,
    pub old: Option<Oid>,
    pub new: Option<Oid>,
}

/// The structured record a successful receive-pack produces.
#[derive(Debug)]
pub struct ReceiveSummary {
    pub repo: String,
    pub principal: Principal,
    pub ref_updates: Vec<RefUpdateRecord>,
    pub objects_received: usize,
}

/// A single `<old> <new> <name>` command line.
#[derive(Debug, Clone)]
struct Command {
    old: Oid,
    new: Oid,
    /// Validated name, or the reason it failed validation.
    name: Result<RefName, String>,
    raw_name: String,
}

impl Command {
    fn is_delete(&self) -> bool {
        self.new.is_zero()
    }

    fn is_create(&self) -> bool {
        self.old.is_zero()
    }
}

/// Per-command outcome for the status report.
enum CommandStatus {
    Ok,
    Ng(String),
}

/// Drive a whole receive-pack session over `channel`.
pub fn serve_receive_pack<C: Read + Write>(
    repo: &Repository,
    repo_name: &str,
    principal: &Principal,
    channel: &mut C,
) -> Result<ReceiveSummary, WireError> {
    let mut state = SessionState::Advertise;

    {
        let mut out = PktWriter::new(&mut *channel);
        write_advertisement(repo, Service::ReceivePack, &mut out)?;
    }

    state = transition(state, SessionState::Commands);
    let (commands, caps) = read_commands(channel)?;
    caps.check_subset_of(Service::ReceivePack)?;
    if commands.is_empty() {
        // Nothing to do; the client hung up after the advertisement.
        return Ok(ReceiveSummary {
            repo: repo_name.to_string(),
            principal: principal.clone(),
            ref_updates: Vec::new(),
            objects_received: 0,
        });
    }

    let sideband = SidebandMode::from_caps(&caps);
    let report_status = caps.has("report-status");
    let forced = caps.has("force");
    let quiet = caps.has("no-progress");

    state = transition(state, SessionState::RecvPack);
    let expects_pack = commands.iter().any(|c| !c.is_delete());
    let unpack_result = if expects_pack {
        ingest_pack(repo, channel, sideband, quiet)
    } else {
        Ok(0)
    };

    let mut updates = Vec::new();
    let statuses: Vec<(String, CommandStatus)> = match &unpack_result {
        Ok(_) => commands
            .iter()
            .map(|command| {
                let status = apply_command(repo, command, forced, &mut updates);
                (command.raw_name.clone(), status)
            })
            .collect(),
        Err(e) => {
            // A broken pack fails every command; no ref was touched.
            let reason = unpack_reason(e);
            commands
                .iter()
                .map(|c| (c.raw_name.clone(), CommandStatus::Ng(reason.clone())))
                .collect()
        }
    };

    state = transition(state, SessionState::ReportStatus);
    if report_status {
        write_report(channel, sideband, &unpack_result, &statuses)?;
    }
    let _ = transition(state, SessionState::Closed);

    let objects_received = unpack_result.unwrap_or(0);
    tracing::info!(
        repo = repo_name,
        principal = %principal.0,
        objects = objects_received,
        updated = updates.len(),
        "receive-pack complete"
    );

    Ok(ReceiveSummary {
        repo: repo_name.to_string(),
        principal: principal.clone(),
        ref_updates: updates,
        objects_received,
    })
}

/// Read command lines until flush. The first carries capabilities after
/// a NUL.
fn read_commands<C: Read + Write>(
    channel: &mut C,
) -> Result<(Vec<Command>, Capabilities), WireError> {
    let mut reader = PktReader::new(&mut *channel);
    let mut commands = Vec::new();
    let mut caps = Capabilities::default();

    let mut first = true;
    loop {
        match reader.read_packet()? {
            Packet::Flush => break,
            Packet::Data(data) => {
                let mut line: &[u8] = &data;
                if let Some(end) = line.last() {
                    if *end == b'\n' {
                        line = &line[..line.len() - 1];
                    }
                }
                if first {
                    if let Some(nul) = line.iter().position(|&b| b == 0) {
                        caps = Capabilities::parse(&line[nul + 1..]);
                        line = &line[..nul];
                    }
                    first = false;
                }
                commands.push(parse_command(line)?);
            }
            _ => return Err(WireError::BadFraming("v2 packet in command list".into())),
        }
    }

    Ok((commands, caps))
}

fn parse_command(line: &[u8]) -> Result<Command, WireError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| WireError::Protocol("non-UTF-8 command line".into()))?;
    let mut words = text.splitn(3, ' ');
    let (Some(old), Some(new), Some(name)) = (words.next(), words.next(), words.next()) else {
        return Err(WireError::Protocol(format!("malformed command {text:?}")));
    };

    let old = Oid::from_hex(old)
        .map_err(|e| WireError::Protocol(format!("bad old id in command: {e}")))?;
    let new = Oid::from_hex(new)
        .map_err(|e| WireError::Protocol(format!("bad new id in command: {e}")))?;

    Ok(Command {
        old,
        new,
        name: RefName::new(name).map_err(|e| e.to_string()),
        raw_name: name.to_string(),
    })
}

/// Slurp the pack off the channel, parse it, and land every object in
/// the store. Returns the object count.
fn ingest_pack<C: Read + Write>(
    repo: &Repository,
    channel: &mut C,
    sideband: SidebandMode,
    quiet: bool,
) -> Result<usize, WireError> {
    let mut pack_bytes = Vec::new();
    channel
        .read_to_end(&mut pack_bytes)
        .map_err(|e| WireError::from_channel(e, "pack stream"))?;
    if pack_bytes.is_empty() {
        return Err(WireError::Truncated("pack stream"));
    }

    let hash_kind = repo.hash_kind();
    let store = repo.objects();

    // Thin packs may lean on objects we already hold; those are looked
    // up by the SHA-1 the container uses. A SHA-256 store cannot map
    // that name back, so thin completion is SHA-1 only.
    let ext_base = |oid: &Oid| -> Option<(ObjectType, Vec<u8>)> {
        if hash_kind != HashKind::Sha1 {
            return None;
        }
        store.get(oid).ok().flatten().map(|raw| (raw.kind, raw.payload))
    };

    let mut receiving: Option<Counter> = None;
    let mut resolving: Option<Counter> = None;
    let mut progress_lines: Vec<String> = Vec::new();
    let parsed = parse_pack(&pack_bytes, hash_kind, ext_base, |event| {
        use quay_pack::Progress;
        let line = match event {
            Progress::Counting { total } => {
                receiving = Some(Counter::new("Receiving objects", Some(u64::from(total))));
                None
            }
            Progress::Receiving { done, total } => receiving
                .get_or_insert_with(|| {
                    Counter::new("Receiving objects", Some(u64::from(total)))
                })
                .set(u64::from(done)),
            Progress::Resolving { done, total } => resolving
                .get_or_insert_with(|| {
                    Counter::new("Resolving deltas", Some(u64::from(total)))
                })
                .set(u64::from(done)),
        };
        if let Some(line) = line {
            progress_lines.push(line);
        }
    })?;

    if !quiet && sideband != SidebandMode::None {
        let mut out = PktWriter::new(&mut *channel);
        for line in &progress_lines {
            send(&mut out, sideband, Band::Progress, line.as_bytes())?;
        }
    }

    for object in &parsed.objects {
        store.put_raw(object.kind, &object.payload, &object.id)?;
    }

    Ok(parsed.objects.len())
}

/// Apply one command as a compare-and-set against the ref store,
/// guarding non-forced updates with the ancestry check.
fn apply_command(
    repo: &Repository,
    command: &Command,
    forced: bool,
    applied: &mut Vec<RefUpdateRecord>,
) -> CommandStatus {
    let name = match &command.name {
        Ok(name) => name,
        Err(reason) => return CommandStatus::Ng(format!("funny refname ({reason})")),
    };

    if command.is_delete() {
        if command.is_create() {
            return CommandStatus::Ng("zero to zero".into());
        }
        return match repo.refs().delete(name, Expect::Value(command.old)) {
            Ok(()) => {
                applied.push(RefUpdateRecord {
                    name: name.clone(),
                    old: Some(command.old),
                    new: None,
                });
                CommandStatus::Ok
            }
            Err(e) => CommandStatus::Ng(update_reason(e)),
        };
    }

    // The new tip must have arrived (or already be present) and resolve.
    if !repo.objects().has(&command.new) {
        return CommandStatus::Ng("missing necessary objects".into());
    }

    let expected = if command.is_create() {
        Expect::Absent
    } else {
        if !forced {
            match is_ancestor(repo, &command.old, &command.new) {
                Ok(true) => {}
                Ok(false) => return CommandStatus::Ng("non-fast-forward".into()),
                Err(e) => return CommandStatus::Ng(format!("ancestry check failed: {e}")),
            }
        }
        Expect::Value(command.old)
    };

    match repo.refs().set(name, command.new, expected) {
        Ok(()) => {
            applied.push(RefUpdateRecord {
                name: name.clone(),
                old: (!command.is_create()).then_some(command.old),
                new: Some(command.new),
            });
            CommandStatus::Ok
        }
        Err(e) => CommandStatus::Ng(update_reason(e)),
    }
}

fn update_reason(e: quay_ref::RefError) -> String {
    use quay_ref::RefError;
    match e {
        RefError::RefRaced { .. } => "failed to lock".into(),
        RefError::NotFound(_) => "no such ref".into(),
        other => other.to_string(),
    }
}

/// The `<reason>` token of `unpack <reason>`, also echoed into each
/// `ng` line when the whole pack was bad.
///
/// Receive-pack never offers thin packs, so a REF-delta base id that
/// matched nothing means some object the pack was supposed to carry
/// recomputed to a different hash than the delta expected: the object
/// is invalid, not merely absent.
fn unpack_reason(e: &WireError) -> String {
    match e {
        WireError::Pack(quay_pack::PackError::UnresolvedDelta { missing_bases, .. }) => {
            if missing_bases.is_empty() {
                "unresolved-delta".into()
            } else {
                "invalid-object".into()
            }
        }
        WireError::Pack(quay_pack::PackError::TrailerMismatch { .. }) => "invalid-pack".into(),
        WireError::Odb(quay_odb::OdbError::HashMismatch { .. }) => "invalid-object".into(),
        other => format!("failed: {other}"),
    }
}

/// Emit the status report, side-band wrapped when negotiated.
fn write_report<C: Read + Write>(
    channel: &mut C,
    sideband: SidebandMode,
    unpack_result: &Result<usize, WireError>,
    statuses: &[(String, CommandStatus)],
) -> Result<(), WireError> {
    // The report is itself pkt-line framed; under side-band that whole
    // encoding rides channel 1.
    let mut report = Vec::new();
    {
        let mut inner = PktWriter::new(&mut report);
        match unpack_result {
            Ok(_) => inner.write_text("unpack ok")?,
            Err(e) => inner.write_text(&format!("unpack {}", unpack_reason(e)))?,
        }
        for (name, status) in statuses {
            match status {
                CommandStatus::Ok => inner.write_text(&format!("ok {name}"))?,
                CommandStatus::Ng(reason) => {
                    inner.write_text(&format!("ng {name} {reason}"))?
                }
            }
        }
        inner.write_flush()?;
    }

    let mut out = PktWriter::new(&mut *channel);
    if sideband == SidebandMode::None {
        out.inner_mut().write_all(&report)?;
    } else {
        send(&mut out, sideband, Band::Pack, &report)?;
        out.write_flush()?;
    }
    out.flush()?;
    Ok(())
}

fn transition(from: SessionState, to: SessionState) -> SessionState {
    tracing::trace!(?from, ?to, "state");
    to
}
