//! Server side of fetch: advertisement, want/have negotiation, pack
//! streaming.

use std::io::{Read, Write};

use quay_hash::Oid;
use quay_pack::{write_pack, WriteOptions};
use quay_repo::Repository;
use quay_utils::progress::Counter;

use crate::advertise::write_advertisement;
use crate::capability::{Capabilities, SidebandMode};
use crate::closure::objects_to_send;
use crate::pktline::{Packet, PktReader, PktWriter};
use crate::session::{Service, SessionState};
use crate::sideband::{send, Band};
use crate::WireError;

/// Parsed negotiation request.
#[derive(Debug, Default)]
struct FetchRequest {
    wants: Vec<Oid>,
    haves: Vec<Oid>,
    caps: Capabilities,
    done: bool,
}

/// Drive a whole upload-pack session over `channel`.
pub fn serve_upload_pack<C: Read + Write>(
    repo: &Repository,
    channel: &mut C,
) -> Result<(), WireError> {
    let mut state = SessionState::Advertise;

    {
        let mut out = PktWriter::new(&mut *channel);
        write_advertisement(repo, Service::UploadPack, &mut out)?;
    }

    state = transition(state, SessionState::Negotiate);
    let request = match read_request(channel)? {
        Some(request) => request,
        // Flush with no wants: the client is satisfied already.
        None => return Ok(()),
    };
    request.caps.check_subset_of(Service::UploadPack)?;
    tracing::debug!(
        wants = request.wants.len(),
        haves = request.haves.len(),
        done = request.done,
        "negotiation request"
    );

    let sideband = SidebandMode::from_caps(&request.caps);
    let quiet = request.caps.has("no-progress");

    for want in &request.wants {
        if !repo.objects().has(want) {
            return fatal(
                channel,
                sideband,
                &format!("want {want} not our ref"),
                WireError::Protocol(format!("client wants unknown object {want}")),
            );
        }
    }

    // Minimal negotiation: acknowledge the first have we hold, else NAK.
    let common: Option<Oid> = request
        .haves
        .iter()
        .find(|oid| repo.objects().has(oid))
        .copied();
    {
        let mut out = PktWriter::new(&mut *channel);
        match common {
            Some(oid) => out.write_text(&format!("ACK {}", oid.to_hex()))?,
            None => out.write_text("NAK")?,
        }
        out.flush()?;
    }

    state = transition(state, SessionState::SendPack);
    let known_haves: Vec<Oid> = request
        .haves
        .iter()
        .filter(|oid| repo.objects().has(oid))
        .copied()
        .collect();

    let mut out = PktWriter::new(&mut *channel);

    let objects = objects_to_send(repo, &request.wants, &known_haves)?;
    if !quiet {
        let mut counter = Counter::new("Enumerating objects", Some(objects.len() as u64));
        counter.set(objects.len() as u64);
        send(&mut out, sideband, Band::Progress, counter.finish().as_bytes())?;
    }

    let pack = write_pack(&objects, &WriteOptions::default())?;
    tracing::debug!(
        objects = objects.len(),
        pack_bytes = pack.len(),
        "streaming pack"
    );

    send(&mut out, sideband, Band::Pack, &pack)?;
    if sideband != SidebandMode::None {
        if !quiet {
            send(
                &mut out,
                sideband,
                Band::Progress,
                format!("Total {} objects\n", objects.len()).as_bytes(),
            )?;
        }
        out.write_flush()?;
    }
    out.flush()?;

    let _ = transition(state, SessionState::Closed);
    Ok(())
}

/// Read the want section and the have section.
///
/// Returns `None` when the client flushes without wanting anything.
fn read_request<C: Read + Write>(channel: &mut C) -> Result<Option<FetchRequest>, WireError> {
    let mut request = FetchRequest::default();
    let mut reader = PktReader::new(&mut *channel);

    // Wants, capabilities on the first line.
    let mut first = true;
    loop {
        match reader.read_packet()? {
            Packet::Flush => break,
            Packet::Data(data) => {
                let line = trim_newline(&data);
                if let Some(rest) = strip_word(line, b"want ") {
                    let (hex, caps) = split_caps(rest);
                    request.wants.push(parse_oid(hex)?);
                    if first {
                        request.caps = Capabilities::parse(caps.unwrap_or(b""));
                    }
                    first = false;
                } else if strip_word(line, b"shallow ").is_some() {
                    // Shallow clients announce their boundary commits;
                    // harmless for a full-history server.
                } else if strip_word(line, b"deepen").is_some() {
                    return Err(WireError::Protocol(
                        "deepen is not supported by this server".into(),
                    ));
                } else {
                    return Err(WireError::Protocol(format!(
                        "unexpected line in want section: {}",
                        String::from_utf8_lossy(line)
                    )));
                }
            }
            _ => return Err(WireError::BadFraming("v2 packet in want section".into())),
        }
    }

    if request.wants.is_empty() {
        return Ok(None);
    }

    // Haves until done (or a terminating flush).
    loop {
        match reader.read_packet()? {
            Packet::Flush => break,
            Packet::Data(data) => {
                let line = trim_newline(&data);
                if let Some(hex) = strip_word(line, b"have ") {
                    request.haves.push(parse_oid(hex)?);
                } else if line == b"done" {
                    request.done = true;
                    break;
                } else {
                    return Err(WireError::Protocol(format!(
                        "unexpected line in have section: {}",
                        String::from_utf8_lossy(line)
                    )));
                }
            }
            _ => return Err(WireError::BadFraming("v2 packet in have section".into())),
        }
    }

    Ok(Some(request))
}

/// Report a fatal condition on channel 3 (when multiplexing) and fail
/// the session with `err`.
fn fatal<C: Read + Write>(
    channel: &mut C,
    sideband: SidebandMode,
    message: &str,
    err: WireError,
) -> Result<(), WireError> {
    if sideband != SidebandMode::None {
        let mut out = PktWriter::new(&mut *channel);
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');
        let _ = send(&mut out, sideband, Band::Fatal, line.as_bytes());
        let _ = out.write_flush();
        let _ = out.flush();
    }
    Err(err)
}

fn transition(from: SessionState, to: SessionState) -> SessionState {
    tracing::trace!(?from, ?to, "state");
    to
}

fn trim_newline(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(b'\n') => &data[..data.len() - 1],
        _ => data,
    }
}

fn strip_word<'a>(line: &'a [u8], word: &[u8]) -> Option<&'a [u8]> {
    line.strip_prefix(word)
}

fn split_caps(rest: &[u8]) -> (&[u8], Option<&[u8]>) {
    match rest.iter().position(|&b| b == b' ') {
        Some(space) => (&rest[..space], Some(&rest[space + 1..])),
        None => (rest, None),
    }
}

fn parse_oid(hex: &[u8]) -> Result<Oid, WireError> {
    let text = std::str::from_utf8(hex)
        .map_err(|_| WireError::Protocol("non-UTF-8 object id".into()))?;
    Oid::from_hex(text).map_err(|e| WireError::Protocol(format!("bad object id {text:?}: {e}")))
}
