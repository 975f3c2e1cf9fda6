//! Indexless pack parsing.
//!
//! Packs arrive off the wire as one buffer with no side index, so the
//! parser walks entries front to back, inflating each zlib stream with
//! a decoder that reports how many compressed bytes it consumed. Delta
//! entries are then resolved through a recursion-free worklist: a full
//! object resolves immediately, and each resolution wakes the deltas
//! waiting on its offset (OFS) or its SHA-1 (REF). Whatever is still
//! waiting when the worklist drains is unresolvable.

use std::collections::{HashMap, VecDeque};
use std::io::Read;

use flate2::bufread::ZlibDecoder;
use quay_hash::hasher::ObjectHasher;
use quay_hash::{HashKind, Oid};
use quay_object::ObjectType;

use crate::delta::apply_delta;
use crate::entry::{parse_entry, EntryHeader};
use crate::{PackError, PACK_HEADER_LEN, PACK_MAGIC, PACK_TRAILER_LEN};

/// Parser progress, suitable for rendering onto a progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Header parsed; the object count is known.
    Counting { total: u32 },
    /// Entry `done` of `total` inflated off the buffer.
    Receiving { done: u32, total: u32 },
    /// Delta `done` of `total` applied.
    Resolving { done: u32, total: u32 },
}

/// One fully resolved object lifted out of a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObject {
    pub kind: ObjectType,
    pub payload: Vec<u8>,
    /// Id under the repository's hash kind.
    pub id: Oid,
    /// Offset of the entry this object came from.
    pub offset: u64,
}

/// The outcome of parsing: every object, in entry order.
#[derive(Debug)]
pub struct ParsedPack {
    pub version: u32,
    pub objects: Vec<ParsedObject>,
}

/// An entry scanned off the buffer, before delta resolution.
struct Pending {
    offset: u64,
    header: EntryHeader,
    /// Inflated entry payload: object bytes or a delta stream.
    data: Vec<u8>,
    resolved: Option<(ObjectType, Vec<u8>)>,
}

/// Parse and fully resolve a pack.
///
/// `ext_base` supplies bases for REF-deltas that are not in the pack
/// (thin packs); return `None` to reject. Keyed by SHA-1 regardless of
/// `hash_kind`, because that is what the container carries.
pub fn parse_pack(
    data: &[u8],
    hash_kind: HashKind,
    mut ext_base: impl FnMut(&Oid) -> Option<(ObjectType, Vec<u8>)>,
    mut progress: impl FnMut(Progress),
) -> Result<ParsedPack, PackError> {
    if data.len() < PACK_HEADER_LEN + PACK_TRAILER_LEN {
        return Err(PackError::Truncated {
            offset: 0,
            context: "pack container",
        });
    }

    // Trailer first: nothing else is trustworthy until the checksum holds.
    let body_len = data.len() - PACK_TRAILER_LEN;
    let computed = ObjectHasher::digest(HashKind::Sha1, &data[..body_len])?;
    let stored = Oid::from_bytes(&data[body_len..], HashKind::Sha1)?;
    if computed != stored {
        return Err(PackError::TrailerMismatch { computed, stored });
    }

    if &data[..4] != PACK_MAGIC {
        return Err(PackError::BadMagic);
    }
    let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
    if version != 2 && version != 3 {
        return Err(PackError::UnsupportedVersion(version));
    }
    let count = u32::from_be_bytes(data[8..12].try_into().unwrap());
    progress(Progress::Counting { total: count });

    // Pass one: scan entries, inflating each payload as it goes by.
    let mut entries: Vec<Pending> = Vec::with_capacity(count as usize);
    let mut pos = PACK_HEADER_LEN as u64;

    for i in 0..count {
        let entry_offset = pos;
        if entry_offset as usize >= body_len {
            return Err(PackError::Truncated {
                offset: entry_offset,
                context: "entry header",
            });
        }
        let raw = parse_entry(&data[entry_offset as usize..body_len], entry_offset)?;
        let inflated = inflate_at(data, raw.data_start, body_len, raw.inflated_size, entry_offset)?;
        pos = raw.data_start + inflated.consumed;

        entries.push(Pending {
            offset: entry_offset,
            header: raw.header,
            data: inflated.bytes,
            resolved: None,
        });
        progress(Progress::Receiving {
            done: i + 1,
            total: count,
        });
    }

    if pos as usize != body_len {
        return Err(PackError::Corrupt {
            offset: pos,
            reason: format!(
                "{} bytes of trailing garbage before trailer",
                body_len - pos as usize
            ),
        });
    }

    let mut resolver = Resolver::new(&mut entries)?;
    resolver.run(&mut ext_base, &mut progress)?;

    // Final ids under the repository hash.
    let mut objects = Vec::with_capacity(entries.len());
    for entry in entries {
        let (kind, payload) = entry.resolved.expect("all entries resolved");
        let id = ObjectHasher::hash_object(hash_kind, kind.as_str(), &payload)?;
        objects.push(ParsedObject {
            kind,
            payload,
            id,
            offset: entry.offset,
        });
    }

    Ok(ParsedPack { version, objects })
}

struct Inflated {
    bytes: Vec<u8>,
    consumed: u64,
}

/// Inflate one zlib stream starting at `start`, bounded by the trailer.
/// The decoder reports exactly how many compressed bytes it read, which
/// is how the next entry's offset is found.
fn inflate_at(
    data: &[u8],
    start: u64,
    body_len: usize,
    declared: u64,
    entry_offset: u64,
) -> Result<Inflated, PackError> {
    let window = data
        .get(start as usize..body_len)
        .ok_or(PackError::Truncated {
            offset: entry_offset,
            context: "entry payload",
        })?;

    let mut decoder = ZlibDecoder::new(window);
    let mut bytes = Vec::with_capacity(declared as usize);
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| PackError::Corrupt {
            offset: entry_offset,
            reason: format!("zlib: {e}"),
        })?;

    if bytes.len() as u64 != declared {
        return Err(PackError::Corrupt {
            offset: entry_offset,
            reason: format!("declared {declared} inflated bytes, got {}", bytes.len()),
        });
    }

    Ok(Inflated {
        consumed: decoder.total_in(),
        bytes,
    })
}

/// Worklist state for delta resolution.
struct Resolver<'a> {
    entries: &'a mut [Pending],
    waiting_on_offset: HashMap<u64, Vec<usize>>,
    waiting_on_id: HashMap<Oid, Vec<usize>>,
    queue: VecDeque<usize>,
    has_ref_deltas: bool,
    total_deltas: u32,
    resolved_deltas: u32,
}

impl<'a> Resolver<'a> {
    /// Register every entry: full objects seed the queue, deltas wait on
    /// their base key.
    fn new(entries: &'a mut [Pending]) -> Result<Self, PackError> {
        let total_deltas = entries
            .iter()
            .filter(|e| !matches!(e.header, EntryHeader::Plain(_)))
            .count() as u32;
        let has_ref_deltas = entries
            .iter()
            .any(|e| matches!(e.header, EntryHeader::RefDelta { .. }));

        let offsets: HashMap<u64, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.offset, i))
            .collect();

        let mut waiting_on_offset: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut waiting_on_id: HashMap<Oid, Vec<usize>> = HashMap::new();
        let mut queue = VecDeque::new();

        for (i, entry) in entries.iter_mut().enumerate() {
            match entry.header {
                EntryHeader::Plain(kind) => {
                    entry.resolved = Some((kind, std::mem::take(&mut entry.data)));
                    queue.push_back(i);
                }
                EntryHeader::OfsDelta { base_offset } => {
                    if !offsets.contains_key(&base_offset) {
                        return Err(PackError::Corrupt {
                            offset: entry.offset,
                            reason: format!(
                                "ofs-delta base offset {base_offset} is not an entry"
                            ),
                        });
                    }
                    waiting_on_offset.entry(base_offset).or_default().push(i);
                }
                EntryHeader::RefDelta { base } => {
                    waiting_on_id.entry(base).or_default().push(i);
                }
            }
        }

        Ok(Self {
            entries,
            waiting_on_offset,
            waiting_on_id,
            queue,
            has_ref_deltas,
            total_deltas,
            resolved_deltas: 0,
        })
    }

    fn run(
        &mut self,
        ext_base: &mut impl FnMut(&Oid) -> Option<(ObjectType, Vec<u8>)>,
        progress: &mut impl FnMut(Progress),
    ) -> Result<(), PackError> {
        self.drain(progress)?;

        // Thin-pack completion: ids still waited on must resolve outside
        // the pack.
        if !self.waiting_on_id.is_empty() {
            let missing: Vec<Oid> = self.waiting_on_id.keys().copied().collect();
            for base_id in missing {
                if let Some((kind, payload)) = ext_base(&base_id) {
                    let deps = self.waiting_on_id.remove(&base_id).unwrap_or_default();
                    self.wake(&deps, kind, &payload, progress)?;
                }
            }
            self.drain(progress)?;
        }

        let remaining = self.entries.iter().filter(|e| e.resolved.is_none()).count();
        if remaining > 0 {
            // Whatever is still keyed by id names a base whose hash no
            // object in (or outside) the pack actually has.
            let mut missing_bases: Vec<Oid> = self.waiting_on_id.keys().copied().collect();
            missing_bases.sort();
            return Err(PackError::UnresolvedDelta {
                remaining,
                missing_bases,
            });
        }
        Ok(())
    }

    /// Pop resolved entries and wake whatever waits on them.
    fn drain(&mut self, progress: &mut impl FnMut(Progress)) -> Result<(), PackError> {
        while let Some(i) = self.queue.pop_front() {
            let (kind, payload) = self.entries[i]
                .resolved
                .clone()
                .expect("queued entries are resolved");

            if let Some(deps) = self.waiting_on_offset.remove(&self.entries[i].offset) {
                self.wake(&deps, kind, &payload, progress)?;
            }
            if self.has_ref_deltas {
                let sha1 = ObjectHasher::hash_object(HashKind::Sha1, kind.as_str(), &payload)?;
                if let Some(deps) = self.waiting_on_id.remove(&sha1) {
                    self.wake(&deps, kind, &payload, progress)?;
                }
            }
        }
        Ok(())
    }

    /// Apply the delta of each dependent against `payload` and enqueue it.
    fn wake(
        &mut self,
        deps: &[usize],
        kind: ObjectType,
        payload: &[u8],
        progress: &mut impl FnMut(Progress),
    ) -> Result<(), PackError> {
        for &dep in deps {
            let delta = std::mem::take(&mut self.entries[dep].data);
            let target = apply_delta(payload, &delta).map_err(|e| match e {
                PackError::BadDeltaOp { .. } => e,
                other => PackError::InvalidDelta {
                    offset: self.entries[dep].offset,
                    reason: other.to_string(),
                },
            })?;
            self.entries[dep].resolved = Some((kind, target));
            self.resolved_deltas += 1;
            progress(Progress::Resolving {
                done: self.resolved_deltas,
                total: self.total_deltas,
            });
            self.queue.push_back(dep);
        }
        Ok(())
    }
}
