//! Pack writing with delta selection.
//!
//! Objects are laid out kind-major (commits, trees, blobs, tags), each
//! kind largest first so that big objects come earliest and serve as
//! bases. Each object is tried as a delta against a sliding window of
//! recently written same-kind entries and emitted as an OFS-delta when
//! that wins; thin packs may additionally delta against bases the
//! receiver is known to hold, named by SHA-1 REF-delta.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use quay_hash::hasher::ObjectHasher;
use quay_hash::{HashKind, Oid};
use quay_object::ObjectType;

use crate::delta::make_delta;
use crate::entry::{encode_ofs_header, encode_plain_header, encode_ref_header};
use crate::{PackError, PACK_MAGIC, PACK_VERSION};

/// How many previously written same-kind entries are tried as bases.
const DELTA_WINDOW: usize = 10;

/// Knobs for pack generation.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Attempt delta compression at all.
    pub use_delta: bool,
    /// Longest allowed base chain.
    pub max_delta_chain: usize,
    /// Objects smaller than this are never deltified.
    pub min_delta_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            use_delta: true,
            max_delta_chain: 50,
            min_delta_size: 50,
        }
    }
}

/// A base object the receiver already holds, usable by thin packs.
#[derive(Debug, Clone)]
pub struct ExternalBase {
    /// SHA-1 of the base, as REF-delta entries carry it.
    pub id: Oid,
    pub kind: ObjectType,
    pub payload: Vec<u8>,
}

/// Write a self-contained pack.
pub fn write_pack(
    objects: &[(ObjectType, Vec<u8>)],
    options: &WriteOptions,
) -> Result<Vec<u8>, PackError> {
    write_pack_inner(objects, &[], options)
}

/// Write a thin pack: REF-deltas may name `external_bases`, which are
/// not themselves included.
pub fn write_thin_pack(
    objects: &[(ObjectType, Vec<u8>)],
    external_bases: &[ExternalBase],
    options: &WriteOptions,
) -> Result<Vec<u8>, PackError> {
    write_pack_inner(objects, external_bases, options)
}

struct Written {
    kind: ObjectType,
    /// Index into the caller's object slice.
    source: usize,
    offset: u64,
    chain_depth: usize,
}

enum Encoding {
    Full,
    Ofs {
        base_offset: u64,
        depth: usize,
        delta: Vec<u8>,
    },
    Ref {
        base: Oid,
        delta: Vec<u8>,
    },
}

fn write_pack_inner(
    objects: &[(ObjectType, Vec<u8>)],
    external_bases: &[ExternalBase],
    options: &WriteOptions,
) -> Result<Vec<u8>, PackError> {
    let mut out = Vec::new();
    out.extend_from_slice(PACK_MAGIC);
    out.extend_from_slice(&PACK_VERSION.to_be_bytes());
    out.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut order: Vec<usize> = (0..objects.len()).collect();
    order.sort_by(|&a, &b| {
        let (ka, pa) = (&objects[a].0, &objects[a].1);
        let (kb, pb) = (&objects[b].0, &objects[b].1);
        kind_rank(*ka)
            .cmp(&kind_rank(*kb))
            .then(pb.len().cmp(&pa.len()))
            .then(a.cmp(&b))
    });

    let mut written: Vec<Written> = Vec::with_capacity(objects.len());

    for &idx in &order {
        let (kind, payload) = (&objects[idx].0, &objects[idx].1);
        let offset = out.len() as u64;

        let encoding = choose_encoding(
            *kind,
            payload,
            objects,
            &written,
            external_bases,
            options,
        );

        let depth = match encoding {
            Encoding::Full => {
                out.extend_from_slice(&encode_plain_header(*kind, payload.len() as u64));
                out.extend_from_slice(&deflate(payload)?);
                0
            }
            Encoding::Ofs {
                base_offset,
                depth,
                delta,
            } => {
                out.extend_from_slice(&encode_ofs_header(
                    delta.len() as u64,
                    offset - base_offset,
                ));
                out.extend_from_slice(&deflate(&delta)?);
                depth
            }
            Encoding::Ref { base, delta } => {
                out.extend_from_slice(&encode_ref_header(delta.len() as u64, &base));
                out.extend_from_slice(&deflate(&delta)?);
                1
            }
        };

        written.push(Written {
            kind: *kind,
            source: idx,
            offset,
            chain_depth: depth,
        });
    }

    let trailer = ObjectHasher::digest(HashKind::Sha1, &out)?;
    out.extend_from_slice(trailer.as_bytes());
    Ok(out)
}

/// Pick the cheapest representation: the window (or external) base whose
/// delta saves the most bytes, or a full object when nothing wins.
fn choose_encoding(
    kind: ObjectType,
    payload: &[u8],
    objects: &[(ObjectType, Vec<u8>)],
    written: &[Written],
    external_bases: &[ExternalBase],
    options: &WriteOptions,
) -> Encoding {
    if !options.use_delta || payload.len() < options.min_delta_size {
        return Encoding::Full;
    }

    let mut best: Option<Encoding> = None;
    let mut best_len = payload.len();

    for candidate in written
        .iter()
        .rev()
        .filter(|w| w.kind == kind)
        .take(DELTA_WINDOW)
    {
        if candidate.chain_depth + 1 > options.max_delta_chain {
            continue;
        }
        let base_payload = &objects[candidate.source].1;
        if let Some(delta) = make_delta(base_payload, payload) {
            if delta.len() < best_len {
                best_len = delta.len();
                best = Some(Encoding::Ofs {
                    base_offset: candidate.offset,
                    depth: candidate.chain_depth + 1,
                    delta,
                });
            }
        }
    }

    for base in external_bases.iter().filter(|b| b.kind == kind) {
        if let Some(delta) = make_delta(&base.payload, payload) {
            if delta.len() < best_len {
                best_len = delta.len();
                best = Some(Encoding::Ref {
                    base: base.id,
                    delta,
                });
            }
        }
    }

    best.unwrap_or(Encoding::Full)
}

fn kind_rank(kind: ObjectType) -> u8 {
    match kind {
        ObjectType::Commit => 0,
        ObjectType::Tree => 1,
        ObjectType::Blob => 2,
        ObjectType::Tag => 3,
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
