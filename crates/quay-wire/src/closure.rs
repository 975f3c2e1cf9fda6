//! Object graph walks: the set a fetch must send, and the ancestry
//! check guarding non-forced ref updates.

use std::collections::HashSet;

use quay_hash::Oid;
use quay_object::{Object, ObjectType};
use quay_repo::Repository;

use crate::WireError;

/// Everything reachable from `wants` but not from `haves`, as
/// `(kind, payload)` pairs ready for pack writing.
///
/// Unknown haves are ignored (the client may hold objects this server
/// never saw); unknown wants are an error upstream of this walk.
pub fn objects_to_send(
    repo: &Repository,
    wants: &[Oid],
    haves: &[Oid],
) -> Result<Vec<(ObjectType, Vec<u8>)>, WireError> {
    let mut excluded = HashSet::new();
    for have in haves {
        if repo.objects().has(have) {
            collect(repo, *have, &mut excluded, &mut None)?;
        }
    }

    let mut seen = excluded.clone();
    let mut out = Vec::new();
    for want in wants {
        collect(repo, *want, &mut seen, &mut Some(&mut out))?;
    }
    Ok(out)
}

/// Depth-first reachability from `start`. When `sink` is set, each
/// newly visited object's payload is pushed onto it.
fn collect(
    repo: &Repository,
    start: Oid,
    seen: &mut HashSet<Oid>,
    sink: &mut Option<&mut Vec<(ObjectType, Vec<u8>)>>,
) -> Result<(), WireError> {
    let mut stack = vec![start];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        let Some(raw) = repo.objects().get(&oid)? else {
            // Excluded-side walks tolerate holes; sending-side walks
            // must not reference objects this store lacks.
            if sink.is_some() {
                return Err(WireError::Odb(quay_odb::OdbError::NotFound(oid)));
            }
            continue;
        };

        match Object::parse_payload(raw.kind, &raw.payload, repo.hash_kind())? {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                stack.extend(commit.parents.iter().copied());
            }
            Object::Tree(tree) => {
                stack.extend(tree.entries.iter().map(|e| e.oid));
            }
            Object::Tag(tag) => stack.push(tag.target),
            Object::Blob(_) => {}
        }

        if let Some(out) = sink.as_deref_mut() {
            out.push((raw.kind, raw.payload));
        }
    }
    Ok(())
}

/// Is `ancestor` reachable from `descendant` through parent links?
/// Used for the fast-forward check; equal ids count as reachable.
pub fn is_ancestor(repo: &Repository, ancestor: &Oid, descendant: &Oid) -> Result<bool, WireError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let mut seen = HashSet::new();
    let mut stack = vec![*descendant];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        if oid == *ancestor {
            return Ok(true);
        }
        let Some(commit) = repo.objects().get_parsed(&oid)? else {
            continue;
        };
        if let Object::Commit(commit) = commit {
            stack.extend(commit.parents.iter().copied());
        }
    }
    Ok(false)
}
