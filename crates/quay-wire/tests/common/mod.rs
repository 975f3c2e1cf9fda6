//! Shared fixtures: an in-memory byte channel and repository builders.

use std::io::{Cursor, Read, Write};

use bstr::BString;
use quay_hash::Oid;
use quay_object::{Blob, Commit, EntryMode, ObjectType, Tree, TreeEntry};
use quay_repo::{InitOptions, Repository};
use quay_utils::ident::{Identity, Timestamp};
use quay_wire::pktline::PktReader;
use quay_wire::Packet;

/// A scripted connection: the client's bytes are fixed up front, the
/// server's response accumulates in `sent`.
pub struct TestChannel {
    input: Cursor<Vec<u8>>,
    pub sent: Vec<u8>,
}

impl TestChannel {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            sent: Vec::new(),
        }
    }
}

impl Read for TestChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for TestChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn ident() -> Identity {
    Identity {
        name: BString::from("Push Bot"),
        email: BString::from("bot@example.com"),
        when: Timestamp::new(1_700_000_000, 0),
    }
}

pub fn test_repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
    (dir, repo)
}

/// The canonical three objects of a single-file commit, as raw pairs
/// (not yet stored anywhere).
pub fn commit_objects(
    parents: Vec<Oid>,
    file: &str,
    content: &[u8],
    message: &str,
    hash_kind: quay_hash::HashKind,
) -> (Vec<(ObjectType, Vec<u8>)>, Oid) {
    let blob = Blob::from_data(content.to_vec());
    let blob_payload: Vec<u8> = blob.data.clone().into();
    let blob_id =
        quay_hash::hasher::ObjectHasher::hash_object(hash_kind, "blob", &blob_payload).unwrap();

    let tree = Tree {
        entries: vec![TreeEntry {
            mode: EntryMode::File,
            name: BString::from(file),
            oid: blob_id,
        }],
    };
    let tree_payload = tree.to_payload();
    let tree_id =
        quay_hash::hasher::ObjectHasher::hash_object(hash_kind, "tree", &tree_payload).unwrap();

    let commit = Commit {
        tree: tree_id,
        parents,
        author: ident(),
        committer: ident(),
        extra: vec![],
        message: BString::from(message),
    };
    let commit_payload = commit.to_payload();
    let commit_id =
        quay_hash::hasher::ObjectHasher::hash_object(hash_kind, "commit", &commit_payload)
            .unwrap();

    (
        vec![
            (ObjectType::Commit, commit_payload),
            (ObjectType::Tree, tree_payload),
            (ObjectType::Blob, blob_payload),
        ],
        commit_id,
    )
}

/// Store a single-file commit into the repository, returning its id.
pub fn store_commit(repo: &Repository, parents: Vec<Oid>, file: &str, content: &[u8]) -> Oid {
    let (objects, commit_id) =
        commit_objects(parents, file, content, &format!("{file}\n"), repo.hash_kind());
    for (kind, payload) in &objects {
        repo.objects().put(*kind, payload).unwrap();
    }
    commit_id
}

/// Consume the server's ref advertisement; returns its text lines.
pub fn read_advertisement<R: Read>(reader: &mut PktReader<R>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match reader.read_packet().unwrap() {
            Packet::Flush => return lines,
            Packet::Data(data) => lines.push(String::from_utf8_lossy(&data).into_owned()),
            other => panic!("unexpected packet in advertisement: {other:?}"),
        }
    }
}

/// Remaining pkt-line text lines until flush.
pub fn read_report<R: Read>(reader: &mut PktReader<R>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match reader.read_packet().unwrap() {
            Packet::Flush => return lines,
            Packet::Data(data) => {
                lines.push(String::from_utf8_lossy(&data).trim_end().to_string())
            }
            other => panic!("unexpected packet in report: {other:?}"),
        }
    }
}
