//! End-to-end receive-pack sessions over an in-memory channel.

mod common;

use std::io::Cursor;

use common::{commit_objects, read_advertisement, read_report, store_commit, test_repo, TestChannel};
use quay_hash::{HashKind, Oid};
use quay_object::ObjectType;
use quay_pack::{write_pack, WriteOptions};
use quay_ref::{Expect, RefName};
use quay_wire::pktline::{PktReader, PktWriter};
use quay_wire::{serve_anonymous, ServeOutcome, Service};

fn zero() -> String {
    "0".repeat(40)
}

/// Script the client's command section plus an optional pack.
fn push_request(commands: &[(String, String, &str)], caps: &str, pack: Option<Vec<u8>>) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut w = PktWriter::new(&mut buf);
        for (i, (old, new, name)) in commands.iter().enumerate() {
            if i == 0 {
                w.write_text(&format!("{old} {new} {name}\0{caps}")).unwrap();
            } else {
                w.write_text(&format!("{old} {new} {name}")).unwrap();
            }
        }
        w.write_flush().unwrap();
    }
    if let Some(pack) = pack {
        buf.extend_from_slice(&pack);
    }
    buf
}

#[test]
fn push_creates_a_branch() {
    let (_dir, repo) = test_repo();
    let (objects, commit_id) =
        commit_objects(vec![], "hello.txt", b"hello\n", "initial\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(zero(), commit_id.to_hex(), "refs/heads/main")],
        "report-status ofs-delta",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    let outcome =
        serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let ServeOutcome::Pushed(summary) = outcome else {
        panic!("expected a push outcome");
    };
    assert_eq!(summary.objects_received, 3);
    assert_eq!(summary.ref_updates.len(), 1);
    assert_eq!(summary.ref_updates[0].new, Some(commit_id));

    // Status report: unpack ok, then the ref ok.
    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report, vec!["unpack ok", "ok refs/heads/main"]);

    // The ref now resolves to the pushed commit.
    let main = RefName::new("refs/heads/main").unwrap();
    assert_eq!(repo.refs().resolve(&main).unwrap(), Some(commit_id));
    assert!(repo.objects().has(&commit_id));
}

#[test]
fn non_fast_forward_is_rejected() {
    let (_dir, repo) = test_repo();
    let a = store_commit(&repo, vec![], "a.txt", b"line a");
    let main = RefName::new("refs/heads/main").unwrap();
    repo.refs().set(&main, a, Expect::Absent).unwrap();

    // B does not descend from A.
    let (objects, b) =
        commit_objects(vec![], "b.txt", b"line b", "unrelated\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(a.to_hex(), b.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report, vec!["unpack ok", "ng refs/heads/main non-fast-forward"]);

    // The branch kept its old tip.
    assert_eq!(repo.refs().resolve(&main).unwrap(), Some(a));
}

#[test]
fn force_overrides_fast_forward_check() {
    let (_dir, repo) = test_repo();
    let a = store_commit(&repo, vec![], "a.txt", b"line a");
    let main = RefName::new("refs/heads/main").unwrap();
    repo.refs().set(&main, a, Expect::Absent).unwrap();

    let (objects, b) =
        commit_objects(vec![], "b.txt", b"line b", "rewrite\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(a.to_hex(), b.to_hex(), "refs/heads/main")],
        "report-status force",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report, vec!["unpack ok", "ok refs/heads/main"]);
    assert_eq!(repo.refs().resolve(&main).unwrap(), Some(b));
}

#[test]
fn fast_forward_update_succeeds() {
    let (_dir, repo) = test_repo();
    let a = store_commit(&repo, vec![], "a.txt", b"base");
    let main = RefName::new("refs/heads/main").unwrap();
    repo.refs().set(&main, a, Expect::Absent).unwrap();

    let (objects, b) = commit_objects(vec![a], "b.txt", b"child", "child\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(a.to_hex(), b.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    assert_eq!(repo.refs().resolve(&main).unwrap(), Some(b));
}

/// Append a zlib stream of `data` to `pack`.
fn deflate_into(pack: &mut Vec<u8>, data: &[u8]) {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;
    let mut enc = ZlibEncoder::new(pack, Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap();
}

/// Seal a pack body with its SHA-1 trailer.
fn seal_pack(mut pack: Vec<u8>) -> Vec<u8> {
    let trailer = quay_hash::hasher::ObjectHasher::digest(HashKind::Sha1, &pack).unwrap();
    pack.extend_from_slice(trailer.as_bytes());
    pack
}

#[test]
fn broken_pack_rejects_every_ref_and_stores_nothing() {
    let (_dir, repo) = test_repo();

    // A pack whose only entry is a REF-delta onto a base nobody has.
    let ghost_base = Oid::from_hex("00000000000000000000000000000000000000bb").unwrap();
    let delta = {
        // Valid delta stream against a 4-byte base nobody will supply.
        let mut d = vec![0x04, 0x04];
        d.extend_from_slice(&[0x04, b'x', b'y', b'z', b'w']);
        d
    };
    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&1u32.to_be_bytes());
    pack.extend_from_slice(&quay_pack::entry::encode_ref_header(
        delta.len() as u64,
        &ghost_base,
    ));
    deflate_into(&mut pack, &delta);
    let pack = seal_pack(pack);

    let claimed = Oid::from_hex("00000000000000000000000000000000000000cc").unwrap();
    let request = push_request(
        &[(zero(), claimed.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(
        report,
        vec!["unpack invalid-object", "ng refs/heads/main invalid-object"]
    );

    // No ref moved, no object from the bad pack is visible.
    let main = RefName::new("refs/heads/main").unwrap();
    assert_eq!(repo.refs().resolve(&main).unwrap(), None);
    assert_eq!(repo.objects().iter_hashes().unwrap().count(), 0);
}

#[test]
fn corrupted_delta_base_rejects_the_whole_pack() {
    // The pack carries the delta's base, but a flipped byte means the
    // base recomputes to a different hash than the one the REF-delta
    // names. The whole pack must be rejected as invalid-object with no
    // ref updated and nothing from the pack visible in the store.
    let (_dir, repo) = test_repo();

    let base = vec![b'n'; 512];
    let mut derived = base.clone();
    derived.extend_from_slice(b"-extended");

    let base_id =
        quay_hash::hasher::ObjectHasher::hash_object(HashKind::Sha1, "blob", &base).unwrap();
    let derived_id =
        quay_hash::hasher::ObjectHasher::hash_object(HashKind::Sha1, "blob", &derived).unwrap();
    let delta = quay_pack::delta::make_delta(&base, &derived).unwrap();

    let mut corrupted = base.clone();
    corrupted[100] ^= 0x01;

    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&2u32.to_be_bytes());
    // The object meant to be the base, damaged in flight.
    pack.extend_from_slice(&quay_pack::entry::encode_plain_header(
        ObjectType::Blob,
        corrupted.len() as u64,
    ));
    deflate_into(&mut pack, &corrupted);
    // The delta still names the original, undamaged base.
    pack.extend_from_slice(&quay_pack::entry::encode_ref_header(
        delta.len() as u64,
        &base_id,
    ));
    deflate_into(&mut pack, &delta);
    let pack = seal_pack(pack);

    let request = push_request(
        &[(zero(), derived_id.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(
        report,
        vec!["unpack invalid-object", "ng refs/heads/main invalid-object"]
    );

    let main = RefName::new("refs/heads/main").unwrap();
    assert_eq!(repo.refs().resolve(&main).unwrap(), None);
    // Not even the parseable corrupted blob leaked into the store.
    assert_eq!(repo.objects().iter_hashes().unwrap().count(), 0);
}

#[test]
fn delete_command_needs_no_pack() {
    let (_dir, repo) = test_repo();
    let a = store_commit(&repo, vec![], "gone.txt", b"bye");
    let topic = RefName::new("refs/heads/topic").unwrap();
    repo.refs().set(&topic, a, Expect::Absent).unwrap();

    let request = push_request(
        &[(a.to_hex(), zero(), "refs/heads/topic")],
        "report-status delete-refs",
        None,
    );
    let mut channel = TestChannel::new(request);
    let outcome =
        serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let ServeOutcome::Pushed(summary) = outcome else {
        panic!("expected a push outcome");
    };
    assert_eq!(summary.objects_received, 0);
    assert_eq!(summary.ref_updates[0].new, None);

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report, vec!["unpack ok", "ok refs/heads/topic"]);
    assert_eq!(repo.refs().resolve(&topic).unwrap(), None);
}

#[test]
fn stale_old_value_reports_failed_lock() {
    let (_dir, repo) = test_repo();
    let a = store_commit(&repo, vec![], "a.txt", b"at a");
    let b = store_commit(&repo, vec![a], "b.txt", b"at b");
    let main = RefName::new("refs/heads/main").unwrap();
    repo.refs().set(&main, b, Expect::Absent).unwrap();

    // Client believes the branch is still at `a` and pushes a child of a.
    let (objects, c) = commit_objects(vec![a], "c.txt", b"at c", "from a\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(a.to_hex(), c.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report[0], "unpack ok");
    assert_eq!(report[1], "ng refs/heads/main failed to lock");

    // The concurrent value survived.
    assert_eq!(repo.refs().resolve(&main).unwrap(), Some(b));
}

#[test]
fn sideband_wraps_the_status_report() {
    let (_dir, repo) = test_repo();
    let (objects, commit_id) =
        commit_objects(vec![], "s.txt", b"sideband\n", "sb\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(zero(), commit_id.to_hex(), "refs/heads/main")],
        "report-status side-band-64k no-progress",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);

    // The report arrives as channel-1 frames; unwrap and re-parse.
    let mut demux = quay_wire::sideband::SidebandReader::new(reader);
    let wrapped = demux.read_all_pack_data().unwrap();
    let mut inner = PktReader::new(Cursor::new(wrapped));
    let report = read_report(&mut inner);
    assert_eq!(report, vec!["unpack ok", "ok refs/heads/main"]);
}

#[test]
fn invalid_ref_name_fails_only_that_command() {
    let (_dir, repo) = test_repo();
    let (objects, commit_id) =
        commit_objects(vec![], "v.txt", b"valid\n", "v\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[
            (zero(), commit_id.to_hex(), "refs/heads/ok"),
            (zero(), commit_id.to_hex(), "refs/heads/bad..name"),
        ],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let mut reader = PktReader::new(Cursor::new(channel.sent));
    read_advertisement(&mut reader);
    let report = read_report(&mut reader);
    assert_eq!(report[0], "unpack ok");
    assert_eq!(report[1], "ok refs/heads/ok");
    assert!(report[2].starts_with("ng refs/heads/bad..name funny refname"));

    let ok = RefName::new("refs/heads/ok").unwrap();
    assert_eq!(repo.refs().resolve(&ok).unwrap(), Some(commit_id));
}

#[test]
fn pushed_objects_are_readable_after_success() {
    let (_dir, repo) = test_repo();
    let (objects, commit_id) =
        commit_objects(vec![], "read.txt", b"readable\n", "r\n", repo.hash_kind());
    let pack = write_pack(&objects, &WriteOptions::default()).unwrap();

    let request = push_request(
        &[(zero(), commit_id.to_hex(), "refs/heads/main")],
        "report-status",
        Some(pack),
    );
    let mut channel = TestChannel::new(request);
    serve_anonymous(&repo, "demo", Service::ReceivePack, &mut channel).unwrap();

    let commit = repo.objects().read_commit(&commit_id).unwrap();
    let tree = repo.objects().read_tree(&commit.tree).unwrap();
    assert_eq!(tree.entries.len(), 1);
    let blob = repo.objects().require(&tree.entries[0].oid).unwrap();
    assert_eq!(blob.kind, ObjectType::Blob);
    assert_eq!(blob.payload, b"readable\n");
}
