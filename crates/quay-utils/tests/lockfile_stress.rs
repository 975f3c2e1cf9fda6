//! Concurrency stress for the lock-file primitive: many threads race to
//! replace the same file; every committed write must be complete and the
//! lock file must never be left behind.

use std::io::Write;
use std::sync::Arc;

use quay_utils::lockfile::Lockfile;

#[test]
fn racing_writers_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(dir.path().join("contended"));
    std::fs::write(target.as_path(), b"seed").unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let target = Arc::clone(&target);
        handles.push(std::thread::spawn(move || {
            let mut wins = 0usize;
            for round in 0..50 {
                match Lockfile::try_hold(target.as_path()).unwrap() {
                    Some(mut guard) => {
                        let payload = format!("writer-{i}-round-{round}");
                        guard.write_all(payload.as_bytes()).unwrap();
                        guard.commit().unwrap();
                        wins += 1;
                    }
                    None => std::thread::yield_now(),
                }
            }
            wins
        }));
    }

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0, "at least one writer must have won a round");

    // Whatever was committed last must be a complete payload.
    let final_content = std::fs::read_to_string(target.as_path()).unwrap();
    assert!(final_content.starts_with("writer-"));

    // No stale lock file after all guards are gone.
    assert!(!dir.path().join("contended.lock").exists());
}

#[test]
fn abort_releases_for_next_writer() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("value");

    let guard = Lockfile::hold(&target).unwrap();
    guard.abort().unwrap();

    // Lock must be immediately available again.
    let mut guard = Lockfile::hold(&target).unwrap();
    guard.write_all(b"second").unwrap();
    guard.commit().unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"second");
}
