//! Integration tests for the recipient ledger
//!
//! These tests verify that:
//! - Concurrent writers never lose records
//! - Separate ledger handles on one file serialize through the lock file
//! - A lock file left by a crashed writer does not block later writers
//! - Leftovers of an interrupted write do not corrupt the ledger
//! - Pruning removes only delivered artifacts

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use study_courier::core::ledger::MappingLedger;
use study_courier::domain::ArtifactName;
use tempfile::TempDir;

fn name(s: &str) -> ArtifactName {
    ArtifactName::new(s).unwrap()
}

#[test]
fn test_concurrent_appends_keep_every_record() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(MappingLedger::new(dir.path().join("mapping.json")));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for j in 0..5 {
                    ledger
                        .append(
                            &name(&format!("a{i}_{j}.zip")),
                            &[format!("user{i}@example.org")],
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let records = ledger.records().unwrap();
    assert_eq!(records.len(), 40);
    let files: HashSet<_> = records.iter().map(|r| r.file.clone()).collect();
    assert_eq!(files.len(), 40);
}

#[test]
fn test_independent_handles_share_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mapping.json");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = path.clone();
            thread::spawn(move || {
                let ledger = MappingLedger::new(path);
                for j in 0..5 {
                    ledger
                        .append(&name(&format!("h{i}_{j}.zip")), &["x@example.org".to_string()])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(MappingLedger::new(&path).records().unwrap().len(), 20);
}

#[test]
fn test_lock_file_from_crashed_writer_is_reused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mapping.json");
    fs::write(dir.path().join("mapping.json.lock"), b"31337\n").unwrap();

    let ledger = MappingLedger::new(&path);
    ledger
        .append(&name("a.zip"), &["alice@example.com".to_string()])
        .unwrap();
    ledger.prune(|file| file.as_str() == "a.zip").unwrap();
    MappingLedger::new(&path)
        .append(&name("b.zip"), &["bob@example.com".to_string()])
        .unwrap();

    let files: Vec<String> = ledger
        .records()
        .unwrap()
        .into_iter()
        .map(|r| r.file.to_string())
        .collect();
    assert_eq!(files, vec!["b.zip".to_string()]);
}

#[test]
fn test_interrupted_write_leaves_previous_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mapping.json");
    let ledger = MappingLedger::new(&path);
    ledger
        .append(&name("a.zip"), &["alice@example.com".to_string()])
        .unwrap();

    // a crashed writer leaves a temp file and a half-written line behind
    fs::write(dir.path().join(".mapping.json.tmp123"), b"{\"file\":\"b.z").unwrap();
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str("{\"file\":\"c.zip\",\"em");
    fs::write(&path, text).unwrap();

    let records = ledger.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file, name("a.zip"));

    ledger
        .append(&name("d.zip"), &["dave@example.com".to_string()])
        .unwrap();
    let files: Vec<String> = ledger
        .records()
        .unwrap()
        .into_iter()
        .map(|r| r.file.to_string())
        .collect();
    assert_eq!(files, vec!["a.zip".to_string(), "d.zip".to_string()]);
}

#[test]
fn test_prune_removes_only_delivered() {
    let dir = TempDir::new().unwrap();
    let ledger = MappingLedger::new(dir.path().join("mapping.json"));
    ledger
        .append(
            &name("done.zip"),
            &["a@example.com".to_string(), "b@example.com".to_string()],
        )
        .unwrap();
    ledger
        .append(&name("open.zip"), &["c@example.com".to_string()])
        .unwrap();

    let removed = ledger.prune(|file| file.as_str() == "done.zip").unwrap();

    assert_eq!(removed, 2);
    let recipients = ledger.load_recipients().unwrap();
    assert_eq!(recipients.len(), 1);
    assert_eq!(
        recipients.get(&name("open.zip")).unwrap(),
        &vec!["c@example.com".to_string()]
    );
}
