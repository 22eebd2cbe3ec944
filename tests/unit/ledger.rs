use super::*;

#[test]
fn record_then_contains_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/ledger.txt");
    let ledger = UsageLedger::open(&path).unwrap();
    assert!(!ledger.contains("https://example.com/a").unwrap());

    ledger.record("https://example.com/a").unwrap();
    assert!(ledger.contains("https://example.com/a").unwrap());
    assert!(!ledger.contains("https://example.com/b").unwrap());

    let reopened = UsageLedger::open(&path).unwrap();
    assert!(reopened.contains("https://example.com/a").unwrap());
}

#[test]
fn duplicate_records_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = UsageLedger::open(dir.path().join("ledger.txt")).unwrap();
    ledger.record("post-1").unwrap();
    ledger.record("post-1").unwrap();
    assert!(ledger.contains("post-1").unwrap());

    let raw = std::fs::read_to_string(ledger.path()).unwrap();
    assert_eq!(raw.lines().filter(|l| *l == "post-1").count(), 2);
    assert_eq!(ledger.entries().unwrap().len(), 1);
}

#[test]
fn claim_is_check_and_set() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = UsageLedger::open(dir.path().join("ledger.txt")).unwrap();
    assert!(ledger.claim("post-9").unwrap());
    assert!(!ledger.claim("post-9").unwrap());
    assert!(ledger.contains("post-9").unwrap());
}

#[test]
fn concurrent_claims_hand_out_each_id_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.txt");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            std::thread::spawn(move || {
                let ledger = UsageLedger::open(&path).unwrap();
                (0..10)
                    .filter(|i| ledger.claim(&format!("item-{i}")).unwrap())
                    .count()
            })
        })
        .collect();
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 10);
}

#[test]
fn blank_lines_are_ignored_and_ids_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.txt");
    std::fs::write(&path, "a\n\n  \nb\n").unwrap();
    let ledger = UsageLedger::open(&path).unwrap();
    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(ledger.record("").is_err());
    assert!(ledger.record("two\nlines").is_err());
}

#[test]
fn unterminated_last_line_keeps_both_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.txt");
    std::fs::write(&path, "post-a").unwrap();
    let ledger = UsageLedger::open(&path).unwrap();

    ledger.record("post-b").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "post-a\npost-b\n");
    assert!(ledger.contains("post-a").unwrap());
    assert!(ledger.contains("post-b").unwrap());

    std::fs::write(&path, "post-a\npost-b").unwrap();
    assert!(!ledger.claim("post-a").unwrap());
    assert!(ledger.claim("post-c").unwrap());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "post-a\npost-b\npost-c\n"
    );
}
