use std::fs;

use promptloop_store::{
    CheckpointFile, InteractionLog, InteractionRecord, LedgerEntry, PromptLedger, ReadState,
    StorageError,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

fn records() -> Vec<InteractionRecord> {
    vec![
        InteractionRecord::new("My package never arrived", "I'm sorry to hear that."),
        InteractionRecord::new("Order #4411", "It shipped on Monday; here is the tracking link."),
        InteractionRecord::new("ünïcödé ✓ \"quotes\"", "line one\nline two"),
    ]
}

// ============================================================
// InteractionLog
// ============================================================

#[test]
fn test_interaction_log_round_trip_preserves_order() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    log.reset().unwrap();

    for record in records() {
        log.append(&record).unwrap();
    }

    assert_eq!(log.read_all().unwrap(), records());
}

#[test]
fn test_interaction_log_reset_yields_empty() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    for record in records() {
        log.append(&record).unwrap();
    }

    log.reset().unwrap();

    let read = log.read().unwrap();
    assert!(read.records.is_empty());
    assert_eq!(read.state, ReadState::Present);
    assert_eq!(fs::read_to_string(log.path()).unwrap(), "[]");
}

#[test]
fn test_interaction_log_missing_file_reads_empty() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());

    let read = log.read().unwrap();
    assert!(read.records.is_empty());
    assert_eq!(read.state, ReadState::Missing);
}

#[test]
fn test_interaction_log_corrupt_file_reads_empty() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    fs::write(log.path(), "{ this is not json").unwrap();

    let read = log.read().unwrap();
    assert!(read.records.is_empty());
    assert_eq!(read.state, ReadState::Corrupt);
    assert!(log.read_all().unwrap().is_empty());
}

#[test]
fn test_interaction_log_wrong_shape_reads_as_corrupt() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    fs::write(log.path(), r#"{"user_input": "not a list"}"#).unwrap();

    assert_eq!(log.read().unwrap().state, ReadState::Corrupt);
}

#[test]
fn test_interaction_log_append_after_corruption_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    fs::write(log.path(), "garbage").unwrap();

    let record = InteractionRecord::new("hi", "hello");
    log.append(&record).unwrap();

    assert_eq!(log.read_all().unwrap(), vec![record]);
}

#[test]
fn test_interaction_log_uses_persisted_field_names() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    log.append(&InteractionRecord::new("q", "r")).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(log.path()).unwrap()).unwrap();
    assert_eq!(raw, serde_json::json!([{"user_input": "q", "agent_output": "r"}]));
}

#[test]
fn test_interaction_log_reads_externally_written_file() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    fs::write(
        log.path(),
        r#"[{"user_input": "a", "agent_output": "b"}, {"user_input": "c", "agent_output": "d"}]"#,
    )
    .unwrap();

    let records = log.read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].query, "c");
    assert_eq!(records[1].response, "d");
}

#[test]
fn test_interaction_log_transcript_is_json_list() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::in_dir(dir.path());
    log.append(&InteractionRecord::new("q", "r")).unwrap();

    let transcript = log.transcript().unwrap();
    let parsed: Vec<InteractionRecord> = serde_json::from_str(&transcript).unwrap();
    assert_eq!(parsed, vec![InteractionRecord::new("q", "r")]);
}

#[test]
fn test_interaction_log_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let log = InteractionLog::new(dir.path().join("nested").join("state").join("log.json"));

    log.reset().unwrap();

    assert!(log.path().exists());
}

#[cfg(unix)]
#[test]
fn test_interaction_log_unwritable_directory_is_storage_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    let log = InteractionLog::in_dir(&locked);
    log.append(&InteractionRecord::new("kept", "safe")).unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
    let result = log.append(&InteractionRecord::new("lost", "write"));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

    // Running as root ignores directory permissions
    if result.is_err() {
        assert!(matches!(result, Err(StorageError::Write { .. })));
        assert_eq!(
            log.read_all().unwrap(),
            vec![InteractionRecord::new("kept", "safe")]
        );
    }
}

// ============================================================
// PromptLedger
// ============================================================

#[test]
fn test_ledger_round_trip_preserves_order() {
    let dir = TempDir::new().unwrap();
    let ledger = PromptLedger::in_dir(dir.path());

    let first = LedgerEntry::new("prompt v1", vec!["clarified tone".into()]);
    let second = LedgerEntry::new(
        "prompt v2",
        vec!["asked for order id".into(), "shorter replies".into()],
    );
    ledger.append(&first).unwrap();
    ledger.append(&second).unwrap();

    assert_eq!(ledger.read_all().unwrap(), vec![first, second.clone()]);
    assert_eq!(ledger.latest().unwrap(), Some(second));
}

#[test]
fn test_ledger_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let ledger = PromptLedger::in_dir(dir.path());

    assert!(ledger.read_all().unwrap().is_empty());
    assert_eq!(ledger.latest().unwrap(), None);
}

#[test]
fn test_ledger_wraps_single_object_before_appending() {
    let dir = TempDir::new().unwrap();
    let ledger = PromptLedger::in_dir(dir.path());
    fs::write(
        ledger.path(),
        r#"{"new_prompt": "legacy prompt", "improvements": ["old note"]}"#,
    )
    .unwrap();

    ledger
        .append(&LedgerEntry::new("fresh prompt", vec![]))
        .unwrap();

    let entries = ledger.read_all().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].new_prompt, "legacy prompt");
    assert_eq!(entries[0].improvements, vec!["old note".to_string()]);
    assert_eq!(entries[1].new_prompt, "fresh prompt");
}

#[test]
fn test_ledger_keeps_invalid_json_as_text() {
    let dir = TempDir::new().unwrap();
    let ledger = PromptLedger::in_dir(dir.path());
    fs::write(ledger.path(), "not json at all").unwrap();

    ledger
        .append(&LedgerEntry::new("fresh prompt", vec!["x".into()]))
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(ledger.path()).unwrap()).unwrap();
    let items = raw.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], serde_json::json!("not json at all"));

    // Only the well-formed entry is returned as a ledger entry
    let entries = ledger.read_all().unwrap();
    assert_eq!(entries, vec![LedgerEntry::new("fresh prompt", vec!["x".into()])]);

    // The raw view keeps the coerced text alongside it
    let raw = ledger.read_raw().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0], serde_json::json!("not json at all"));
    assert_eq!(raw[1]["new_prompt"], serde_json::json!("fresh prompt"));
}

#[test]
fn test_ledger_null_improvements_read_as_empty() {
    let dir = TempDir::new().unwrap();
    let ledger = PromptLedger::in_dir(dir.path());
    fs::write(
        ledger.path(),
        r#"[{"new_prompt": "p", "improvements": null}]"#,
    )
    .unwrap();

    let entries = ledger.read_all().unwrap();
    assert_eq!(entries, vec![LedgerEntry::new("p", vec![])]);
}

// ============================================================
// CheckpointFile
// ============================================================

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    cycle: usize,
    prompt: String,
}

#[test]
fn test_checkpoint_save_load_clear() {
    let dir = TempDir::new().unwrap();
    let checkpoint = CheckpointFile::in_dir(dir.path());
    assert_eq!(checkpoint.load::<Snapshot>().unwrap(), None);

    let snapshot = Snapshot {
        cycle: 3,
        prompt: "be helpful".into(),
    };
    checkpoint.save(&snapshot).unwrap();
    assert!(checkpoint.exists());
    assert_eq!(checkpoint.load::<Snapshot>().unwrap(), Some(snapshot));

    checkpoint.clear().unwrap();
    assert!(!checkpoint.exists());
    checkpoint.clear().unwrap();
}

#[test]
fn test_checkpoint_corruption_is_an_error() {
    let dir = TempDir::new().unwrap();
    let checkpoint = CheckpointFile::in_dir(dir.path());
    fs::write(checkpoint.path(), "{").unwrap();

    let result = checkpoint.load::<Snapshot>();
    assert!(matches!(result, Err(StorageError::Checkpoint { .. })));
}
