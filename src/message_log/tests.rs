use super::*;

fn entry(id: &str, status: MessageStatus) -> LogEntry {
    LogEntry::new(id, "+15551234567", "hi santa", "Santa", status)
}

#[test]
fn test_keeps_last_hundred() {
    let log = MessageLog::in_memory();
    for i in 0..(MAX_LOG_ENTRIES + 25) {
        log.record(entry(&format!("SM{i}"), MessageStatus::Queued));
    }
    let entries = log.entries();
    assert_eq!(entries.len(), MAX_LOG_ENTRIES);
    assert_eq!(entries[0].message_id, format!("SM{}", MAX_LOG_ENTRIES + 24));
    assert_eq!(entries.last().unwrap().message_id, "SM25");
}

#[test]
fn test_update_status() {
    let log = MessageLog::in_memory();
    log.record(entry("SM1", MessageStatus::Queued));
    assert!(log.update_status("SM1", MessageStatus::Displaying));
    let e = &log.entries()[0];
    assert_eq!(e.status, MessageStatus::Displaying);
    assert!(e.status_updated.is_some());
    assert!(!log.update_status("SM404", MessageStatus::Displayed));
}

#[test]
fn test_persist_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("received_messages.json");
    {
        let log = MessageLog::open(&path);
        log.record(entry("SM1", MessageStatus::Profanity));
    }
    let log = MessageLog::open(&path);
    assert_eq!(log.entries().len(), 1);
    assert_eq!(log.entries()[0].status, MessageStatus::Profanity);

    log.clear();
    assert!(MessageLog::open(&path).entries().is_empty());
}

#[test]
fn test_corrupt_log_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("received_messages.json");
    std::fs::write(&path, "{{{").unwrap();
    let log = MessageLog::open(&path);
    assert!(log.entries().is_empty());
    log.record(entry("SM1", MessageStatus::Queued));
    assert_eq!(MessageLog::open(&path).entries().len(), 1);
}

#[test]
fn test_status_from_reason_serializes_snake_case() {
    let status = MessageStatus::from(Reason::NotWhitelisted);
    assert_eq!(serde_json::to_value(status).unwrap(), "not_whitelisted");
    assert_eq!(MessageStatus::from(Reason::Accepted), MessageStatus::Queued);
    assert_eq!(MessageStatus::from(Reason::PhoneBlocked), MessageStatus::Blocked);
}
