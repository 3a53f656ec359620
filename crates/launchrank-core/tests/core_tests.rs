use std::fs;
use tempfile::TempDir;

use chrono::{Duration, TimeZone, Utc};
use launchrank_core::capture::EntryCapture;
use launchrank_core::entries::{TomlEntryStore, CAPTURED_FILE};
use launchrank_core::error::Error;
use launchrank_core::events::{topic_path, JsonlEventLog, JsonlEventSink, RunRecorder, REGISTER_EXECUTED_TOPIC};
use launchrank_core::traits::{EntryProvider, EventLog};
use launchrank_core::types::{EntryKind, InteractionEvent};

#[test]
fn load_entries_across_files_in_sorted_order() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("b.toml"), "[\"open github\"]\nurl = \"https://github.com\"\n").unwrap();
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(
        dir.join("a.toml"),
        "[ls]\ncmd = \"ls -la\"\ntags = [\"shell\"]\n\n[greeting]\nsnippet = \"hello\"\ndescription = \"say hi\"\n",
    )
    .unwrap();
    fs::write(dir.join("nested/c.toml"), "[notes]\nfile = \"/tmp/notes.md\"\n").unwrap();
    fs::write(dir.join("ignored.txt"), "not an entry file").unwrap();

    let store = TomlEntryStore::new(dir);
    let catalog = store.load_config().expect("load");

    assert_eq!(catalog.keys(), vec!["greeting", "ls", "open github", "notes"]);
    assert_eq!(catalog.get("ls").unwrap().kind, EntryKind::Cmd);
    assert!(catalog.get("ls").unwrap().tags.contains("shell"));
    assert_eq!(catalog.get("open github").unwrap().kind, EntryKind::Url);
    assert_eq!(catalog.get("notes").unwrap().kind, EntryKind::File);
    assert_eq!(catalog.get("greeting").unwrap().description.as_deref(), Some("say hi"));
}

#[test]
fn duplicate_keys_across_files_are_rejected() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.toml"), "[ls]\ncmd = \"ls\"\n").unwrap();
    fs::write(tmp.path().join("b.toml"), "[ls]\ncmd = \"ls -la\"\n").unwrap();

    let err = TomlEntryStore::new(tmp.path()).load_config().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateKey { key, .. }) if key == "ls"));
}

#[test]
fn missing_directory_is_configuration_unavailable() {
    let tmp = TempDir::new().unwrap();
    let err = TomlEntryStore::new(tmp.path().join("nope")).load_config().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ConfigurationUnavailable(_))));
}

#[test]
fn reload_sees_new_files_while_load_config_is_cached() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.toml"), "[ls]\ncmd = \"ls\"\n").unwrap();
    let store = TomlEntryStore::new(tmp.path());
    assert_eq!(store.load_config().unwrap().len(), 1);

    fs::write(tmp.path().join("b.toml"), "[pwd]\ncmd = \"pwd\"\n").unwrap();
    assert_eq!(store.load_config().unwrap().len(), 1, "cached until reload");
    assert_eq!(store.reload().unwrap().len(), 2);
}

#[test]
fn capture_writes_entry_and_publishes_event() {
    let tmp = TempDir::new().unwrap();
    let entries_dir = tmp.path().join("entries");
    let events_dir = tmp.path().join("events");
    fs::create_dir_all(&entries_dir).unwrap();

    let store = TomlEntryStore::new(&entries_dir);
    let sink = JsonlEventSink::new(&events_dir);
    let capture = EntryCapture::new(&store).with_sink(&sink);
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

    capture.register("docs", None, "https://docs.rs", now).expect("register url");
    let key = capture.register_anonymous("line one\nline two", now).expect("anonymous");

    assert!(entries_dir.join(CAPTURED_FILE).exists());
    let catalog = store.load_config().unwrap();
    assert_eq!(catalog.get("docs").unwrap().kind, EntryKind::Url);
    assert_eq!(catalog.get("docs").unwrap().created_at, Some(now));
    let snippet = catalog.get(&key).unwrap();
    assert_eq!(snippet.kind, EntryKind::Snippet);
    assert_eq!(snippet.value, "line one\\nline two");

    let published = fs::read_to_string(topic_path(&events_dir, REGISTER_EXECUTED_TOPIC)).unwrap();
    assert_eq!(published.lines().count(), 2);

    let err = capture.register("docs", None, "again", now).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateKey { .. })));
    let err = capture.register("blank", None, "   ", now).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyContent)));
}

#[test]
fn capture_creates_missing_entries_directory() {
    let tmp = TempDir::new().unwrap();
    let entries_dir = tmp.path().join("entries");
    let store = TomlEntryStore::new(&entries_dir);
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

    EntryCapture::new(&store).register("docs", None, "https://docs.rs", now).expect("register on fresh install");

    assert!(entries_dir.join(CAPTURED_FILE).exists());
    assert_eq!(store.load_config().unwrap().keys(), vec!["docs"]);
}

#[cfg(unix)]
#[test]
fn unreadable_walk_entry_fails_the_whole_catalog() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.toml"), "[ls]\ncmd = \"ls\"\n").unwrap();
    fs::create_dir_all(tmp.path().join("nested")).unwrap();
    std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("nested/dangling.toml")).unwrap();

    let err = TomlEntryStore::new(tmp.path()).load_config().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ConfigurationUnavailable(msg)) if msg.contains("dangling")));
}

#[test]
fn recorder_chains_previous_key_and_log_reads_back() {
    let tmp = TempDir::new().unwrap();
    let recorder = RunRecorder::in_dir(tmp.path());
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let first = recorder.record("ls", t0).unwrap();
    let second = recorder.record("pwd", t0 + Duration::seconds(5)).unwrap();
    recorder.record("ls", t0 + Duration::seconds(10)).unwrap();

    assert_eq!(first.previous_key, None);
    assert_eq!(second.previous_key.as_deref(), Some("ls"));

    let log = JsonlEventLog::in_dir(tmp.path());
    let events = log.events().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].previous_key.as_deref(), Some("pwd"));
    assert_eq!(log.latest_used_keys(10).unwrap(), vec!["ls".to_string(), "pwd".to_string()]);
}

#[test]
fn malformed_log_lines_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("RunPerformed.jsonl");
    let good = serde_json::to_string(&InteractionEvent {
        key: "a".into(),
        previous_key: Some("b".into()),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    })
    .unwrap();
    fs::write(&path, format!("{good}\nnot json\n\n{good}\n")).unwrap();

    let events = JsonlEventLog::new(&path).events().unwrap();
    assert_eq!(events.len(), 2);
}
