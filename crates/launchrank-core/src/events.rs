//! JSON-lines event sink and the interaction log read back from it.
//!
//! Each topic is a file `<events_dir>/<topic>.jsonl`. The interaction log is the
//! `RunPerformed` topic; every line is one `(key, previous_key, timestamp)`.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::traits::{EventLog, EventSink};
use crate::types::InteractionEvent;

pub const RUN_PERFORMED_TOPIC: &str = "RunPerformed";
pub const REGISTER_EXECUTED_TOPIC: &str = "RegisterExecuted";

pub fn topic_path(dir: &Path, topic: &str) -> PathBuf {
    dir.join(format!("{topic}.jsonl"))
}

pub struct JsonlEventSink {
    dir: PathBuf,
}

impl JsonlEventSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
}

impl EventSink for JsonlEventSink {
    fn publish(&self, topic: &str, message: &serde_json::Value) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
        let path = topic_path(&self.dir, topic);
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        // One write per line keeps concurrent appenders from interleaving.
        let mut file = OpenOptions::new().create(true).append(true).open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(topic, file = %path.display(), "published event");
        Ok(())
    }
}

pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    /// The `RunPerformed` log inside an events directory.
    pub fn in_dir(dir: &Path) -> Self { Self::new(topic_path(dir, RUN_PERFORMED_TOPIC)) }

    pub fn path(&self) -> &Path { &self.path }
}

impl EventLog for JsonlEventLog {
    fn events(&self) -> Result<Vec<InteractionEvent>> {
        if !self.path.exists() { return Ok(Vec::new()); }
        let file = fs::File::open(&self.path).with_context(|| format!("open {}", self.path.display()))?;
        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            match serde_json::from_str::<InteractionEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(line = line_no + 1, error = %e, "skipping malformed interaction event");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, file = %self.path.display(), "interaction log contained malformed lines");
        }
        Ok(events)
    }
}

/// Appends `RunPerformed` events, chaining each to the previously used key.
pub struct RunRecorder<L: EventLog, S: EventSink> {
    log: L,
    sink: S,
}

impl<L: EventLog, S: EventSink> RunRecorder<L, S> {
    pub fn new(log: L, sink: S) -> Self { Self { log, sink } }

    pub fn record(&self, key: &str, at: DateTime<Utc>) -> Result<InteractionEvent> {
        let previous_key = self.log.latest_used_keys(1)?.into_iter().next();
        let event = InteractionEvent { key: key.to_string(), previous_key, timestamp: at };
        self.sink.publish(RUN_PERFORMED_TOPIC, &serde_json::to_value(&event)?)?;
        Ok(event)
    }
}

impl RunRecorder<JsonlEventLog, JsonlEventSink> {
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(JsonlEventLog::in_dir(dir), JsonlEventSink::new(dir))
    }
}
