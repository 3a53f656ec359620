//! Registering new entries from captured text (clipboard, stdin, API).
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::entries::TomlEntryStore;
use crate::error::Error;
use crate::events::REGISTER_EXECUTED_TOPIC;
use crate::traits::EventSink;
use crate::types::{EntryKind, RawEntry};

pub struct EntryCapture<'a> {
    store: &'a TomlEntryStore,
    sink: Option<&'a dyn EventSink>,
}

impl<'a> EntryCapture<'a> {
    pub fn new(store: &'a TomlEntryStore) -> Self { Self { store, sink: None } }

    /// Also publish a `RegisterExecuted` event for each stored entry.
    pub fn with_sink(mut self, sink: &'a dyn EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Store `content` under `key`. When `kind` is not given it is inferred
    /// from the content.
    pub fn register(&self, key: &str, kind: Option<EntryKind>, content: &str, now: DateTime<Utc>) -> Result<RawEntry> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidConfig("entry key must not be empty".into()).into());
        }
        let content = sanitize(content);
        if content.is_empty() {
            return Err(Error::EmptyContent.into());
        }
        let kind = kind.unwrap_or_else(|| infer_kind(&content));
        let raw = RawEntry { created_at: Some(now), ..RawEntry::with_value(kind, content.clone()) };
        self.store.insert(key, raw.clone())?;

        if let Some(sink) = self.sink {
            let event = serde_json::json!({ "key": key, "content": content, "kind": kind.to_string() });
            // The entry is already stored; a lost event only costs telemetry.
            if let Err(e) = sink.publish(REGISTER_EXECUTED_TOPIC, &event) {
                tracing::warn!(error = %e, key, "failed to publish RegisterExecuted");
            }
        }
        Ok(raw)
    }

    /// Store a snippet under a generated, timestamped key.
    pub fn register_anonymous(&self, content: &str, now: DateTime<Utc>) -> Result<String> {
        let key = anonymous_key(now);
        self.register(&key, Some(EntryKind::Snippet), content, now)?;
        Ok(key)
    }
}

pub fn anonymous_key(now: DateTime<Utc>) -> String {
    format!("no key {}", now.format("%Y %m %d %H %M %S"))
}

/// Escape newlines and drop other control characters before content is stored.
pub fn sanitize(content: &str) -> String {
    content
        .trim()
        .replace("\r\n", "\n")
        .replace('\n', "\\n")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

pub fn infer_kind(content: &str) -> EntryKind {
    let trimmed = content.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        EntryKind::Url
    } else if !trimmed.contains("\\n") && Path::new(trimmed).is_absolute() && Path::new(trimmed).exists() {
        EntryKind::File
    } else {
        EntryKind::Snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_escapes_newlines_and_strips_controls() {
        assert_eq!(sanitize("  a\nb\r\nc\u{7}  "), "a\\nb\\nc");
    }

    #[test]
    fn infers_url_and_snippet() {
        assert_eq!(infer_kind("https://example.com"), EntryKind::Url);
        assert_eq!(infer_kind("just some words"), EntryKind::Snippet);
    }

    #[test]
    fn anonymous_key_is_timestamped() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z").unwrap().with_timezone(&Utc);
        assert_eq!(anonymous_key(now), "no key 2024 03 05 07 08 09");
    }
}
