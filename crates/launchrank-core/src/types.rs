//! Domain types shared by the dataset builder, the model and the serving path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

pub type EntryKey = String;

/// What an entry's value means, decided once when the entry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Cmd,
    Url,
    File,
    Snippet,
    Unknown,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cmd => "Cmd",
            Self::Url => "Url",
            Self::File => "File",
            Self::Snippet => "Snippet",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EntryKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cmd" | "cli_cmd" => Ok(Self::Cmd),
            "url" => Ok(Self::Url),
            "file" => Ok(Self::File),
            "snippet" => Ok(Self::Snippet),
            other => Err(crate::error::Error::InvalidConfig(format!("unknown entry kind '{other}'"))),
        }
    }
}

/// The on-disk shape of an entry. Exactly which of the value fields is set
/// determines the [`EntryKind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
}

impl RawEntry {
    /// Build the raw form for a value of a given kind.
    pub fn with_value(kind: EntryKind, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match kind {
            EntryKind::Cmd => Self { cmd: value, ..Self::default() },
            EntryKind::Url => Self { url: value, ..Self::default() },
            EntryKind::File => Self { file: value, ..Self::default() },
            EntryKind::Snippet | EntryKind::Unknown => Self { snippet: value, ..Self::default() },
        }
    }
}

/// A stored key → content mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: EntryKey,
    pub kind: EntryKind,
    pub value: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub position: Option<u64>,
}

impl Entry {
    /// Command wins over snippet, snippet over file, file over url.
    pub fn from_raw(key: impl Into<String>, raw: RawEntry) -> Self {
        let (kind, value) = if let Some(cmd) = raw.cli_cmd.or(raw.cmd) {
            (EntryKind::Cmd, cmd)
        } else if let Some(snippet) = raw.snippet {
            (EntryKind::Snippet, snippet)
        } else if let Some(file) = raw.file {
            (EntryKind::File, file)
        } else if let Some(url) = raw.url {
            (EntryKind::Url, url)
        } else {
            (EntryKind::Unknown, String::new())
        };
        Self {
            key: key.into(),
            kind,
            value,
            description: raw.description,
            tags: raw.tags.into_iter().collect(),
            created_at: raw.created_at,
            position: raw.position,
        }
    }

    pub fn to_raw(&self) -> RawEntry {
        RawEntry {
            description: self.description.clone(),
            tags: self.tags.iter().cloned().collect(),
            created_at: self.created_at,
            position: self.position,
            ..RawEntry::with_value(self.kind, self.value.clone())
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.created_at.map(|c| now - c)
    }

    /// Plain-text rendering of the fields the search preview shows.
    pub fn preview(&self, now: DateTime<Utc>) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(&self.value);
        out.push_str("\n\n");
        out.push_str(&format!("Key: {}\n", self.key));
        out.push_str(&format!("Type: {}\n", self.kind));
        if let Some(description) = &self.description {
            out.push_str(&format!("Description: {description}\n"));
        }
        if let Some(position) = self.position {
            out.push_str(&format!("Position: {position}\n"));
        }
        if let (Some(created), Some(age)) = (self.created_at, self.age(now)) {
            out.push_str(&format!("Created at: {created}\n"));
            out.push_str(&format!("Entry Age: {}\n", format_age(age)));
        }
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            out.push_str(&format!("Tags: {}\n", tags.join(" ")));
        }
        out
    }
}

fn format_age(age: chrono::Duration) -> String {
    let days = age.num_days();
    let hours = age.num_hours() - days * 24;
    let minutes = age.num_minutes() - age.num_hours() * 60;
    format!("{days} days, {hours}h {minutes}m")
}

/// Every known entry in load order, plus a key index.
#[derive(Debug, Clone, Default)]
pub struct EntryCatalog {
    entries: Vec<Entry>,
    index: HashMap<EntryKey, usize>,
}

impl EntryCatalog {
    /// Later duplicates are rejected by the store before this point; here the
    /// first occurrence wins.
    pub fn new(entries: Vec<Entry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if index.contains_key(&entry.key) { continue; }
            index.insert(entry.key.clone(), kept.len());
            kept.push(entry);
        }
        Self { entries: kept, index }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[Entry] { &self.entries }
    pub fn get(&self, key: &str) -> Option<&Entry> { self.index.get(key).map(|&i| &self.entries[i]) }
    pub fn contains(&self, key: &str) -> bool { self.index.contains_key(key) }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }
}

/// An observed transition from using `previous_key` to using `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub key: EntryKey,
    #[serde(default)]
    pub previous_key: Option<EntryKey>,
    pub timestamp: DateTime<Utc>,
}

/// One aggregated `(key, previous_key)` transition with its training label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub key: EntryKey,
    pub previous_key: EntryKey,
    /// Raw number of events that collapsed into this row.
    pub count: u32,
    /// Normalised recency-weighted frequency in (0, 1].
    pub label: f32,
}

/// Rows are unique per `(key, previous_key)` and sorted by that pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub rows: Vec<TrainingExample>,
}

impl Dataset {
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn labels(&self) -> Vec<f32> {
        self.rows.iter().map(|r| r.label).collect()
    }

    /// Every key appearing on either side of a transition, sorted.
    pub fn unique_keys(&self) -> BTreeSet<EntryKey> {
        let mut keys = BTreeSet::new();
        for row in &self.rows {
            keys.insert(row.key.clone());
            keys.insert(row.previous_key.clone());
        }
        keys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_mse: f32,
    pub train_mae: f32,
    pub test_mse: f32,
    pub test_mae: f32,
}

impl TrainingMetrics {
    pub fn is_finite(&self) -> bool {
        [self.train_mse, self.train_mae, self.test_mse, self.test_mae].iter().all(|v| v.is_finite())
    }
}

/// Immutable description of a logged model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub run_id: String,
    pub embedder_id: String,
    pub feature_dimension: usize,
    pub hidden_units: usize,
    pub metrics: TrainingMetrics,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: EntryKey,
    pub score: f32,
}

/// All known keys ordered by non-increasing score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub entries: Vec<RankedEntry>,
}

impl RankingResult {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// One key per line, the serialization served to the search UI.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.key);
            out.push('\n');
        }
        out
    }
}
