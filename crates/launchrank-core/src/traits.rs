use crate::types::{EntryCatalog, EntryKey, InteractionEvent};

/// Maps text (an entry key) to a fixed-size vector.
///
/// Implementations must be deterministic for a given `embedder_id` and must
/// return vectors of exactly `dim()` elements for any input, including empty
/// and never-seen strings.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `hashed:xxh64:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// The entry configuration source.
pub trait EntryProvider: Send + Sync {
    fn load_config(&self) -> anyhow::Result<EntryCatalog>;
    /// Re-read from the backing store, bypassing anything cached.
    fn reload(&self) -> anyhow::Result<EntryCatalog>;
}

/// Append-only usage history, read as a sequence of transitions.
pub trait EventLog: Send + Sync {
    fn events(&self) -> anyhow::Result<Vec<InteractionEvent>>;

    /// Most recently used keys, newest first, without repeats.
    fn latest_used_keys(&self, n: usize) -> anyhow::Result<Vec<EntryKey>> {
        let mut events = self.events()?;
        // Stable sort: among equal timestamps the later-appended event is newer.
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let mut keys: Vec<EntryKey> = Vec::with_capacity(n);
        for event in events.into_iter().rev() {
            if keys.len() >= n { break; }
            if !keys.contains(&event.key) { keys.push(event.key); }
        }
        Ok(keys)
    }
}

impl EventLog for Vec<InteractionEvent> {
    fn events(&self) -> anyhow::Result<Vec<InteractionEvent>> { Ok(self.clone()) }
}

/// Fire-and-forget publication of JSON messages to a named topic.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, message: &serde_json::Value) -> anyhow::Result<()>;
}
