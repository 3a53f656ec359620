//! Aggregation of raw interaction events into labelled transition rows.
use chrono::Duration;
use std::collections::BTreeMap;

use launchrank_core::config::TrainingSettings;
use launchrank_core::types::{Dataset, InteractionEvent, TrainingExample};

/// How a `(key, previous_key)` transition's events turn into a label.
///
/// Each event weighs `0.5^(age / half_life)`, with `age` measured back from the
/// newest transition event in the log. Per-pair sums are divided by the
/// largest sum, so labels fall in `(0, 1]`. Without a half-life every event
/// weighs 1 and labels are `count / max_count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPolicy {
    pub half_life: Option<Duration>,
}

impl LabelPolicy {
    pub fn counts() -> Self { Self { half_life: None } }

    pub fn recency_weighted(half_life_days: f64) -> Self {
        let seconds = (half_life_days * 86_400.0).round() as i64;
        if seconds <= 0 { return Self::counts(); }
        Self { half_life: Some(Duration::seconds(seconds)) }
    }

    fn weight(&self, age: Duration) -> f64 {
        match self.half_life {
            None => 1.0,
            Some(hl) => {
                let age_s = age.num_milliseconds().max(0) as f64 / 1000.0;
                let hl_s = hl.num_milliseconds() as f64 / 1000.0;
                0.5f64.powf(age_s / hl_s)
            }
        }
    }
}

impl Default for LabelPolicy {
    fn default() -> Self { Self::recency_weighted(90.0) }
}

impl From<&TrainingSettings> for LabelPolicy {
    fn from(settings: &TrainingSettings) -> Self {
        settings.half_life_days.map(Self::recency_weighted).unwrap_or_else(Self::counts)
    }
}

/// Collapse events into one row per `(key, previous_key)` pair, sorted by
/// `(key, previous_key)`. Cold-start events (no previous key) are dropped.
pub fn aggregate_events(events: &[InteractionEvent], policy: &LabelPolicy) -> Dataset {
    let transitions: Vec<(&InteractionEvent, &str)> = events
        .iter()
        .filter_map(|e| e.previous_key.as_deref().map(|p| (e, p)))
        .collect();
    let dropped = events.len() - transitions.len();
    if dropped > 0 {
        tracing::debug!(dropped, "dropping cold-start events without previous key");
    }
    let Some(newest) = transitions.iter().map(|(e, _)| e.timestamp).max() else {
        return Dataset::default();
    };

    let mut pairs: BTreeMap<(String, String), (u32, f64)> = BTreeMap::new();
    for (event, previous) in &transitions {
        let slot = pairs.entry((event.key.clone(), (*previous).to_string())).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += policy.weight(newest - event.timestamp);
    }

    let max_weight = pairs.values().map(|(_, w)| *w).fold(0.0f64, f64::max);
    let rows = pairs
        .into_iter()
        .map(|((key, previous_key), (count, weight))| TrainingExample {
            key,
            previous_key,
            count,
            label: if max_weight > 0.0 { (weight / max_weight) as f32 } else { 0.0 },
        })
        .collect::<Vec<_>>();
    tracing::info!(events = events.len(), rows = rows.len(), "aggregated interaction events");
    Dataset { rows }
}
