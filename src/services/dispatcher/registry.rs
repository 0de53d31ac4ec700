//! Per-tag tracker storage with idle bookkeeping

use crate::domain::types::TagId;
use crate::services::breach_tracker::BreachTracker;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};

struct TagEntry {
    tracker: BreachTracker,
    last_seen: Instant,
}

/// Trackers keyed by tag, created lazily on first sighting
#[derive(Default)]
pub struct TagRegistry {
    entries: FxHashMap<TagId, TagEntry>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the tracker for a tag, creating it with `create` if unseen.
    /// Marks the tag as seen at `now`. The flag is true when a tracker was created.
    pub fn get_or_insert_with<F>(&mut self, tag_id: TagId, now: Instant, create: F) -> (&mut BreachTracker, bool)
    where
        F: FnOnce() -> BreachTracker,
    {
        let mut created = false;
        let entry = self.entries.entry(tag_id).or_insert_with(|| {
            created = true;
            TagEntry { tracker: create(), last_seen: now }
        });
        entry.last_seen = now;
        (&mut entry.tracker, created)
    }

    pub fn get(&self, tag_id: TagId) -> Option<&BreachTracker> {
        self.entries.get(&tag_id).map(|entry| &entry.tracker)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove trackers not seen for longer than `timeout`
    pub fn remove_idle(&mut self, now: Instant, timeout: Duration) -> Vec<BreachTracker> {
        let idle: Vec<TagId> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) > timeout)
            .map(|(tag_id, _)| *tag_id)
            .collect();

        idle.into_iter()
            .filter_map(|tag_id| self.entries.remove(&tag_id))
            .map(|entry| entry.tracker)
            .collect()
    }

    /// Remove every tracker
    pub fn drain(&mut self) -> Vec<BreachTracker> {
        self.entries.drain().map(|(_, entry)| entry.tracker).collect()
    }
}
