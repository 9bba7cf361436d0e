use std::collections::HashMap;

use crate::types::DedupKey;

/// Time-windowed suppression of repeated failures.
///
/// Maps a [`DedupKey`] to the time it was last accepted. Entries older
/// than the window are treated as absent on lookup and swept after every
/// acceptance. Lives exactly as long as the engine that owns it.
#[derive(Debug, Default)]
pub struct DedupCache {
    last_seen: HashMap<DedupKey, u64>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an observation with `key` seen at `now` (ms) is new.
    ///
    /// A `window` of zero disables deduplication: everything is accepted and
    /// nothing is recorded. Otherwise the key is accepted when unseen or
    /// last accepted at least `window` ms ago, and `now` is recorded.
    pub fn should_accept(&mut self, key: &DedupKey, now: u64, window: u64) -> bool {
        if window == 0 {
            return true;
        }

        if let Some(&last) = self.last_seen.get(key) {
            if now.saturating_sub(last) < window {
                return false;
            }
        }

        self.last_seen.insert(key.clone(), now);
        self.sweep(now, window);
        true
    }

    /// Remove every entry that is already outside the window.
    pub fn sweep(&mut self, now: u64, window: u64) {
        self.last_seen
            .retain(|_, &mut last| now.saturating_sub(last) < window);
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }
}
