use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::recognition::domain::descriptor::Descriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CacheKey {
    Track(u32),
    Descriptor(u64),
}

#[derive(Clone, Debug)]
struct CacheEntry {
    descriptor: Descriptor,
    resolved_name: String,
    inserted_at: Instant,
    last_used: u64,
}

/// Bounded store of resolved descriptors.
///
/// Entries are keyed both by the track that resolved them and by the
/// descriptor's coarse hash, so a face that reappears under a new track id
/// within `reuse_window` can be named without another match call. When full,
/// the least recently used entry is evicted.
pub struct EmbeddingCache {
    entries: HashMap<CacheKey, CacheEntry>,
    capacity: usize,
    reuse_window: Duration,
    max_distance: f32,
    clock: u64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, reuse_window: Duration, max_distance: f32) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            reuse_window,
            max_distance,
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name previously resolved for `track_id`, if still cached.
    pub fn lookup_track(&mut self, track_id: u32) -> Option<String> {
        let tick = self.tick();
        self.entries.get_mut(&CacheKey::Track(track_id)).map(|e| {
            e.last_used = tick;
            e.resolved_name.clone()
        })
    }

    /// Name of the closest descriptor resolved within the reuse window and
    /// under the distance threshold.
    pub fn lookup_similar(&mut self, descriptor: &Descriptor, now: Instant) -> Option<String> {
        let tick = self.tick();
        let window = self.reuse_window;
        let max_distance = self.max_distance;

        let best = self
            .entries
            .iter_mut()
            .filter(|(key, e)| {
                matches!(key, CacheKey::Descriptor(_))
                    && now.saturating_duration_since(e.inserted_at) <= window
            })
            .map(|(_, e)| (e.descriptor.distance(descriptor), e))
            .filter(|(d, _)| *d < max_distance)
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))?;

        let (_, entry) = best;
        entry.last_used = tick;
        Some(entry.resolved_name.clone())
    }

    /// Records a successful recognition under both keys.
    pub fn insert(&mut self, track_id: u32, descriptor: Descriptor, name: &str, now: Instant) {
        let hash_key = CacheKey::Descriptor(descriptor.coarse_hash());
        for key in [CacheKey::Track(track_id), hash_key] {
            let tick = self.tick();
            self.entries.insert(
                key,
                CacheEntry {
                    descriptor: descriptor.clone(),
                    resolved_name: name.to_string(),
                    inserted_at: now,
                    last_used: tick,
                },
            );
        }
        while self.entries.len() > self.capacity {
            self.evict_lru();
        }
    }

    /// Drops the track-keyed entry once its track has expired. The
    /// descriptor-keyed entry stays for cross-track reuse.
    pub fn evict_track(&mut self, track_id: u32) {
        self.entries.remove(&CacheKey::Track(track_id));
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| *k)
        {
            self.entries.remove(&key);
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
