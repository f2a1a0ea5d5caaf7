//! Bounded in-memory tier for recently touched embeddings.
//!
//! A coarse mutex guards the whole map: entries are small and operations
//! are brief, so finer-grained locking buys nothing here. Access recency
//! uses a monotonic counter rather than wall-clock time so eviction order
//! is deterministic even under coarse clocks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct HotEntry {
    embedding: Arc<Vec<f32>>,
    last_access: u64,
}

/// Bounded hot map with oldest-access eviction.
///
/// Not a segmented LRU: on insert of a new key at capacity, the entry with
/// the globally oldest access stamp is evicted. Promotion on read refreshes
/// the stamp, which is all the recency this tier needs.
#[derive(Debug)]
pub(crate) struct HotTier {
    capacity: usize,
    clock: AtomicU64,
    map: Mutex<HashMap<String, HotEntry>>,
}

impl HotTier {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: AtomicU64::new(0),
            map: Mutex::new(HashMap::with_capacity(capacity.min(1024))),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a key, refreshing its access stamp on hit.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        let stamp = self.tick();
        let mut map = self.map.lock();
        let entry = map.get_mut(key)?;
        entry.last_access = stamp;
        Some(Arc::clone(&entry.embedding))
    }

    /// Insert or refresh a key, evicting the oldest-accessed entry when a
    /// new key would exceed capacity.
    pub(crate) fn insert(&self, key: &str, embedding: Arc<Vec<f32>>) {
        if self.capacity == 0 {
            return;
        }
        let stamp = self.tick();
        let mut map = self.map.lock();

        if let Some(entry) = map.get_mut(key) {
            entry.embedding = embedding;
            entry.last_access = stamp;
            return;
        }

        if map.len() >= self.capacity {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                map.remove(&oldest);
            }
        }

        map.insert(
            key.to_string(),
            HotEntry {
                embedding,
                last_access: stamp,
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.map.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(v: f32) -> Arc<Vec<f32>> {
        Arc::new(vec![v; 4])
    }

    #[test]
    fn test_eviction_bound() {
        let tier = HotTier::new(3);
        tier.insert("a", vec_of(1.0));
        tier.insert("b", vec_of(2.0));
        tier.insert("c", vec_of(3.0));
        tier.insert("d", vec_of(4.0));

        assert_eq!(tier.len(), 3);
        // "a" had the oldest access stamp
        assert!(tier.get("a").is_none());
        assert!(tier.get("b").is_some());
        assert!(tier.get("d").is_some());
    }

    #[test]
    fn test_read_refreshes_recency() {
        let tier = HotTier::new(2);
        tier.insert("a", vec_of(1.0));
        tier.insert("b", vec_of(2.0));

        // Touch "a" so "b" becomes the eviction victim
        assert!(tier.get("a").is_some());
        tier.insert("c", vec_of(3.0));

        assert!(tier.get("a").is_some());
        assert!(tier.get("b").is_none());
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn test_reinsert_existing_key_does_not_evict() {
        let tier = HotTier::new(2);
        tier.insert("a", vec_of(1.0));
        tier.insert("b", vec_of(2.0));
        tier.insert("a", vec_of(9.0));

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get("a").unwrap()[0], 9.0);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let tier = HotTier::new(0);
        tier.insert("a", vec_of(1.0));
        assert_eq!(tier.len(), 0);
        assert!(tier.get("a").is_none());
    }
}
