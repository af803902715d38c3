//! Caches for relationship path resolution.
//!
//! Both caches are keyed by plain values compared structurally, so two call
//! sites passing equal filter text share an entry. Every access takes the
//! cache's single mutex for the duration of that one `get`/`put` call only.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::path::{RelatedClassPath, RelationshipDirection};
use crate::catalog::ClassId;

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Get eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

struct CacheEntry<V> {
    value: Arc<V>,
    last_used: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    tick: u64,
}

/// A mutex-guarded map from structural keys to shared, immutable results.
///
/// Without a capacity entries live as long as the cache. With one, the least
/// recently used entry is evicted when a new key would exceed it.
pub struct KeyedCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    capacity: Option<usize>,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> KeyedCache<K, V> {
    /// Create a cache, optionally bounded to `capacity` entries.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.map(|c| c.max(1)),
            stats: CacheStats::default(),
        }
    }

    /// Look up a cached result.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a result, returning the stored copy.
    pub fn put(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;

        if let Some(capacity) = self.capacity {
            if state.entries.len() >= capacity && !state.entries.contains_key(&key) {
                self.evict_lru(&mut state.entries);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                last_used: tick,
            },
        );
        value
    }

    /// Evict the least recently used entry.
    fn evict_lru(&self, entries: &mut HashMap<K, CacheEntry<V>>) {
        let evict_key = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = evict_key {
            entries.remove(&key);
            self.stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Key of a relationship path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathCacheKey {
    pub source: ClassId,
    pub direction: RelationshipDirection,
    pub depth: i32,
    pub polymorphic: bool,
    pub supported_schemas: String,
    pub supported_relationships: String,
    pub supported_classes: String,
    pub target_class: Option<ClassId>,
}

/// Resolved paths with their include flags. Aliases are assigned per compile, so cached paths carry none.
pub type PathCacheResult = Vec<(RelatedClassPath, bool)>;

/// Memoized relationship path resolutions.
pub type PathCache = KeyedCache<PathCacheKey, PathCacheResult>;

/// Key of a polymorphic related-classes-with-data resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolymorphicRelationKey {
    pub source: ClassId,
    pub direction: RelationshipDirection,
    pub relationships: String,
    pub base_classes: String,
}

/// Memoized polymorphic related-classes-with-data resolutions.
pub type PolymorphicRelationCache = KeyedCache<PolymorphicRelationKey, Vec<RelatedClassPath>>;
