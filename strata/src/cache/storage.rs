//! Cache storage: the backend trait and the default LRU-bounded map.
//!
//! Storage instances are injected by whoever constructs the cache policy
//! (or default to one owned by the policy), never process-wide singletons —
//! independent test instances, no cross-test leakage.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use strata_core::RequestKey;

use super::entry::CacheEntry;

/// Backend for cache entries.
///
/// All methods must be safe under concurrent access from many in-flight
/// requests.
#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    /// Looks up an entry. Counts as an access for recency purposes.
    async fn read(&self, key: &RequestKey) -> Option<CacheEntry>;

    /// Stores or replaces an entry. Counts as an access.
    async fn write(&self, key: RequestKey, entry: CacheEntry);

    /// Removes an entry. Returns whether one was present.
    async fn remove(&self, key: &RequestKey) -> bool;

    /// Drops every entry.
    async fn clear(&self);
}

/// Explicit LRU bookkeeping: a value map plus a recency index keyed by a
/// monotonic tick. Read and write both bump the tick; removal unlinks the
/// tick so a later insert can never re-evict an already-removed key.
#[derive(Debug)]
struct LruMap<V> {
    capacity: usize,
    entries: HashMap<RequestKey, (V, u64)>,
    recency: BTreeMap<u64, RequestKey>,
    clock: u64,
}

impl<V: Clone> LruMap<V> {
    fn new(capacity: usize) -> Self {
        LruMap {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, key: &RequestKey) -> Option<V> {
        let tick = self.next_tick();
        let (value, old_tick) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(old_tick, tick);
        let value = value.clone();
        self.recency.remove(&previous);
        self.recency.insert(tick, key.clone());
        Some(value)
    }

    fn insert(&mut self, key: RequestKey, value: V) {
        let tick = self.next_tick();
        if let Some((_, previous)) = self.entries.insert(key.clone(), (value, tick)) {
            self.recency.remove(&previous);
        }
        self.recency.insert(tick, key);
        while self.entries.len() > self.capacity {
            if let Some((_, oldest)) = self.recency.pop_first() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, key: &RequestKey) -> bool {
        match self.entries.remove(key) {
            Some((_, tick)) => {
                self.recency.remove(&tick);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }
}

/// In-memory [`CacheStorage`] bounded by a maximum entry count.
///
/// Insertion beyond capacity evicts the least-recently-accessed key.
#[derive(Debug)]
pub struct LruStorage {
    inner: Mutex<LruMap<CacheEntry>>,
}

impl LruStorage {
    /// Default capacity used by [`LruStorage::default`].
    pub const DEFAULT_CAPACITY: usize = 512;

    /// Creates a storage bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        LruStorage {
            inner: Mutex::new(LruMap::new(capacity)),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the storage is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a key is present, without bumping its recency.
    pub async fn contains(&self, key: &RequestKey) -> bool {
        self.inner.lock().await.contains(key)
    }
}

impl Default for LruStorage {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl CacheStorage for LruStorage {
    async fn read(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.inner.lock().await.get(key)
    }

    async fn write(&self, key: RequestKey, entry: CacheEntry) {
        self.inner.lock().await.insert(key, entry);
    }

    async fn remove(&self, key: &RequestKey) -> bool {
        self.inner.lock().await.remove(key)
    }

    async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}
