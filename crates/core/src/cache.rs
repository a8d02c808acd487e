//! Bounded in-memory caches.
//!
//! [`BoundedCache`] is an explicit arena: an LRU-ordered map plus a running
//! weight total. It is bounded by entry count or by total weight, never both
//! (see [`CacheBound`]). Every removal is reported to an optional listener
//! with its [`RemovalCause`]; removals have no side effects beyond dropping the
//! entry.
//!
//! [`LoadingCache`] puts a single-flight loader in front of a `BoundedCache`:
//! concurrent requests for a key that is not cached share one load. Waiting
//! callers park on the in-flight slot and receive the same value.
//!
//! There is no memory-pressure eviction. A caller may still miss on a key it
//! loaded moments ago (the bound can push it out), and simply loads it again.
//!
//! # Example
//!
//! ```rust
//! use quire_core::cache::{CacheBound, LoadingCache};
//!
//! let cache: LoadingCache<String, usize> = LoadingCache::new(CacheBound::MaxEntries(2));
//! let len = cache.get_with(&"hello".to_string(), |k| k.len());
//! assert_eq!(len, 5);
//! ```

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};

/// Upper bound applied to a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBound {
    /// Keep everything.
    #[default]
    Unbounded,
    /// Keep at most this many entries. Zero disables retention entirely.
    MaxEntries(usize),
    /// Keep at most this much total weight (see [`Weigher`]).
    MaxWeight(u64),
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Evicted to satisfy the bound.
    Size,
    /// Removed by `remove` or `clear`.
    Explicit,
    /// Overwritten by a newer value for the same key.
    Replaced,
}

impl RemovalCause {
    pub fn describe(self) -> &'static str {
        match self {
            RemovalCause::Size => "space was needed",
            RemovalCause::Explicit => "it was manually removed",
            RemovalCause::Replaced => "it was replaced with a new value",
        }
    }
}

/// Computes the weight of an entry for [`CacheBound::MaxWeight`].
pub trait Weigher<K, V>: Send + Sync {
    fn weigh(&self, key: &K, value: &V) -> u64;
}

impl<K, V, F> Weigher<K, V> for F
where
    F: Fn(&K, &V) -> u64 + Send + Sync,
{
    fn weigh(&self, key: &K, value: &V) -> u64 {
        self(key, value)
    }
}

/// Callback invoked for every removal.
pub type RemovalListener<K, V> = Box<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;

struct Weighted<V> {
    value: V,
    weight: u64,
}

/// LRU map bounded by count or weight.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, Weighted<V>>,
    bound: CacheBound,
    total_weight: u64,
    weigher: Box<dyn Weigher<K, V>>,
    listener: Option<RemovalListener<K, V>>,
}

impl<K: Hash + Eq + 'static, V: 'static> BoundedCache<K, V> {
    /// Every entry weighs 1 unless a weigher is installed.
    pub fn new(bound: CacheBound) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bound,
            total_weight: 0,
            weigher: Box::new(|_: &K, _: &V| 1u64),
            listener: None,
        }
    }

    pub fn with_weigher(mut self, weigher: impl Weigher<K, V> + 'static) -> Self {
        self.weigher = Box::new(weigher);
        self
    }

    pub fn with_removal_listener(mut self, listener: impl Fn(&K, &V, RemovalCause) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn bound(&self) -> CacheBound {
        self.bound
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|w| &w.value)
    }

    /// Looks up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key).map(|w| &w.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Inserts `value`, then evicts least recently used entries until the
    /// bound holds again. The new entry itself is evicted last.
    pub fn insert(&mut self, key: K, value: V) {
        let weight = self.weigher.weigh(&key, &value).max(1);
        self.total_weight += weight;
        if let Some((old_key, old)) = self.entries.push(key, Weighted { value, weight }) {
            self.total_weight -= old.weight;
            self.notify(&old_key, &old.value, RemovalCause::Replaced);
        }
        self.enforce_bound();
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (k, old) = self.entries.pop_entry(key)?;
        self.total_weight -= old.weight;
        self.notify(&k, &old.value, RemovalCause::Explicit);
        Some(old.value)
    }

    pub fn clear(&mut self) {
        while let Some((k, old)) = self.entries.pop_lru() {
            self.total_weight -= old.weight;
            self.notify(&k, &old.value, RemovalCause::Explicit);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the weights of all resident entries.
    pub fn weight(&self) -> u64 {
        self.total_weight
    }

    fn over_bound(&self) -> bool {
        match self.bound {
            CacheBound::Unbounded => false,
            CacheBound::MaxEntries(max) => self.entries.len() > max,
            CacheBound::MaxWeight(max) => self.total_weight > max,
        }
    }

    fn enforce_bound(&mut self) {
        while self.over_bound() {
            let Some((k, old)) = self.entries.pop_lru() else {
                break;
            };
            self.total_weight -= old.weight;
            self.notify(&k, &old.value, RemovalCause::Size);
        }
    }

    fn notify(&self, key: &K, value: &V, cause: RemovalCause) {
        if let Some(listener) = &self.listener {
            listener(key, value, cause);
        }
    }
}

enum SlotState<V> {
    Loading,
    Ready(V),
    Abandoned,
}

/// Rendezvous for callers waiting on one in-flight load.
struct InFlight<V> {
    state: Mutex<SlotState<V>>,
    ready: Condvar,
}

impl<V: Clone> InFlight<V> {
    fn new() -> Self {
        Self { state: Mutex::new(SlotState::Loading), ready: Condvar::new() }
    }

    fn publish(&self, state: SlotState<V>) {
        *self.state.lock() = state;
        self.ready.notify_all();
    }

    /// Blocks until the leader finishes. `None` means the leader gave up.
    fn wait(&self) -> Option<V> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                SlotState::Ready(v) => return Some(v.clone()),
                SlotState::Abandoned => return None,
                SlotState::Loading => {}
            }
            self.ready.wait(&mut state);
        }
    }
}

/// Releases waiters and the in-flight entry if the loader unwinds.
struct LeaderGuard<'a, K: Hash + Eq + Clone, V: Clone> {
    in_flight: &'a DashMap<K, Arc<InFlight<V>>>,
    key: &'a K,
    slot: Arc<InFlight<V>>,
    done: bool,
}

impl<K: Hash + Eq + Clone, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.done {
            self.slot.publish(SlotState::Abandoned);
            self.in_flight.remove(self.key);
        }
    }
}

/// Thread-safe cache that loads missing keys at most once concurrently.
pub struct LoadingCache<K: Hash + Eq + Clone, V: Clone> {
    store: Mutex<BoundedCache<K, V>>,
    in_flight: DashMap<K, Arc<InFlight<V>>>,
}

impl<K: Hash + Eq + Clone + 'static, V: Clone + 'static> LoadingCache<K, V> {
    pub fn new(bound: CacheBound) -> Self {
        Self::from_store(BoundedCache::new(bound))
    }

    /// Wraps a configured [`BoundedCache`] (weigher, listener).
    pub fn from_store(store: BoundedCache<K, V>) -> Self {
        Self { store: Mutex::new(store), in_flight: DashMap::new() }
    }

    /// Returns the cached value for `key`, loading it with `load` on a miss.
    ///
    /// If another thread is already loading `key`, this call blocks until
    /// that load finishes and returns its result instead of calling `load`.
    pub fn get_with<F>(&self, key: &K, load: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        let slot = loop {
            if let Some(v) = self.store.lock().get(key) {
                return v.clone();
            }

            match self.in_flight.entry(key.clone()) {
                Entry::Occupied(e) => {
                    let slot = Arc::clone(e.get());
                    drop(e);
                    if let Some(v) = slot.wait() {
                        return v;
                    }
                }
                Entry::Vacant(e) => {
                    let slot = Arc::new(InFlight::new());
                    e.insert(Arc::clone(&slot));
                    break slot;
                }
            }
        };

        let mut guard = LeaderGuard { in_flight: &self.in_flight, key, slot, done: false };

        // A previous leader may have finished between the store check and
        // claiming the slot.
        let cached = self.store.lock().get(key).cloned();
        let value = match cached {
            Some(v) => v,
            None => {
                let v = load(key);
                self.store.lock().insert(key.clone(), v.clone());
                v
            }
        };

        guard.slot.publish(SlotState::Ready(value.clone()));
        guard.done = true;
        self.in_flight.remove(key);
        value
    }

    /// Cached value without loading or touching recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.store.lock().peek(key).cloned()
    }

    pub fn invalidate(&self, key: &K) {
        self.store.lock().remove(key);
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn weight(&self) -> u64 {
        self.store.lock().weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_max_entries_evicts_least_recent() {
        let mut cache = BoundedCache::new(CacheBound::MaxEntries(2));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_max_entries_zero_retains_nothing() {
        let mut cache = BoundedCache::new(CacheBound::MaxEntries(0));
        cache.insert("a", 1);
        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
    }

    #[test]
    fn test_max_weight_uses_weigher() {
        let mut cache = BoundedCache::new(CacheBound::MaxWeight(10))
            .with_weigher(|_: &&str, v: &Vec<u8>| v.len() as u64);
        cache.insert("a", vec![0; 4]);
        cache.insert("b", vec![0; 4]);
        assert_eq!(cache.weight(), 8);

        cache.insert("c", vec![0; 4]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.weight(), 8);
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn test_oversized_entry_is_dropped() {
        let mut cache = BoundedCache::new(CacheBound::MaxWeight(3))
            .with_weigher(|_: &&str, v: &Vec<u8>| v.len() as u64);
        cache.insert("big", vec![0; 10]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_removal_listener_reports_causes() {
        let causes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&causes);
        let mut cache = BoundedCache::new(CacheBound::MaxEntries(1))
            .with_removal_listener(move |k: &&str, _: &i32, cause| seen.lock().push((*k, cause)));

        cache.insert("a", 1);
        cache.insert("a", 2);
        cache.insert("b", 3);
        cache.remove(&"b");

        assert_eq!(
            *causes.lock(),
            vec![("a", RemovalCause::Replaced), ("a", RemovalCause::Size), ("b", RemovalCause::Explicit)]
        );
    }

    #[test]
    fn test_loading_cache_loads_once() {
        let cache: LoadingCache<String, usize> = LoadingCache::new(CacheBound::Unbounded);
        let calls = AtomicUsize::new(0);
        let key = "k".to_string();
        for _ in 0..3 {
            let v = cache.get_with(&key, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            });
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_requests_share_one_load() {
        let cache: LoadingCache<String, usize> = LoadingCache::new(CacheBound::Unbounded);
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);
        let key = "same".to_string();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let v = cache.get_with(&key, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        42
                    });
                    assert_eq!(v, 42);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uncached_bound_still_collapses_concurrent_loads() {
        let cache: LoadingCache<String, usize> = LoadingCache::new(CacheBound::MaxEntries(0));
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(4);
        let key = "k".to_string();

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    barrier.wait();
                    cache.get_with(&key, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        1
                    });
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_panicking_loader_releases_waiters() {
        let cache: Arc<LoadingCache<String, usize>> = Arc::new(LoadingCache::new(CacheBound::Unbounded));
        let key = "boom".to_string();

        let c = Arc::clone(&cache);
        let k = key.clone();
        let result = thread::spawn(move || c.get_with(&k, |_| panic!("loader failed"))).join();
        assert!(result.is_err());

        assert_eq!(cache.get_with(&key, |_| 3), 3);
    }
}
