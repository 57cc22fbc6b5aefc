//! Memo cache storage.
use crate::{config::Capacity, key::KeyStrategy, memo_id::MemoInfo};
use serde::Serialize;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::{collections::HashMap, fmt};
use tracing::{debug, trace, warn};

//==================================================================================================

/// Counters of a memo cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Keyed calls not answered from the cache. Counted before the function runs, so a call that
    /// fails or panics is still a miss even though nothing is stored.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Calls that ran the function without touching the cache, because no key could be derived.
    pub bypassed: u64,
}

impl CacheStats {
    /// Number of times the memoized function ran.
    pub fn computations(&self) -> u64 {
        self.misses + self.bypassed
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

//==================================================================================================

slotmap::new_key_type! {
    /// Slot of a cache entry.
    struct EntryKey;
}

/// A computed result and the key of the call that produced it.
struct Entry<K, R> {
    key: K,
    hash: Option<u64>,
    value: R,
    /// More recently used neighbour.
    prev: Option<EntryKey>,
    /// Less recently used neighbour.
    next: Option<EntryKey>,
}

/// Result store of a memoizer.
///
/// Entries are kept in a list ordered from most to least recently used. Entries with hashed keys are
/// also indexed by hash; the others are found by walking the list from the most recent entry.
pub(crate) struct MemoCache<K, R> {
    entries: SlotMap<EntryKey, Entry<K, R>>,
    buckets: HashMap<u64, SmallVec<[EntryKey; 1]>>,
    /// Most recently used entry.
    head: Option<EntryKey>,
    /// Least recently used entry.
    tail: Option<EntryKey>,
    capacity: Capacity,
    stats: CacheStats,
}

impl<K, R> MemoCache<K, R> {
    pub(crate) fn new(capacity: Capacity) -> MemoCache<K, R> {
        MemoCache {
            entries: SlotMap::with_key(),
            buckets: HashMap::new(),
            head: None,
            tail: None,
            capacity,
            stats: CacheStats::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub(crate) fn record_bypass(&mut self) {
        self.stats.bypassed += 1;
    }

    /// Finds the entry for `key`.
    fn find(&self, key: &K, hash: Option<u64>, same: impl Fn(&K, &K) -> bool) -> Option<EntryKey> {
        match hash {
            Some(hash) => self
                .buckets
                .get(&hash)?
                .iter()
                .copied()
                .find(|&k| same(&self.entries[k].key, key)),
            None => {
                let mut cursor = self.head;
                while let Some(k) = cursor {
                    let entry = &self.entries[k];
                    if entry.hash.is_none() && same(&entry.key, key) {
                        return Some(k);
                    }
                    cursor = entry.next;
                }
                None
            }
        }
    }

    /// Looks up the result stored for `key`, counting a hit or a miss.
    ///
    /// A hit makes the entry the most recently used.
    pub(crate) fn lookup(&mut self, key: &K, hash: Option<u64>, same: impl Fn(&K, &K) -> bool) -> Option<&R> {
        match self.find(key, hash, same) {
            Some(k) => {
                self.stats.hits += 1;
                self.promote(k);
                Some(&self.entries[k].value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Stores the result for `key`, then evicts entries beyond capacity.
    ///
    /// If an entry for `key` already exists (it was computed by a reentrant call in the meantime),
    /// its value is overwritten.
    pub(crate) fn insert(&mut self, key: K, hash: Option<u64>, same: impl Fn(&K, &K) -> bool, value: R) {
        if let Some(k) = self.find(&key, hash, same) {
            self.entries[k].value = value;
            self.promote(k);
            return;
        }

        let k = self.entries.insert(Entry {
            key,
            hash,
            value,
            prev: None,
            next: None,
        });
        if let Some(hash) = hash {
            self.buckets.entry(hash).or_default().push(k);
        }
        self.push_front(k);
        self.evict_overflow();
    }

    /// Changes the capacity, evicting entries if the cache is now over capacity.
    pub(crate) fn set_capacity(&mut self, capacity: Capacity) {
        self.capacity = capacity;
        self.evict_overflow();
    }

    /// Drops all entries. Counters are kept.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates over entries, most recently used first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &R)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let entry = &self.entries[cursor?];
            cursor = entry.next;
            Some((&entry.key, &entry.value))
        })
    }

    fn evict_overflow(&mut self) {
        let Some(limit) = self.capacity.limit() else {
            return;
        };
        while self.entries.len() > limit {
            let Some(lru) = self.tail else { break };
            self.remove(lru);
            self.stats.evictions += 1;
            trace!(limit, "evicted least recently used entry");
        }
    }

    fn remove(&mut self, k: EntryKey) -> Option<Entry<K, R>> {
        self.unlink(k);
        let entry = self.entries.remove(k)?;
        if let Some(hash) = entry.hash {
            if let Some(bucket) = self.buckets.get_mut(&hash) {
                bucket.retain(|other| *other != k);
                if bucket.is_empty() {
                    self.buckets.remove(&hash);
                }
            }
        }
        Some(entry)
    }

    fn promote(&mut self, k: EntryKey) {
        if self.head != Some(k) {
            self.unlink(k);
            self.push_front(k);
        }
    }

    fn unlink(&mut self, k: EntryKey) {
        let (prev, next) = {
            let entry = &self.entries[k];
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entries[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None => self.tail = prev,
        }
        let entry = &mut self.entries[k];
        entry.prev = None;
        entry.next = None;
    }

    fn push_front(&mut self, k: EntryKey) {
        let old_head = self.head;
        {
            let entry = &mut self.entries[k];
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(h) => self.entries[h].prev = Some(k),
            None => self.tail = Some(k),
        }
        self.head = Some(k);
    }
}

/// Outcome of looking up a memoized call.
pub(crate) enum CallLookup<K, R> {
    Hit(R),
    /// Not cached: compute, then hand the result to [`MemoCache::insert_call`].
    Miss(PendingCall<K>),
    /// No key could be derived. Compute without caching.
    Bypass,
}

/// Key of a call whose result is being computed.
pub(crate) struct PendingCall<K> {
    key: K,
    hash: Option<u64>,
}

impl<K, R: Clone> MemoCache<K, R> {
    /// Derives the key of `args` with `strategy` and looks it up, recording the outcome in the stats.
    pub(crate) fn lookup_call<A, S>(&mut self, strategy: &S, info: &MemoInfo, args: &A) -> CallLookup<K, R>
    where
        S: KeyStrategy<A, Key = K>,
    {
        let key = match strategy.key(args) {
            Ok(key) => key,
            Err(err) => {
                warn!(memo = %info, "{err}; bypassing cache");
                self.record_bypass();
                return CallLookup::Bypass;
            }
        };
        let hash = strategy.hash_key(&key);
        if let Some(value) = self.lookup(&key, hash, |a, b| strategy.same(a, b)) {
            trace!(memo = %info, "cache hit");
            return CallLookup::Hit(value.clone());
        }
        debug!(memo = %info, "cache miss: recomputing");
        CallLookup::Miss(PendingCall { key, hash })
    }

    /// Stores the result of a call that missed.
    pub(crate) fn insert_call<A, S>(&mut self, strategy: &S, call: PendingCall<K>, value: R)
    where
        S: KeyStrategy<A, Key = K>,
    {
        self.insert(call.key, call.hash, |a, b| strategy.same(a, b), value)
    }
}

impl<K: fmt::Debug, R> MemoCache<K, R> {
    pub(crate) fn dump(&self, info: &MemoInfo) {
        debug!(
            memo = %info,
            len = self.len(),
            capacity = ?self.capacity,
            stats = ?self.stats,
            "memo cache dump (most recently used first)"
        );
        for (i, (key, _)) in self.iter().enumerate() {
            debug!(memo = %info, "{:3} key={:?}", i, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn eq(a: &u32, b: &u32) -> bool {
        a == b
    }

    fn hashed(k: u32) -> Option<u64> {
        // deliberately collide keys to exercise the buckets
        Some((k % 3) as u64)
    }

    fn keys<R>(cache: &MemoCache<u32, R>) -> Vec<u32> {
        cache.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn unbounded_never_evicts() {
        let mut cache = MemoCache::new(Capacity::Unbounded);
        for i in 0..100 {
            cache.insert(i, hashed(i), eq, i * 2);
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.lookup(&42, hashed(42), eq), Some(&84));
    }

    #[test]
    fn lru_eviction_order() {
        let mut cache = MemoCache::new(Capacity::lru(3).unwrap());
        for i in 0..3 {
            cache.insert(i, None, eq, i);
        }
        assert_eq!(keys(&cache), vec![2, 1, 0]);

        // touching 0 makes 1 the least recently used
        assert_eq!(cache.lookup(&0, None, eq), Some(&0));
        assert_eq!(keys(&cache), vec![0, 2, 1]);

        cache.insert(3, None, eq, 3);
        assert_eq!(keys(&cache), vec![3, 0, 2]);
        assert_eq!(cache.lookup(&1, None, eq), None);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 1,
                bypassed: 0
            }
        );
    }

    #[test]
    fn reinsert_overwrites() {
        let mut cache = MemoCache::new(Capacity::Unbounded);
        cache.insert(1, hashed(1), eq, "first");
        cache.insert(1, hashed(1), eq, "second");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&1, hashed(1), eq), Some(&"second"));
    }

    #[test]
    fn shrink_capacity() {
        let mut cache = MemoCache::new(Capacity::Unbounded);
        for i in 0..10 {
            cache.insert(i, hashed(i), eq, ());
        }
        cache.set_capacity(Capacity::lru(4).unwrap());
        assert_eq!(keys(&cache), vec![9, 8, 7, 6]);
        assert_eq!(cache.stats().evictions, 6);
        // evicted entries must be gone from the hash index too
        for i in 0..6 {
            assert_eq!(cache.lookup(&i, hashed(i), eq), None);
        }
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.buckets.is_empty());
    }

    #[test]
    fn random_operations_match_model() {
        let mut rng = rand::thread_rng();

        for capacity in 1..6 {
            let mut cache = MemoCache::new(Capacity::lru(capacity).unwrap());
            // most recently used first
            let mut model: Vec<(u32, u32)> = Vec::new();

            for step in 0..500 {
                let key = rng.gen_range(0..10);
                // hashed and unhashed keys share the recency list
                let hash = if key % 2 == 0 { hashed(key) } else { None };

                let found = cache.lookup(&key, hash, eq).copied();
                let expected = model.iter().position(|(k, _)| *k == key);
                assert_eq!(found, expected.map(|i| model[i].1), "step {step}");

                match expected {
                    Some(i) => {
                        let e = model.remove(i);
                        model.insert(0, e);
                    }
                    None => {
                        cache.insert(key, hash, eq, step);
                        model.insert(0, (key, step));
                        model.truncate(capacity);
                    }
                }
                assert_eq!(keys(&cache), model.iter().map(|(k, _)| *k).collect::<Vec<_>>());
            }
        }
    }
}
