//! Thread-safe memoizer.
use crate::{
    cache::{CacheStats, CallLookup, MemoCache},
    config::{Capacity, MemoConfig},
    key::{CanonicalJson, KeyStrategy},
    memo_id::MemoInfo,
};
use serde::Serialize;
use std::{
    fmt,
    marker::PhantomData,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// A memoized function `&A -> R` that can be shared between threads.
///
/// The cache lock is held while the function runs, so concurrent calls with the same key run the
/// function once. As a consequence the function must not call back into the same memoizer.
///
/// If the function panics, the panic propagates to the caller and nothing is cached. The cache
/// stays usable.
///
/// ```
/// use memoria::SyncMemoizer;
/// use std::sync::Arc;
///
/// let square = Arc::new(SyncMemoizer::new(|x: &u64| x * x));
/// std::thread::scope(|scope| {
///     for _ in 0..4 {
///         let square = square.clone();
///         scope.spawn(move || assert_eq!(square.call(&12), 144));
///     }
/// });
/// assert_eq!(square.stats().misses, 1);
/// ```
pub struct SyncMemoizer<A, R, K: KeyStrategy<A> = CanonicalJson> {
    info: MemoInfo,
    strategy: K,
    cache: Mutex<MemoCache<K::Key, R>>,
    func: Box<dyn Fn(&A) -> R + Send + Sync>,
    _args: PhantomData<fn(&A)>,
}

impl<A: Serialize, R> SyncMemoizer<A, R> {
    #[track_caller]
    pub fn new(f: impl Fn(&A) -> R + Send + Sync + 'static) -> SyncMemoizer<A, R> {
        SyncMemoizer::with_strategy(CanonicalJson, MemoConfig::default(), f)
    }
}

impl<A, R, K: KeyStrategy<A>> SyncMemoizer<A, R, K> {
    #[track_caller]
    pub fn with_strategy(
        strategy: K,
        config: MemoConfig,
        f: impl Fn(&A) -> R + Send + Sync + 'static,
    ) -> SyncMemoizer<A, R, K> {
        SyncMemoizer {
            info: MemoInfo::new(config.name),
            strategy,
            cache: Mutex::new(MemoCache::new(config.capacity)),
            func: Box::new(f),
            _args: PhantomData,
        }
    }

    /// Locks the cache. A panic in the memoized function leaves no partial entry behind, so the
    /// cache of a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, MemoCache<K::Key, R>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> &MemoInfo {
        &self.info
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn reset_stats(&self) {
        self.lock().reset_stats()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Capacity {
        self.lock().capacity()
    }

    pub fn set_capacity(&self, capacity: Capacity) {
        self.lock().set_capacity(capacity)
    }

    pub fn clear(&self) {
        debug!(memo = %self.info, "cache released");
        self.lock().clear()
    }
}

impl<A, R: Clone, K: KeyStrategy<A>> SyncMemoizer<A, R, K> {
    pub fn call(&self, args: &A) -> R {
        let mut cache = self.lock();
        match cache.lookup_call(&self.strategy, &self.info, args) {
            CallLookup::Hit(value) => value,
            CallLookup::Bypass => {
                drop(cache);
                (self.func)(args)
            }
            CallLookup::Miss(call) => {
                let value = (self.func)(args);
                cache.insert_call::<A, _>(&self.strategy, call, value.clone());
                value
            }
        }
    }
}

impl<A, R, K: KeyStrategy<A>> fmt::Debug for SyncMemoizer<A, R, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SyncMemoizer")
            .field("info", &self.info)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StructuralEq;
    use std::{
        collections::HashMap,
        panic::{catch_unwind, AssertUnwindSafe},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    #[test]
    fn concurrent_calls_compute_once_per_key() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();
        let sum = SyncMemoizer::new(move |n: &u64| {
            counted.fetch_add(1, Ordering::SeqCst);
            (0..=*n).sum::<u64>()
        });

        thread::scope(|scope| {
            for t in 0..8 {
                let sum = &sum;
                scope.spawn(move || {
                    for n in 0..16u64 {
                        assert_eq!(sum.call(&((n + t) % 16)), n_sum((n + t) % 16));
                    }
                });
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 16);
        let stats = sum.stats();
        assert_eq!(stats.misses, 16);
        assert_eq!(stats.hits, 8 * 16 - 16);
    }

    fn n_sum(n: u64) -> u64 {
        n * (n + 1) / 2
    }

    #[test]
    fn panic_leaves_cache_usable() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();
        let checked = SyncMemoizer::with_strategy(StructuralEq, MemoConfig::default(), move |x: &i32| {
            counted.fetch_add(1, Ordering::SeqCst);
            assert!(*x >= 0, "negative input");
            *x
        });

        assert!(catch_unwind(AssertUnwindSafe(|| checked.call(&-1))).is_err());
        assert!(checked.is_empty());
        assert_eq!(checked.call(&5), 5);
        assert_eq!(checked.call(&5), 5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(checked.stats().hits, 1);
    }

    #[test]
    fn unkeyable_arguments_bypass_the_cache() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();
        let size = SyncMemoizer::new(move |m: &HashMap<(u8, u8), u8>| {
            counted.fetch_add(1, Ordering::SeqCst);
            m.len()
        });
        let m = HashMap::from([((1, 1), 1)]);
        assert_eq!(size.call(&m), 1);
        assert_eq!(size.call(&m), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let stats = size.stats();
        assert_eq!((stats.bypassed, stats.hits, stats.misses), (2, 0, 0));
        assert!(size.is_empty());
        // the lock was released for the bypassed computation
        assert_eq!(size.call(&HashMap::new()), 0);
        assert_eq!(size.len(), 1);
    }

    #[test]
    fn bounded() {
        let square = SyncMemoizer::with_strategy(StructuralEq, MemoConfig::new().lru(1).unwrap(), |x: &u32| x * x);
        square.call(&2);
        square.call(&3);
        assert_eq!(square.len(), 1);
        assert_eq!(square.stats().evictions, 1);
        square.clear();
        assert!(square.is_empty());
    }
}
