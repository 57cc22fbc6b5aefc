//! Memoized functions.
//!
//! A memoizer wraps a pure function and caches its results by argument key, as decided by its
//! [`KeyStrategy`]. Each memoizer owns its cache: two memoizers never share entries.
use crate::{
    cache::{CacheStats, CallLookup, MemoCache},
    config::{Capacity, MemoConfig},
    key::{CanonicalJson, KeyStrategy},
    memo_id::MemoInfo,
};
use serde::Serialize;
use std::{cell::RefCell, convert::Infallible, fmt, marker::PhantomData};
use tracing::debug;

//==================================================================================================

/// Key strategy and result cache, shared by the memoizer flavours.
pub(crate) struct MemoCore<A, R, K: KeyStrategy<A>> {
    info: MemoInfo,
    strategy: K,
    cache: RefCell<MemoCache<K::Key, R>>,
    _args: PhantomData<fn(&A)>,
}

impl<A, R, K: KeyStrategy<A>> MemoCore<A, R, K> {
    #[track_caller]
    pub(crate) fn new(strategy: K, config: MemoConfig) -> MemoCore<A, R, K> {
        MemoCore {
            info: MemoInfo::new(config.name),
            strategy,
            cache: RefCell::new(MemoCache::new(config.capacity)),
            _args: PhantomData,
        }
    }

    pub(crate) fn info(&self) -> &MemoInfo {
        &self.info
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    pub(crate) fn reset_stats(&self) {
        self.cache.borrow_mut().reset_stats()
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub(crate) fn capacity(&self) -> Capacity {
        self.cache.borrow().capacity()
    }

    pub(crate) fn set_capacity(&self, capacity: Capacity) {
        self.cache.borrow_mut().set_capacity(capacity)
    }

    pub(crate) fn clear(&self) {
        debug!(memo = %self.info, "cache released");
        self.cache.borrow_mut().clear()
    }

    pub(crate) fn dump(&self)
    where
        K::Key: fmt::Debug,
    {
        self.cache.borrow().dump(&self.info)
    }
}

impl<A, R: Clone, K: KeyStrategy<A>> MemoCore<A, R, K> {
    /// Returns the cached result for `args`, or runs `compute` and caches its `Ok` result.
    ///
    /// The cache is not borrowed while `compute` runs, so `compute` may call back into the same
    /// memoizer.
    pub(crate) fn get_or_try_compute<E>(
        &self,
        args: &A,
        compute: impl FnOnce(&A) -> Result<R, E>,
    ) -> Result<R, E> {
        let lookup = self.cache.borrow_mut().lookup_call(&self.strategy, &self.info, args);
        match lookup {
            CallLookup::Hit(value) => Ok(value),
            CallLookup::Bypass => compute(args),
            CallLookup::Miss(call) => {
                let value = compute(args)?;
                self.cache.borrow_mut().insert_call::<A, _>(&self.strategy, call, value.clone());
                Ok(value)
            }
        }
    }
}

//==================================================================================================

/// A memoized function `&A -> R`.
///
/// # Example
///
/// ```
/// use memoria::Memoizer;
///
/// let total = Memoizer::new(|numbers: &Vec<i64>| numbers.iter().sum::<i64>());
/// assert_eq!(total.call(&vec![1, 2, 3, 4, 5]), 15);
/// // structurally equal argument: served from the cache
/// assert_eq!(total.call(&vec![1, 2, 3, 4, 5]), 15);
/// assert_eq!(total.call(&vec![1, 2, 3, 4, 5, 6]), 21);
/// assert_eq!(total.stats().hits, 1);
/// assert_eq!(total.stats().misses, 2);
/// ```
///
/// Results are returned by clone; wrap large results in `Rc` or `Arc`.
pub struct Memoizer<A, R, K: KeyStrategy<A> = CanonicalJson> {
    core: MemoCore<A, R, K>,
    func: Box<dyn Fn(&Memoizer<A, R, K>, &A) -> R>,
}

impl<A: Serialize, R> Memoizer<A, R> {
    /// Memoizes `f`, keyed by the canonical JSON encoding of its argument, with an unbounded cache.
    #[track_caller]
    pub fn new(f: impl Fn(&A) -> R + 'static) -> Memoizer<A, R> {
        Memoizer::with_strategy(CanonicalJson, MemoConfig::default(), f)
    }

    #[track_caller]
    pub fn with_config(config: MemoConfig, f: impl Fn(&A) -> R + 'static) -> Memoizer<A, R> {
        Memoizer::with_strategy(CanonicalJson, config, f)
    }

    /// Memoizes a recursive function: `f` receives the memoizer, and calls it for sub-problems.
    ///
    /// ```
    /// use memoria::Memoizer;
    ///
    /// let fib = Memoizer::recursive(|fib, n: &u64| if *n <= 1 { *n } else { fib.call(&(n - 1)) + fib.call(&(n - 2)) });
    /// assert_eq!(fib.call(&50), 12586269025);
    /// ```
    #[track_caller]
    pub fn recursive(f: impl Fn(&Memoizer<A, R>, &A) -> R + 'static) -> Memoizer<A, R> {
        Memoizer::recursive_with_strategy(CanonicalJson, MemoConfig::default(), f)
    }
}

impl<A, R, K: KeyStrategy<A>> Memoizer<A, R, K> {
    #[track_caller]
    pub fn with_strategy(strategy: K, config: MemoConfig, f: impl Fn(&A) -> R + 'static) -> Memoizer<A, R, K> {
        Memoizer::recursive_with_strategy(strategy, config, move |_, args| f(args))
    }

    #[track_caller]
    pub fn recursive_with_strategy(
        strategy: K,
        config: MemoConfig,
        f: impl Fn(&Memoizer<A, R, K>, &A) -> R + 'static,
    ) -> Memoizer<A, R, K> {
        Memoizer {
            core: MemoCore::new(strategy, config),
            func: Box::new(f),
        }
    }

    pub fn info(&self) -> &MemoInfo {
        self.core.info()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    pub fn reset_stats(&self) {
        self.core.reset_stats()
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Capacity {
        self.core.capacity()
    }

    /// Changes the capacity of the cache. Shrinking evicts the least recently used entries.
    pub fn set_capacity(&self, capacity: Capacity) {
        self.core.set_capacity(capacity)
    }

    /// Drops all cached results.
    pub fn clear(&self) {
        self.core.clear()
    }

    /// Logs the cache keys at `debug` level.
    pub fn dump(&self)
    where
        K::Key: fmt::Debug,
    {
        self.core.dump()
    }
}

impl<A, R: Clone, K: KeyStrategy<A>> Memoizer<A, R, K> {
    /// Returns `f(args)`, from the cache if a call with the same key was made before.
    pub fn call(&self, args: &A) -> R {
        let result = self
            .core
            .get_or_try_compute(args, |args| Ok::<R, Infallible>((self.func)(self, args)));
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<A, R, K: KeyStrategy<A>> fmt::Debug for Memoizer<A, R, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("info", self.core.info())
            .field("stats", &self.core.stats())
            .finish_non_exhaustive()
    }
}

//==================================================================================================

/// A memoized fallible function `&A -> Result<R, E>`.
///
/// Only successful results are cached: an `Err` is returned to the caller and the next call with
/// the same arguments runs the function again.
pub struct TryMemoizer<A, R, E, K: KeyStrategy<A> = CanonicalJson> {
    core: MemoCore<A, R, K>,
    func: Box<dyn Fn(&TryMemoizer<A, R, E, K>, &A) -> Result<R, E>>,
}

impl<A: Serialize, R, E> TryMemoizer<A, R, E> {
    #[track_caller]
    pub fn new(f: impl Fn(&A) -> Result<R, E> + 'static) -> TryMemoizer<A, R, E> {
        TryMemoizer::with_strategy(CanonicalJson, MemoConfig::default(), f)
    }
}

impl<A, R, E, K: KeyStrategy<A>> TryMemoizer<A, R, E, K> {
    #[track_caller]
    pub fn with_strategy(
        strategy: K,
        config: MemoConfig,
        f: impl Fn(&A) -> Result<R, E> + 'static,
    ) -> TryMemoizer<A, R, E, K> {
        TryMemoizer::recursive_with_strategy(strategy, config, move |_, args| f(args))
    }

    #[track_caller]
    pub fn recursive_with_strategy(
        strategy: K,
        config: MemoConfig,
        f: impl Fn(&TryMemoizer<A, R, E, K>, &A) -> Result<R, E> + 'static,
    ) -> TryMemoizer<A, R, E, K> {
        TryMemoizer {
            core: MemoCore::new(strategy, config),
            func: Box::new(f),
        }
    }

    pub fn info(&self) -> &MemoInfo {
        self.core.info()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.core.clear()
    }
}

impl<A, R: Clone, E, K: KeyStrategy<A>> TryMemoizer<A, R, E, K> {
    pub fn call(&self, args: &A) -> Result<R, E> {
        self.core.get_or_try_compute(args, |args| (self.func)(self, args))
    }
}

impl<A, R, E, K: KeyStrategy<A>> fmt::Debug for TryMemoizer<A, R, E, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TryMemoizer")
            .field("info", self.core.info())
            .field("stats", &self.core.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyFn, ShallowEq, StructuralEq};
    use std::{
        cell::Cell,
        collections::HashMap,
        panic::{catch_unwind, AssertUnwindSafe},
        rc::Rc,
        sync::Arc,
    };

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn repeated_call_runs_once() {
        let (calls, counted) = counter();
        let double = Memoizer::new(move |x: &i32| {
            counted.set(counted.get() + 1);
            x * 2
        });
        assert_eq!(double.call(&21), 42);
        assert_eq!(double.call(&21), 42);
        assert_eq!(calls.get(), 1);
        assert_eq!(double.stats().hits, 1);
        assert_eq!(double.stats().misses, 1);
    }

    #[test]
    fn different_arguments_miss() {
        let (calls, counted) = counter();
        let double = Memoizer::new(move |x: &i32| {
            counted.set(counted.get() + 1);
            x * 2
        });
        double.call(&1);
        double.call(&2);
        assert_eq!(calls.get(), 2);
        assert_eq!(double.len(), 2);
    }

    #[test]
    fn structurally_equal_state_hits() {
        #[derive(Serialize)]
        struct State {
            numbers: Vec<i64>,
        }

        let (calls, counted) = counter();
        let sum = Memoizer::new(move |state: &State| {
            counted.set(counted.get() + 1);
            state.numbers.iter().sum::<i64>()
        });

        let state1 = State { numbers: vec![1, 2, 3, 4, 5] };
        let state2 = State { numbers: vec![1, 2, 3, 4, 5] };
        let state3 = State { numbers: vec![1, 2, 3, 4, 5, 6] };
        assert_eq!(sum.call(&state1), 15);
        assert_eq!(sum.call(&state2), 15);
        assert_eq!(calls.get(), 1);
        assert_eq!(sum.call(&state3), 21);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn recursive_fibonacci_computes_each_n_once() {
        let (calls, counted) = counter();
        let fib = Memoizer::recursive(move |fib, n: &u64| {
            counted.set(counted.get() + 1);
            if *n <= 1 {
                *n
            } else {
                fib.call(&(n - 1)) + fib.call(&(n - 2))
            }
        });

        assert_eq!(fib.call(&10), 55);
        // one computation per n in 0..=10
        assert_eq!(calls.get(), 11);

        assert_eq!(fib.call(&10), 55);
        assert_eq!(calls.get(), 11);
        assert_eq!(fib.stats().misses, 11);
    }

    #[test]
    fn errors_are_not_cached() {
        let (calls, counted) = counter();
        let parse = TryMemoizer::new(move |s: &String| {
            counted.set(counted.get() + 1);
            s.parse::<u32>()
        });

        assert!(parse.call(&"x".to_string()).is_err());
        assert!(parse.call(&"x".to_string()).is_err());
        assert_eq!(calls.get(), 2);
        assert!(parse.is_empty());

        assert_eq!(parse.call(&"7".to_string()), Ok(7));
        assert_eq!(parse.call(&"7".to_string()), Ok(7));
        assert_eq!(calls.get(), 3);
        // failed calls count as misses, although nothing was stored for them
        assert_eq!(parse.stats().misses, 3);
        assert_eq!(parse.stats().hits, 1);
        assert_eq!(parse.len(), 1);
    }

    #[test]
    fn panics_propagate_and_are_not_cached() {
        let (calls, counted) = counter();
        let checked = Memoizer::new(move |x: &i32| {
            counted.set(counted.get() + 1);
            assert!(*x >= 0, "negative input");
            *x
        });

        let result = catch_unwind(AssertUnwindSafe(|| checked.call(&-1)));
        assert!(result.is_err());
        assert!(checked.is_empty());
        // the cache is still usable after the panic
        assert_eq!(checked.call(&3), 3);
        assert_eq!(checked.call(&3), 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unkeyable_arguments_bypass_the_cache() {
        let (calls, counted) = counter();
        let size = Memoizer::new(move |m: &HashMap<(u8, u8), u8>| {
            counted.set(counted.get() + 1);
            m.len()
        });
        let mut m = HashMap::new();
        m.insert((1, 1), 1);
        assert_eq!(size.call(&m), 1);
        assert_eq!(size.call(&m), 1);
        assert_eq!(calls.get(), 2);
        assert_eq!(size.stats().bypassed, 2);
        assert!(size.is_empty());
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let (calls, counted) = counter();
        let square = Memoizer::with_strategy(StructuralEq, MemoConfig::new().lru(2).unwrap(), move |x: &u32| {
            counted.set(counted.get() + 1);
            x * x
        });
        square.call(&1);
        square.call(&2);
        square.call(&1);
        // evicts 2
        square.call(&3);
        assert_eq!(calls.get(), 3);
        square.call(&1);
        assert_eq!(calls.get(), 3);
        square.call(&2);
        assert_eq!(calls.get(), 4);
        assert_eq!(square.len(), 2);
        assert_eq!(square.stats().evictions, 2);
    }

    #[test]
    fn shallow_strategy_uses_identity() {
        let (calls, counted) = counter();
        let len = Memoizer::with_strategy(ShallowEq, MemoConfig::default(), move |v: &Arc<Vec<u8>>| {
            counted.set(counted.get() + 1);
            v.len()
        });
        let a = Arc::new(vec![1, 2]);
        len.call(&a);
        len.call(&a.clone());
        assert_eq!(calls.get(), 1);
        // equal contents, different allocation
        len.call(&Arc::new(vec![1, 2]));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn independent_memoizers_do_not_share_entries() {
        let a = Memoizer::with_strategy(KeyFn(|x: &u8| *x), MemoConfig::default(), |x: &u8| *x as u32);
        let b = Memoizer::with_strategy(KeyFn(|x: &u8| *x), MemoConfig::default(), |x: &u8| *x as u32 + 1);
        assert_eq!(a.call(&1), 1);
        assert_eq!(b.call(&1), 2);
        assert_ne!(a.info().id(), b.info().id());
        a.clear();
        assert!(a.is_empty());
        assert_eq!(b.len(), 1);
    }
}
