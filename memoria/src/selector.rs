//! Memoized selectors.
//!
//! A memoized selector evaluates a list of input selectors against a state snapshot, then passes
//! their outputs to a projector through a memoizer keyed on those outputs. The projector only runs
//! again when at least one input changed; a new state snapshot whose inputs are unchanged is served
//! from the cache.
//!
//! Memoized selectors are selectors themselves, so they can feed other memoized selectors:
//!
//! ```
//! use memoria::{create_selector, Selector};
//!
//! struct AppState {
//!     todos: Vec<(String, bool)>,
//! }
//!
//! let select_done = create_selector(
//!     (|s: &AppState| s.todos.clone(),),
//!     |todos: &Vec<(String, bool)>| todos.iter().filter(|(_, done)| *done).cloned().collect::<Vec<_>>(),
//! );
//! let select_done_count = create_selector((select_done.clone(),), |done: &Vec<(String, bool)>| done.len());
//!
//! let state = AppState { todos: vec![("a".into(), true), ("b".into(), false)] };
//! assert_eq!(select_done_count.select(&state), 1);
//! ```
use crate::{
    cache::CacheStats,
    config::{Capacity, MemoConfig},
    key::{CanonicalJson, KeyStrategy, ShallowEq},
    memoize::Memoizer,
    Data,
};
use serde::Serialize;
use std::{cell::RefCell, fmt, marker::PhantomData, rc::Rc};
use tracing::trace;

/// A function from state to a value.
pub trait Selector<S: ?Sized> {
    type Output;
    fn select(&self, state: &S) -> Self::Output;
}

impl<S: ?Sized, T, F> Selector<S> for F
where
    F: Fn(&S) -> T,
{
    type Output = T;

    fn select(&self, state: &S) -> T {
        self(state)
    }
}

/// Selector with a type-erased implementation.
pub type BoxedSelector<S, T> = Box<dyn Selector<S, Output = T>>;

//==================================================================================================

/// The ordered list of input selectors of a memoized selector.
///
/// Implemented for tuples of selectors (each input can have its own output type) and for vectors of
/// boxed selectors with a common output type. Inputs are evaluated in declaration order.
pub trait InputSelectors<S: ?Sized> {
    /// The input values, in the order of the inputs.
    type Values;

    fn select_all(&self, state: &S) -> Self::Values;

    /// Number of inputs.
    fn arity(&self) -> usize;
}

/// Combines input values into the result of a memoized selector.
///
/// Implemented for `Fn(&V1, ..., &Vn) -> R` over tuples of input values, and for `Fn(&[V]) -> R`
/// over vectors.
pub trait Projector<Args> {
    type Output;
    fn project(&self, args: &Args) -> Self::Output;
}

macro_rules! impl_tuples {
    ($n:literal; $($T:ident $idx:tt),+) => {
        impl<S: ?Sized, $($T: Selector<S>),+> InputSelectors<S> for ($($T,)+) {
            type Values = ($($T::Output,)+);

            fn select_all(&self, state: &S) -> Self::Values {
                ($(self.$idx.select(state),)+)
            }

            fn arity(&self) -> usize {
                $n
            }
        }

        impl<Func, Out, $($T),+> Projector<($($T,)+)> for Func
        where
            Func: Fn($(&$T),+) -> Out,
        {
            type Output = Out;

            fn project(&self, args: &($($T,)+)) -> Out {
                self($(&args.$idx),+)
            }
        }
    };
}

impl_tuples!(1; T0 0);
impl_tuples!(2; T0 0, T1 1);
impl_tuples!(3; T0 0, T1 1, T2 2);
impl_tuples!(4; T0 0, T1 1, T2 2, T3 3);
impl_tuples!(5; T0 0, T1 1, T2 2, T3 3, T4 4);
impl_tuples!(6; T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);

impl<S: ?Sized, V> InputSelectors<S> for Vec<BoxedSelector<S, V>> {
    type Values = Vec<V>;

    fn select_all(&self, state: &S) -> Vec<V> {
        self.iter().map(|input| input.select(state)).collect()
    }

    fn arity(&self) -> usize {
        self.len()
    }
}

impl<F, R, V> Projector<Vec<V>> for F
where
    F: Fn(&[V]) -> R,
{
    type Output = R;

    fn project(&self, args: &Vec<V>) -> R {
        self(args)
    }
}

//==================================================================================================

struct SelectorInner<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    K: KeyStrategy<I::Values>,
{
    inputs: I,
    projector: Rc<P>,
    memo: Memoizer<I::Values, P::Output, K>,
    result_override: RefCell<Option<P::Output>>,
    _state: PhantomData<fn(&S)>,
}

/// A selector that recomputes its projector only when its input values change.
///
/// Clones share the same cache, so a clone can be handed to other selectors as an input.
pub struct MemoizedSelector<S, I, P, K = CanonicalJson>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    K: KeyStrategy<I::Values>,
{
    inner: Rc<SelectorInner<S, I, P, K>>,
}

impl<S, I, P, K> Clone for MemoizedSelector<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    K: KeyStrategy<I::Values>,
{
    fn clone(&self) -> Self {
        MemoizedSelector {
            inner: self.inner.clone(),
        }
    }
}

impl<S, I, P, K> MemoizedSelector<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    K: KeyStrategy<I::Values>,
{
    /// The projector, for testing it in isolation. Calling it bypasses the cache.
    pub fn projector(&self) -> &P {
        &self.inner.projector
    }

    /// The input selectors.
    pub fn inputs(&self) -> &I {
        &self.inner.inputs
    }

    /// The memoizer wrapping the projector.
    pub fn memoizer(&self) -> &Memoizer<I::Values, P::Output, K> {
        &self.inner.memo
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.memo.stats()
    }

    /// Drops all cached results. The next call recomputes.
    pub fn release(&self) {
        self.inner.memo.clear()
    }

    /// Makes the selector return `result` without evaluating anything, until `clear_result`.
    pub fn set_result(&self, result: P::Output) {
        trace!(memo = %self.inner.memo.info(), "result overridden");
        *self.inner.result_override.borrow_mut() = Some(result);
    }

    pub fn clear_result(&self) {
        self.inner.result_override.borrow_mut().take();
    }
}

impl<S, I, P, K> Selector<S> for MemoizedSelector<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    P::Output: Clone,
    K: KeyStrategy<I::Values>,
{
    type Output = P::Output;

    fn select(&self, state: &S) -> P::Output {
        if let Some(result) = self.inner.result_override.borrow().as_ref() {
            return result.clone();
        }
        let values = self.inner.inputs.select_all(state);
        self.inner.memo.call(&values)
    }
}

impl<S, I, P, K> fmt::Debug for MemoizedSelector<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values>,
    K: KeyStrategy<I::Values>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoizedSelector")
            .field("arity", &self.inner.inputs.arity())
            .field("memo", &self.inner.memo)
            .finish_non_exhaustive()
    }
}

//==================================================================================================

/// Creates a memoized selector keyed on the canonical JSON encoding of its input values, with an
/// unbounded cache.
#[track_caller]
pub fn create_selector<S, I, P>(inputs: I, projector: P) -> MemoizedSelector<S, I, P>
where
    S: ?Sized,
    I: InputSelectors<S>,
    I::Values: Serialize,
    P: Projector<I::Values> + 'static,
{
    create_selector_with(inputs, projector, CanonicalJson, MemoConfig::default())
}

/// Creates a memoized selector that remembers only its last input values, compared with
/// [`Data::same`] (reference equality for shared pointers).
#[track_caller]
pub fn create_selector_shallow<S, I, P>(inputs: I, projector: P) -> MemoizedSelector<S, I, P, ShallowEq>
where
    S: ?Sized,
    I: InputSelectors<S>,
    I::Values: Data,
    P: Projector<I::Values> + 'static,
{
    create_selector_with(
        inputs,
        projector,
        ShallowEq,
        MemoConfig::new().with_capacity(Capacity::last_only()),
    )
}

/// Creates a memoized selector with the given key strategy and cache configuration.
#[track_caller]
pub fn create_selector_with<S, I, P, K>(
    inputs: I,
    projector: P,
    strategy: K,
    config: MemoConfig,
) -> MemoizedSelector<S, I, P, K>
where
    S: ?Sized,
    I: InputSelectors<S>,
    P: Projector<I::Values> + 'static,
    K: KeyStrategy<I::Values>,
{
    let projector = Rc::new(projector);
    let memo = {
        let projector = projector.clone();
        Memoizer::with_strategy(strategy, config, move |values: &I::Values| projector.project(values))
    };
    MemoizedSelector {
        inner: Rc::new(SelectorInner {
            inputs,
            projector,
            memo,
            result_override: RefCell::new(None),
            _state: PhantomData,
        }),
    }
}
