//! Memoized functions and composable memoized selectors.
//!
//! A [`Memoizer`] wraps a pure function and returns cached results for repeated arguments. A
//! [`MemoizedSelector`] derives a value from a state snapshot: it evaluates its input selectors,
//! and recomputes its projector only when one of their outputs changed.

// the derive macro refers to `::memoria::Data`
extern crate self as memoria;

mod cache;
mod config;
mod data;
mod error;
mod feature;
mod key;
mod memo_id;
mod memoize;
mod selector;
mod sync;

pub use crate::{
    cache::CacheStats,
    config::{Capacity, MemoConfig},
    data::Data,
    error::{ConfigError, KeyError},
    feature::{create_feature_selector, create_path_selector, FeatureSelector, PathSelector},
    key::{CanonicalJson, KeyFn, KeyStrategy, ShallowEq, StructuralEq},
    memo_id::{MemoId, MemoInfo},
    memoize::{Memoizer, TryMemoizer},
    selector::{
        create_selector, create_selector_shallow, create_selector_with, BoxedSelector, InputSelectors,
        MemoizedSelector, Projector, Selector,
    },
    sync::SyncMemoizer,
};
pub use memoria_macros::Data;
