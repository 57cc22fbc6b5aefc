//! Feature selectors over dynamic JSON state.
//!
//! When the state tree is a `serde_json::Value` rather than a Rust struct, these selectors pick a
//! slice of it, and serve as inputs to memoized selectors like any closure would.
use crate::selector::Selector;
use serde_json::Value;
use tracing::{trace, warn};

/// Selects a top-level key of an object state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSelector {
    key: String,
}

impl FeatureSelector {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Selector<Value> for FeatureSelector {
    type Output = Value;

    fn select(&self, state: &Value) -> Value {
        match state.get(&self.key) {
            Some(feature) => feature.clone(),
            None => {
                warn!(feature = %self.key, "feature not found in state");
                Value::Null
            }
        }
    }
}

/// Selects the top-level `key` of the state, or `null` if it is missing.
///
/// ```
/// use memoria::{create_feature_selector, Selector};
/// use serde_json::json;
///
/// let select_users = create_feature_selector("users");
/// assert_eq!(select_users.select(&json!({"users": [1, 2]})), json!([1, 2]));
/// assert!(select_users.select(&json!({})).is_null());
/// ```
pub fn create_feature_selector(key: impl Into<String>) -> FeatureSelector {
    FeatureSelector { key: key.into() }
}

//==================================================================================================

/// Selects a nested value of the state by JSON pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSelector {
    pointer: String,
}

impl PathSelector {
    pub fn pointer(&self) -> &str {
        &self.pointer
    }
}

impl Selector<Value> for PathSelector {
    type Output = Value;

    fn select(&self, state: &Value) -> Value {
        match state.pointer(&self.pointer) {
            Some(value) => value.clone(),
            None => {
                trace!(pointer = %self.pointer, "no value at pointer");
                Value::Null
            }
        }
    }
}

/// Selects the value at a JSON pointer (e.g. `/filters/minAge`), or `null` if there is none.
///
/// The empty pointer selects the whole state.
pub fn create_path_selector(pointer: impl Into<String>) -> PathSelector {
    PathSelector { pointer: pointer.into() }
}
