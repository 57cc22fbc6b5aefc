//! Memoizer configuration.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// How many entries a memo cache may hold.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// The cache never shrinks.
    #[default]
    Unbounded,
    /// Least-recently-used entries are evicted beyond this many entries.
    Lru(NonZeroUsize),
}

impl Capacity {
    /// Bounded capacity. Fails if `entries` is zero.
    pub fn lru(entries: usize) -> Result<Capacity, ConfigError> {
        NonZeroUsize::new(entries)
            .map(Capacity::Lru)
            .ok_or(ConfigError::ZeroCapacity)
    }

    /// Capacity of one: only the last arguments are remembered.
    pub const fn last_only() -> Capacity {
        Capacity::Lru(NonZeroUsize::MIN)
    }

    /// Returns the entry limit, or `None` if unbounded.
    pub fn limit(&self) -> Option<usize> {
        match *self {
            Capacity::Unbounded => None,
            Capacity::Lru(n) => Some(n.get()),
        }
    }
}

/// Configuration of a memoizer or a memoized selector.
///
/// Deserializable so that hosts can keep cache sizes in their own config files:
///
/// ```
/// let config = memoria::MemoConfig::from_json_str(r#"{ "name": "visible_todos", "capacity": { "lru": 16 } }"#).unwrap();
/// assert_eq!(config.capacity.limit(), Some(16));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoConfig {
    /// Label used in log events. Defaults to the source location of the memoizer.
    pub name: Option<String>,
    pub capacity: Capacity,
}

impl MemoConfig {
    pub fn new() -> MemoConfig {
        MemoConfig::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> MemoConfig {
        self.name = Some(name.into());
        self
    }

    pub fn with_capacity(mut self, capacity: Capacity) -> MemoConfig {
        self.capacity = capacity;
        self
    }

    /// Sets an LRU capacity of `entries`.
    pub fn lru(self, entries: usize) -> Result<MemoConfig, ConfigError> {
        Ok(self.with_capacity(Capacity::lru(entries)?))
    }

    pub fn from_json_str(json: &str) -> Result<MemoConfig, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
