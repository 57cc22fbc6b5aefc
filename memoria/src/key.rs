//! Cache key strategies.
//!
//! A strategy decides when two argument lists are "the same call". The memoizer asks it for a key
//! on every call, then looks the key up in its cache.
use crate::{data::Data, error::KeyError};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::hash_map::DefaultHasher,
    fmt::Write as _,
    hash::{Hash, Hasher},
};

/// Derives cache keys from argument lists.
pub trait KeyStrategy<A> {
    type Key;

    /// Computes the key for `args`. On error, the call bypasses the cache.
    fn key(&self, args: &A) -> Result<Self::Key, KeyError>;

    /// Whether two keys designate the same call.
    fn same(&self, a: &Self::Key, b: &Self::Key) -> bool;

    /// Hash of the key, consistent with `same`.
    ///
    /// Strategies returning `None` are matched by scanning entries, most recently used first.
    fn hash_key(&self, _key: &Self::Key) -> Option<u64> {
        None
    }
}

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

//==================================================================================================

/// Keys argument lists by their canonical JSON encoding.
///
/// Arguments that serialize identically share a key, even if they are distinct objects. Object
/// keys are written in sorted order, so maps that differ only by insertion order share a key too.
///
/// # Limitations
///
/// Non-finite floats encode as `null`: `f64::NAN`, `f64::INFINITY` and `None` all produce the same
/// key. Only use this strategy with plain data (numbers, strings, booleans, nested lists and maps).
#[derive(Copy, Clone, Debug, Default)]
pub struct CanonicalJson;

impl CanonicalJson {
    /// Returns the canonical encoding of `args`.
    pub fn encode<A: Serialize + ?Sized>(args: &A) -> Result<String, KeyError> {
        let value = serde_json::to_value(args)?;
        let mut out = String::new();
        write_canonical(&value, &mut out)?;
        Ok(out)
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), KeyError> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        scalar => {
            // writing to a String cannot fail
            let _ = write!(out, "{scalar}");
        }
    }
    Ok(())
}

impl<A: Serialize> KeyStrategy<A> for CanonicalJson {
    type Key = String;

    fn key(&self, args: &A) -> Result<String, KeyError> {
        CanonicalJson::encode(args)
    }

    fn same(&self, a: &String, b: &String) -> bool {
        a == b
    }

    fn hash_key(&self, key: &String) -> Option<u64> {
        Some(hash_one(key))
    }
}

//==================================================================================================

/// Keys argument lists by themselves, compared with [`Data::same`].
///
/// This is the reference-equality strategy: `Arc`/`Rc` arguments only match the very same
/// allocation, so a state slice that was replaced (even by an equal copy) is a new key, and a
/// slice that was carried over by structural sharing is a hit without any deep comparison.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShallowEq;

impl<A: Data> KeyStrategy<A> for ShallowEq {
    type Key = A;

    fn key(&self, args: &A) -> Result<A, KeyError> {
        Ok(args.clone())
    }

    fn same(&self, a: &A, b: &A) -> bool {
        a.same(b)
    }
}

//==================================================================================================

/// Keys argument lists by themselves, compared with `Eq` and hashed with `Hash`.
#[derive(Copy, Clone, Debug, Default)]
pub struct StructuralEq;

impl<A: Clone + Eq + Hash> KeyStrategy<A> for StructuralEq {
    type Key = A;

    fn key(&self, args: &A) -> Result<A, KeyError> {
        Ok(args.clone())
    }

    fn same(&self, a: &A, b: &A) -> bool {
        a == b
    }

    fn hash_key(&self, key: &A) -> Option<u64> {
        Some(hash_one(key))
    }
}

//==================================================================================================

/// Keys argument lists with a user-supplied function.
///
/// ```
/// use memoria::{KeyFn, MemoConfig, Memoizer};
/// // case-insensitive lookups
/// let upper = Memoizer::with_strategy(
///     KeyFn(|s: &String| s.to_lowercase()),
///     MemoConfig::default(),
///     |s: &String| s.to_uppercase(),
/// );
/// assert_eq!(upper.call(&"abc".to_string()), "ABC");
/// assert_eq!(upper.call(&"ABC".to_string()), "ABC");
/// assert_eq!(upper.stats().hits, 1);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct KeyFn<F>(pub F);

impl<A, F, Q> KeyStrategy<A> for KeyFn<F>
where
    F: Fn(&A) -> Q,
    Q: Eq + Hash,
{
    type Key = Q;

    fn key(&self, args: &A) -> Result<Q, KeyError> {
        Ok((self.0)(args))
    }

    fn same(&self, a: &Q, b: &Q) -> bool {
        a == b
    }

    fn hash_key(&self, key: &Q) -> Option<u64> {
        Some(hash_one(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{collections::HashMap, sync::Arc};

    #[test]
    fn structurally_equal_arguments_share_a_key() {
        let a = (vec![1, 2, 3], "x".to_string());
        let b = (vec![1, 2, 3], "x".to_string());
        assert_eq!(CanonicalJson.key(&a).unwrap(), CanonicalJson.key(&b).unwrap());
        assert_ne!(
            CanonicalJson.key(&a).unwrap(),
            CanonicalJson.key(&(vec![1, 2], "x".to_string())).unwrap()
        );
    }

    #[test]
    fn object_key_order_does_not_matter() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("k{i}"), i);
        }
        assert_eq!(CanonicalJson::encode(&first).unwrap(), CanonicalJson::encode(&second).unwrap());

        assert_eq!(
            CanonicalJson::encode(&json!({"b": 1, "a": {"d": [1, "\"q\""], "c": null}})).unwrap(),
            r#"{"a":{"c":null,"d":[1,"\"q\""]},"b":1}"#
        );
    }

    #[test]
    fn non_finite_floats_collide_with_null() {
        let nan = CanonicalJson::encode(&(f64::NAN,)).unwrap();
        let none = CanonicalJson::encode(&(None::<f64>,)).unwrap();
        assert_eq!(nan, none);
    }

    #[test]
    fn unserializable_arguments_are_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON object keys");
        assert!(matches!(CanonicalJson.key(&map), Err(KeyError::Serialize(_))));
    }

    #[test]
    fn shallow_eq_compares_identity() {
        type Args = (Arc<Vec<i32>>, u32);
        let users = Arc::new(vec![1, 2, 3]);
        let key = KeyStrategy::<Args>::key(&ShallowEq, &(users.clone(), 20)).unwrap();
        assert!(KeyStrategy::<Args>::same(&ShallowEq, &key, &(users.clone(), 20)));
        assert!(!KeyStrategy::<Args>::same(&ShallowEq, &key, &(Arc::new(vec![1, 2, 3]), 20)));
        assert_eq!(KeyStrategy::<Args>::hash_key(&ShallowEq, &key), None);
    }

    #[test]
    fn structural_eq_hashes() {
        type Args = Vec<i32>;
        let a = KeyStrategy::<Args>::key(&StructuralEq, &vec![1, 2]).unwrap();
        let b = KeyStrategy::<Args>::key(&StructuralEq, &vec![1, 2]).unwrap();
        assert!(KeyStrategy::<Args>::same(&StructuralEq, &a, &b));
        assert_eq!(
            KeyStrategy::<Args>::hash_key(&StructuralEq, &a),
            KeyStrategy::<Args>::hash_key(&StructuralEq, &b)
        );
    }
}
