//! Keys identifying the resource a loader is tracking.
//!
//! Any cloneable, structurally comparable value can act as a key. Change
//! detection uses `Eq`, never identity, so two separately built keys with the
//! same content refer to the same resource.

use nutype::nutype;
use std::fmt::Debug;
use std::hash::Hash;

/// Bound for values usable as a loader key; typically a URL, a path or a
/// query descriptor struct.
///
/// `Hash` is part of the bound so that keys can also index shared caches.
pub trait ResourceKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> ResourceKey for T {}

/// A validated resource path such as `/posts` or `/users/42`.
///
/// `ResourcePath` values are guaranteed to be non-empty, trimmed and at most
/// 2048 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 2048),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourcePath(String);

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_key<K: ResourceKey>(_key: &K) {}

    #[test]
    fn resource_path_is_trimmed() {
        let path = ResourcePath::try_new("  /posts  ").expect("valid path");

        assert_eq!(path.as_ref(), "/posts");
    }

    #[test]
    fn blank_resource_path_is_rejected() {
        assert!(ResourcePath::try_new("   ").is_err());
    }

    #[test]
    fn equal_content_means_equal_key() {
        let first = ResourcePath::try_new("/posts").expect("valid path");
        let second = ResourcePath::try_new("/posts".to_string()).expect("valid path");

        assert_key(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn structs_are_keys() {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        struct Query {
            page: u32,
            search: String,
        }

        assert_key(&Query {
            page: 1,
            search: "rust".to_string(),
        });
    }
}
