//! Sub-paths and nested async nodes
//!
//! One async action can manage many independent [`AsyncState`] entries, one
//! per runtime key (contract id, ISP address, ...). The key sequence that
//! locates an entry below the action's base node is a [`SubPath`].
//!
//! Nodes implement [`AsyncNode`]:
//! - [`AsyncNode::probe`] is a read-only lookup and never creates anything
//! - [`AsyncNode::materialize`] creates missing map entries and a fresh leaf state

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::async_state::AsyncState;

/// A single segment of a [`SubPath`]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(i64),
    Key(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "{}", i),
            PathKey::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathKey {
    fn from(s: &str) -> Self {
        PathKey::Key(s.to_string())
    }
}

impl From<String> for PathKey {
    fn from(s: String) -> Self {
        PathKey::Key(s)
    }
}

impl From<&String> for PathKey {
    fn from(s: &String) -> Self {
        PathKey::Key(s.clone())
    }
}

impl From<i64> for PathKey {
    fn from(i: i64) -> Self {
        PathKey::Index(i)
    }
}

impl From<i32> for PathKey {
    fn from(i: i32) -> Self {
        PathKey::Index(i64::from(i))
    }
}

impl From<u32> for PathKey {
    fn from(i: u32) -> Self {
        PathKey::Index(i64::from(i))
    }
}

/// Ordered key sequence locating one entity's state below a base node
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubPath(Vec<PathKey>);

impl SubPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<PathKey>) {
        self.0.push(key.into());
    }

    pub fn as_slice(&self) -> &[PathKey] {
        &self.0
    }
}

impl Deref for SubPath {
    type Target = [PathKey];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<PathKey>> for SubPath {
    fn from(keys: Vec<PathKey>) -> Self {
        Self(keys)
    }
}

impl<K: Into<PathKey>> FromIterator<K> for SubPath {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for SubPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", key)?;
        }
        f.write_str("]")
    }
}

/// Build a [`SubPath`] from keys.
///
/// ```
/// use async_dispatch_core::{subpath, PathKey};
///
/// let path = subpath!["contracts", 7];
/// assert_eq!(path.len(), 2);
/// assert_eq!(path[1], PathKey::Index(7));
/// ```
#[macro_export]
macro_rules! subpath {
    ($($key:expr),* $(,)?) => {
        $crate::SubPath::from(vec![$($crate::PathKey::from($key)),*])
    };
}

/// A node of the state tree that holds async states, directly or nested in maps.
pub trait AsyncNode<T> {
    /// Read-only lookup. Returns `None` as soon as a segment is missing.
    fn probe(&self, path: &[PathKey]) -> Option<&AsyncState<T>>;

    /// Writing lookup. Creates missing segments, with a fresh state at the leaf.
    ///
    /// Returns `None` only when `path` does not fit the node's shape
    /// (too short for a nested map, or too long for a leaf).
    fn materialize(&mut self, path: &[PathKey]) -> Option<&mut AsyncState<T>>;
}

impl<T> AsyncNode<T> for AsyncState<T> {
    fn probe(&self, path: &[PathKey]) -> Option<&AsyncState<T>> {
        path.is_empty().then_some(self)
    }

    fn materialize(&mut self, path: &[PathKey]) -> Option<&mut AsyncState<T>> {
        if path.is_empty() {
            Some(self)
        } else {
            None
        }
    }
}

impl<T, N> AsyncNode<T> for BTreeMap<PathKey, N>
where
    N: AsyncNode<T> + Default,
{
    fn probe(&self, path: &[PathKey]) -> Option<&AsyncState<T>> {
        let (first, rest) = path.split_first()?;
        self.get(first)?.probe(rest)
    }

    fn materialize(&mut self, path: &[PathKey]) -> Option<&mut AsyncState<T>> {
        let (first, rest) = path.split_first()?;
        self.entry(first.clone()).or_default().materialize(rest)
    }
}

/// Async states indexed by a single runtime key
pub type AsyncMap<T> = BTreeMap<PathKey, AsyncState<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_never_creates() {
        let map: AsyncMap<u32> = AsyncMap::new();
        assert!(map.probe(&subpath!["c1"]).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_materialize_creates_leaf() {
        let mut map: AsyncMap<u32> = AsyncMap::new();
        let leaf = map.materialize(&subpath!["c1"]).expect("leaf");
        leaf.data = Some(3);

        assert_eq!(map.len(), 1);
        assert_eq!(map.probe(&subpath!["c1"]).and_then(|s| s.data), Some(3));
    }

    #[test]
    fn test_nested_maps() {
        let mut tree: BTreeMap<PathKey, AsyncMap<u32>> = BTreeMap::new();
        tree.materialize(&subpath!["isp-1", 4]).expect("leaf").data = Some(9);

        assert!(tree.probe(&subpath!["isp-1"]).is_none());
        assert!(tree.probe(&subpath!["isp-2", 4]).is_none());
        assert_eq!(tree.probe(&subpath!["isp-1", 4]).and_then(|s| s.data), Some(9));
    }

    #[test]
    fn test_leaf_rejects_extra_segments() {
        let mut state: AsyncState<u32> = AsyncState::new();
        assert!(state.probe(&[]).is_some());
        assert!(state.materialize(&subpath!["x"]).is_none());
    }

    #[test]
    fn test_subpath_display() {
        assert_eq!(subpath!["a", 1].to_string(), "[a, 1]");
        let collected: SubPath = ["x", "y"].into_iter().collect();
        assert_eq!(collected, subpath!["x", "y"]);
    }
}
