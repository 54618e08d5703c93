//! The merged result tree
//!
//! Results of every partition land in one `ResultTree`. A row is written by
//! walking its group-by values as a key path (creating mappings as needed)
//! and then setting each of the row's aliases at the innermost mapping.
//! Only the aliases a row carries are touched; anything already stored at
//! that mapping by another partition stays in place.
//!
//! ```text
//! group_by = []                 {alias: value, ...}
//! group_by = [user]             {user1: {alias: value, ...}, ...}
//! group_by = [region, sub]      {region1: {region1_a: {alias: value}}, ...}
//! ```

use crate::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::btree_map::{self, BTreeMap};

/// An entry of the tree: a scalar or a nested mapping
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Value(Value),
    Tree(ResultTree),
}

impl Node {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(v) => Some(v),
            Node::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ResultTree> {
        match self {
            Node::Tree(t) => Some(t),
            Node::Value(_) => None,
        }
    }

    /// Look up `key` if this node is a mapping
    pub fn get(&self, key: impl Into<Value>) -> Option<&Node> {
        self.as_tree().and_then(|t| t.get(key))
    }
}

/// Nested mapping keyed by group-by values, with alias → value at the leaves
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTree {
    entries: BTreeMap<Value, Node>,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: impl Into<Value>) -> Option<&Node> {
        self.entries.get(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<Value>) -> bool {
        self.entries.contains_key(&key.into())
    }

    /// Follow `path` through nested mappings
    ///
    /// An empty path yields `None`; the root is not a `Node`.
    pub fn get_path(&self, path: &[Value]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.entries.get(first)?;
        for key in rest {
            node = node.as_tree()?.entries.get(key)?;
        }
        Some(node)
    }

    /// Scalar stored at `path`, if the path ends in a value
    pub fn value_at(&self, path: &[Value]) -> Option<&Value> {
        self.get_path(path).and_then(Node::as_value)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Value, Node> {
        self.entries.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Value, Node> {
        self.entries.keys()
    }

    /// Set `key` to `value` at the mapping found by walking `path`
    pub fn set_path(&mut self, path: &[Value], key: Value, value: Value) {
        self.subtree_mut(path).entries.insert(key, Node::Value(value));
    }

    /// Merge `(alias, value)` pairs into the mapping at `path`
    ///
    /// Existing entries at that mapping whose keys are not among `pairs` are
    /// left untouched; matching keys are overwritten.
    pub fn merge_at<I>(&mut self, path: &[Value], pairs: I)
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let target = self.subtree_mut(path);
        for (key, value) in pairs {
            target.entries.insert(key, Node::Value(value));
        }
    }

    /// Mapping at `path`, creating intermediate mappings as needed
    fn subtree_mut(&mut self, path: &[Value]) -> &mut ResultTree {
        let Some((key, rest)) = path.split_first() else {
            return self;
        };
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Node::Tree(ResultTree::new()))
            .tree_mut(key)
            .subtree_mut(rest)
    }
}

impl Node {
    /// This node as a mapping; a scalar found here is replaced by an empty one
    fn tree_mut(&mut self, key: &Value) -> &mut ResultTree {
        match self {
            Node::Tree(tree) => tree,
            Node::Value(existing) => {
                tracing::warn!(
                    "Replacing value {} at key '{}' with a nested mapping",
                    existing,
                    key
                );
                *self = Node::Tree(ResultTree::new());
                self.tree_mut(key)
            }
        }
    }
}

impl<'a> IntoIterator for &'a ResultTree {
    type Item = (&'a Value, &'a Node);
    type IntoIter = btree_map::Iter<'a, Value, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Value(v) => v.serialize(serializer),
            Node::Tree(t) => t.serialize(serializer),
        }
    }
}

impl Serialize for ResultTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(&key.to_string(), node)?;
        }
        map.end()
    }
}
