//! # Error Trees
//!
//! Recursive error reporting for directives and the records they validate.
//!
//! A tree maps keys to nodes. Keys are field names, collection indices, or the
//! distinguished `base` key that holds messages about the node itself. A node
//! is either a list of messages or another tree:
//!
//! ```text
//! {
//!   "name":       { "base": ["is required"] },
//!   "line_items": { "1": { "quantity": { "base": ["is required"] } } }
//! }
//! ```
//!
//! Trees only grow: there is no removal API, and merging appends messages
//! rather than replacing them.

use crate::constants::messages::BASE_KEY;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key of an error-tree entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKey {
    /// Messages about the enclosing node itself
    Base,
    /// A named field, property, or model
    Field(String),
    /// Position of a member inside a validated collection
    Index(usize),
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str(BASE_KEY),
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for ErrorKey {
    fn from(key: &str) -> Self {
        if key == BASE_KEY {
            Self::Base
        } else {
            Self::Field(key.to_string())
        }
    }
}

impl From<String> for ErrorKey {
    fn from(key: String) -> Self {
        if key == BASE_KEY {
            Self::Base
        } else {
            Self::Field(key)
        }
    }
}

impl From<&String> for ErrorKey {
    fn from(key: &String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<usize> for ErrorKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl Serialize for ErrorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A node in an error tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorNode {
    /// Messages, serialized as a JSON array
    Leaf(Vec<String>),
    /// A nested tree, serialized as a JSON object
    Keyed(ErrorTree),
}

impl ErrorNode {
    pub fn as_tree(&self) -> Option<&ErrorTree> {
        match self {
            Self::Keyed(tree) => Some(tree),
            Self::Leaf(_) => None,
        }
    }

    pub fn messages(&self) -> Option<&[String]> {
        match self {
            Self::Leaf(messages) => Some(messages),
            Self::Keyed(_) => None,
        }
    }

    /// Fold `incoming` into this node, never dropping existing messages
    fn merge(&mut self, incoming: ErrorNode) {
        match incoming {
            Self::Leaf(more) => match self {
                Self::Leaf(existing) => existing.extend(more),
                Self::Keyed(tree) => tree.base_messages_mut().extend(more),
            },
            Self::Keyed(more) => {
                if let Self::Leaf(messages) = self {
                    let mut tree = ErrorTree::new();
                    tree.base_messages_mut().extend(std::mem::take(messages));
                    *self = Self::Keyed(tree);
                }
                if let Self::Keyed(existing) = self {
                    existing.merge(more);
                }
            }
        }
    }
}

impl Serialize for ErrorNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(messages) => messages.serialize(serializer),
            Self::Keyed(tree) => tree.serialize(serializer),
        }
    }
}

/// Recursive mapping from keys to messages or nested trees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTree {
    entries: BTreeMap<ErrorKey, ErrorNode>,
}

impl ErrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: impl Into<ErrorKey>) -> Option<&ErrorNode> {
        self.entries.get(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<ErrorKey>) -> bool {
        self.entries.contains_key(&key.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ErrorKey, &ErrorNode)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ErrorKey> {
        self.entries.keys()
    }

    /// Messages stored under this tree's own `base` key
    pub fn base_messages(&self) -> &[String] {
        match self.entries.get(&ErrorKey::Base) {
            Some(ErrorNode::Leaf(messages)) => messages,
            Some(ErrorNode::Keyed(tree)) => tree.base_messages(),
            None => &[],
        }
    }

    /// A subtree already stored under `base` keeps its entries and takes
    /// the messages in its own `base`
    fn base_messages_mut(&mut self) -> &mut Vec<String> {
        match self
            .entries
            .entry(ErrorKey::Base)
            .or_insert_with(|| ErrorNode::Leaf(Vec::new()))
        {
            ErrorNode::Leaf(messages) => messages,
            ErrorNode::Keyed(tree) => tree.base_messages_mut(),
        }
    }

    /// Append a message about the tree itself
    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_messages_mut().push(message.into());
    }

    /// Append `message` to `errors[key][base]`
    pub fn add(&mut self, key: impl Into<ErrorKey>, message: impl Into<String>) {
        self.nested_mut(key).add_base(message);
    }

    /// The subtree under `key`, created when absent.
    ///
    /// A leaf already stored under `key` is kept as the subtree's `base`
    /// messages.
    pub fn nested_mut(&mut self, key: impl Into<ErrorKey>) -> &mut ErrorTree {
        let node = self
            .entries
            .entry(key.into())
            .or_insert_with(|| ErrorNode::Keyed(ErrorTree::new()));
        if let ErrorNode::Leaf(messages) = node {
            let mut tree = ErrorTree::new();
            tree.entries
                .insert(ErrorKey::Base, ErrorNode::Leaf(std::mem::take(messages)));
            *node = ErrorNode::Keyed(tree);
        }
        match node {
            ErrorNode::Keyed(tree) => tree,
            ErrorNode::Leaf(_) => unreachable!("leaf promoted to a tree above"),
        }
    }

    /// Merge `other` under `key`. The key is recorded even when `other` is
    /// empty so that an invalid target always leaves a trace.
    pub fn merge_at(&mut self, key: impl Into<ErrorKey>, other: ErrorTree) {
        self.nested_mut(key).merge(other);
    }

    /// Deep merge of `other` into this tree
    pub fn merge(&mut self, other: ErrorTree) {
        for (key, node) in other.entries {
            match self.entries.get_mut(&key) {
                Some(existing) => existing.merge(node),
                None => {
                    self.entries.insert(key, node);
                }
            }
        }
    }

    /// Total number of messages anywhere in the tree
    pub fn message_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                ErrorNode::Leaf(messages) => messages.len(),
                ErrorNode::Keyed(tree) => tree.message_count(),
            })
            .sum()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a tree from its JSON form.
    ///
    /// Object keys that are all digits become indices and `base` becomes the
    /// base key; arrays of strings become leaves.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut tree = ErrorTree::new();
        for (key, node) in map {
            let key = match key.parse::<usize>() {
                Ok(index) => ErrorKey::Index(index),
                Err(_) => ErrorKey::from(key.as_str()),
            };
            let node = match node {
                Value::Array(items) => ErrorNode::Leaf(
                    items
                        .iter()
                        .map(|item| item.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()?,
                ),
                Value::Object(_) if key != ErrorKey::Base => {
                    ErrorNode::Keyed(Self::from_value(node)?)
                }
                _ => return None,
            };
            tree.entries.insert(key, node);
        }
        Some(tree)
    }
}

impl Serialize for ErrorTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_records_base_message() {
        let mut errors = ErrorTree::new();
        errors.add("name", "is required");
        assert_eq!(errors.to_value(), json!({"name": {"base": ["is required"]}}));
        assert_eq!(
            errors.get("name").and_then(ErrorNode::as_tree).map(ErrorTree::base_messages),
            Some(&["is required".to_string()][..])
        );
    }

    #[test]
    fn test_merge_at_index_nests_collection_members() {
        let mut member = ErrorTree::new();
        member.add("quantity", "is required");

        let mut errors = ErrorTree::new();
        errors.nested_mut("line_items").merge_at(1usize, member);

        assert_eq!(
            errors.to_value(),
            json!({"line_items": {"1": {"quantity": {"base": ["is required"]}}}})
        );
    }

    #[test]
    fn test_merge_appends_rather_than_replaces() {
        let mut errors = ErrorTree::new();
        errors.add("code", "is required");

        let mut more = ErrorTree::new();
        more.add("code", "is too short");
        more.add("status", "is invalid");
        errors.merge(more);

        assert_eq!(
            errors.to_value(),
            json!({
                "code": {"base": ["is required", "is too short"]},
                "status": {"base": ["is invalid"]}
            })
        );
        assert_eq!(errors.message_count(), 3);
    }

    #[test]
    fn test_leaf_promoted_when_tree_merged_over_it() {
        let mut errors = ErrorTree::new();
        errors.merge(ErrorTree::from_value(&json!({"order": ["was rejected"]})).unwrap());

        let mut nested = ErrorTree::new();
        nested.add("code", "is required");
        errors.merge_at("order", nested);

        assert_eq!(
            errors.to_value(),
            json!({"order": {"base": ["was rejected"], "code": {"base": ["is required"]}}})
        );
    }

    #[test]
    fn test_base_subtree_keeps_messages_on_add_base() {
        let mut errors = ErrorTree::new();
        errors.add("base", "first");
        errors.add_base("second");

        assert_eq!(errors.to_value(), json!({"base": {"base": ["first", "second"]}}));
        assert_eq!(errors.base_messages(), &["first".to_string(), "second".to_string()]);
        assert_eq!(errors.message_count(), 2);
    }

    #[test]
    fn test_leaf_merged_into_base_subtree_appends() {
        let mut errors = ErrorTree::new();
        errors.add("base", "first");

        let mut more = ErrorTree::new();
        more.add_base("second");
        errors.merge(more);

        assert_eq!(errors.message_count(), 2);
        assert_eq!(errors.to_value(), json!({"base": {"base": ["first", "second"]}}));
    }

    #[test]
    fn test_merge_at_with_empty_tree_still_records_key() {
        let mut errors = ErrorTree::new();
        errors.merge_at("order", ErrorTree::new());
        assert!(!errors.is_empty());
        assert_eq!(errors.to_value(), json!({"order": {}}));
    }

    #[test]
    fn test_from_value_round_trips_indices() {
        let value = json!({"items": {"0": {"base": ["bad"]}}, "base": ["oops"]});
        let tree = ErrorTree::from_value(&value).unwrap();
        assert!(tree.get("items").unwrap().as_tree().unwrap().contains_key(0usize));
        assert_eq!(tree.base_messages(), &["oops".to_string()]);
        assert_eq!(tree.to_value(), value);
    }

    #[test]
    fn test_from_value_rejects_non_string_messages() {
        assert!(ErrorTree::from_value(&json!({"a": [1]})).is_none());
        assert!(ErrorTree::from_value(&json!("text")).is_none());
    }
}
