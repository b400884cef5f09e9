//! Immutable snapshots of state tree content.
//!
//! Containers are reference counted, so cloning a node is cheap and a node
//! handed to a subscriber can never change underneath it. Updates go through
//! [`StateNode::with_value_at`] and [`StateNode::without`], which copy only the
//! spine from the root to the touched node and share every other subtree.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::path::{Path, PathElement};

/// Kind of a container node, as reported in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerKind {
    /// Keyed mapping.
    Map,
    /// Ordered sequence.
    List,
}

/// One node of the state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateNode {
    /// Entries with unique string keys.
    Mapping(Arc<BTreeMap<String, StateNode>>),
    /// Ordered entries.
    Sequence(Arc<Vec<StateNode>>),
    /// Any JSON value that is neither an object nor an array.
    Scalar(Value),
}

impl StateNode {
    /// The `null` scalar, also used for paths that do not resolve.
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(Value::Null)
    }

    /// Builds a mapping from its entries.
    #[must_use]
    pub fn mapping(entries: impl IntoIterator<Item = (String, Self)>) -> Self {
        Self::Mapping(Arc::new(entries.into_iter().collect()))
    }

    /// Builds a sequence from its items.
    #[must_use]
    pub fn sequence(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Sequence(Arc::new(items.into_iter().collect()))
    }

    /// Converts a JSON document, turning objects and arrays into containers.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_json(value))),
            ),
            Value::Array(items) => Self::sequence(items.into_iter().map(Self::from_json)),
            scalar => Self::Scalar(scalar),
        }
    }

    /// Renders the node back into a JSON document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_json()))
                    .collect(),
            ),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Scalar(value) => value.clone(),
        }
    }

    /// Returns the container kind, or `None` for scalars.
    #[must_use]
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match self {
            Self::Mapping(_) => Some(ContainerKind::Map),
            Self::Sequence(_) => Some(ContainerKind::List),
            Self::Scalar(_) => None,
        }
    }

    /// Returns `true` for mappings and sequences.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.container_kind().is_some()
    }

    /// Number of direct children; zero for scalars.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Mapping(entries) => entries.len(),
            Self::Sequence(items) => items.len(),
            Self::Scalar(_) => 0,
        }
    }

    /// Returns `true` when the node has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a direct child.
    #[must_use]
    pub fn child(&self, element: &PathElement) -> Option<&Self> {
        match (self, element) {
            (Self::Mapping(entries), PathElement::Key(key)) => entries.get(key),
            (Self::Sequence(items), PathElement::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Resolves a descendant.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Self> {
        path.elements()
            .iter()
            .try_fold(self, |node, element| node.child(element))
    }

    /// Returns a copy of this tree with `value` stored at `path`.
    ///
    /// Missing mapping levels are created on the way down. A key step through
    /// a scalar replaces the scalar with a new mapping.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when an index step does not land inside an
    /// existing sequence.
    pub fn with_value_at(&self, path: &Path, value: Self) -> Result<Self, UpdateError> {
        self.replace(path.elements(), Some(value), path)
    }

    /// Returns a copy of this tree with the node at `path` removed.
    ///
    /// Removing a path that does not exist yields an identical tree. Removing
    /// the root yields `null`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] when an index step does not land inside an
    /// existing sequence.
    pub fn without(&self, path: &Path) -> Result<Self, UpdateError> {
        if path.is_root() {
            return Ok(Self::null());
        }
        if self.get(path).is_none() {
            return Ok(self.clone());
        }
        self.replace(path.elements(), None, path)
    }

    fn replace(
        &self,
        elements: &[PathElement],
        value: Option<Self>,
        full_path: &Path,
    ) -> Result<Self, UpdateError> {
        let Some((head, rest)) = elements.split_first() else {
            return Ok(value.unwrap_or_else(Self::null));
        };
        match head {
            PathElement::Key(key) => {
                let mut entries = match self {
                    Self::Mapping(entries) => (**entries).clone(),
                    _ => BTreeMap::new(),
                };
                if rest.is_empty() && value.is_none() {
                    entries.remove(key);
                } else {
                    let current = entries.get(key).cloned().unwrap_or_else(Self::null);
                    entries.insert(key.clone(), current.replace(rest, value, full_path)?);
                }
                Ok(Self::Mapping(Arc::new(entries)))
            }
            PathElement::Index(index) => {
                let Self::Sequence(items) = self else {
                    return Err(UpdateError::NotASequence {
                        path: full_path.to_string(),
                    });
                };
                let mut items = (**items).clone();
                let Some(current) = items.get(*index).cloned() else {
                    return Err(UpdateError::IndexOutOfBounds {
                        path: full_path.to_string(),
                        index: *index,
                        len: items.len(),
                    });
                };
                if rest.is_empty() && value.is_none() {
                    items.remove(*index);
                } else if let Some(slot) = items.get_mut(*index) {
                    *slot = current.replace(rest, value, full_path)?;
                }
                Ok(Self::Sequence(Arc::new(items)))
            }
        }
    }
}

impl Default for StateNode {
    fn default() -> Self {
        Self::null()
    }
}

impl From<Value> for StateNode {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

/// Errors raised while deriving an updated tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// An index step met something other than a sequence.
    #[error("cannot index into non-sequence at '{path}'")]
    NotASequence {
        /// Path being updated.
        path: String,
    },
    /// An index step was past the end of its sequence.
    #[error("index {index} out of bounds for sequence of length {len} at '{path}'")]
    IndexOutOfBounds {
        /// Path being updated.
        path: String,
        /// Requested position.
        index: usize,
        /// Length of the sequence.
        len: usize,
    },
}
