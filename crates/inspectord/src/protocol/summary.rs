//! One-level, canonical rendering of a state node.
//!
//! A summary lists the commands available at a node followed by its direct
//! children. Container children are replaced by reference stubs carrying the
//! child's path, kind, and size, so a summary never grows with subtree depth.
//! Object keys are emitted in sorted order, which makes two summaries equal
//! exactly when their serialised text is equal.

use inspector_state::{CommandSet, PathElement, StateNode};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// Canonical serialised summary.
#[derive(Debug, Clone)]
pub struct Summary {
    raw: Box<RawValue>,
}

impl Summary {
    /// Serialised text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.raw.get()
    }

    pub(crate) fn as_raw(&self) -> &RawValue {
        &self.raw
    }
}

impl PartialEq for Summary {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Summary {}

/// Summarises `node` as seen at `path`, listing `commands` first.
///
/// # Errors
///
/// Returns the serialiser error if the summary cannot be rendered.
pub fn summarize(
    path: &str,
    node: &StateNode,
    commands: &CommandSet,
) -> Result<Summary, serde_json::Error> {
    let mut entries: Vec<Value> = commands
        .iter()
        .map(|(name, info)| {
            let mut entry = info.clone();
            entry.insert("command".to_owned(), Value::String(name.clone()));
            Value::Object(entry)
        })
        .collect();

    match node {
        StateNode::Mapping(children) => entries.extend(children.iter().map(|(key, child)| {
            child_entry(
                path,
                &PathElement::Key(key.clone()),
                ("key", Value::String(key.clone())),
                child,
            )
        })),
        StateNode::Sequence(children) => {
            entries.extend(children.iter().enumerate().map(|(index, child)| {
                child_entry(
                    path,
                    &PathElement::Index(index),
                    ("index", Value::from(index)),
                    child,
                )
            }));
        }
        StateNode::Scalar(_) => {}
    }

    let text = serde_json::to_string(&canonical(Value::Array(entries)))?;
    RawValue::from_string(text).map(|raw| Summary { raw })
}

fn child_entry(
    parent: &str,
    element: &PathElement,
    (label, position): (&str, Value),
    child: &StateNode,
) -> Value {
    let mut entry = Map::new();
    entry.insert(label.to_owned(), position);
    match child.container_kind() {
        Some(kind) => {
            entry.insert(
                "path".to_owned(),
                Value::String(format!("{}/{element}", parent.trim_end_matches('/'))),
            );
            entry.insert("containerKind".to_owned(), Value::String(kind.to_string()));
            entry.insert("itemCount".to_owned(), Value::from(child.len()));
        }
        None => {
            entry.insert("value".to_owned(), child.to_json());
        }
    }
    Value::Object(entry)
}

/// Rebuilds every object with its keys in sorted order.
fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(left, _), (right, _)| left.cmp(right));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonical(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        scalar => scalar,
    }
}
