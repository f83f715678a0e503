//! Generic JSON document view.
//!
//! The state is a JSON object. `put` events write a value at a path and
//! `remove` events delete one; every other kind is left to other views.

use crate::path::{PathSegment, parse_path};
use crate::view::View;
use rewind_log::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Events understood by [`DocumentView`], tagged by event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DocumentEvent {
    /// Write `value` at `path`, creating intermediate objects
    Put {
        /// Target path in text form
        path: String,
        /// New value
        value: Value,
    },
    /// Delete the value at `path`
    Remove {
        /// Target path in text form
        path: String,
    },
}

impl DocumentEvent {
    /// Decode an event; `None` for kinds this view does not handle
    ///
    /// # Errors
    ///
    /// Returns error if a handled kind carries a malformed payload
    pub fn decode(event: &Event) -> rewind_core::CoreResult<Option<Self>> {
        match event.kind() {
            "put" | "remove" => {
                let payload: Value = event.decode_payload()?;
                let tagged = serde_json::json!({ "kind": event.kind(), "payload": payload });
                Ok(Some(serde_json::from_value(tagged)?))
            }
            _ => Ok(None),
        }
    }
}

/// View folding `put`/`remove` events into a JSON document
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentView;

impl View for DocumentView {
    type State = Value;

    fn initial_state(&self) -> Value {
        Value::Object(Map::new())
    }

    fn fold(&self, state: &Value, event: &Event) -> Option<Value> {
        let decoded = match DocumentEvent::decode(event) {
            Ok(decoded) => decoded?,
            Err(err) => {
                tracing::warn!(seq = %event.seq(), kind = event.kind(), %err, "undecodable payload");
                return None;
            }
        };

        let (path, value) = match &decoded {
            DocumentEvent::Put { path, value } => (path, Some(value)),
            DocumentEvent::Remove { path } => (path, None),
        };
        let path = match parse_path(path) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(seq = %event.seq(), %err, "bad document path");
                return None;
            }
        };

        let mut next = state.clone();
        match value {
            Some(value) => put(&mut next, &path, value.clone()),
            None => remove(&mut next, &path),
        }
        Some(next)
    }

    fn name(&self) -> &str {
        "document"
    }
}

fn put(target: &mut Value, path: &[PathSegment], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    let child = match first {
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            match target {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => return,
            }
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            match target {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                _ => return,
            }
        }
    };
    put(child, rest, value);
}

fn remove(target: &mut Value, path: &[PathSegment]) {
    let Some((last, parents)) = path.split_last() else {
        *target = Value::Object(Map::new());
        return;
    };
    let mut node = target;
    for segment in parents {
        let next = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return,
        }
    }
    match (last, node) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.remove(key);
        }
        (PathSegment::Index(index), Value::Array(items)) if *index < items.len() => {
            items.remove(*index);
        }
        _ => {}
    }
}
