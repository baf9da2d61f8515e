//! Navigation helpers over a `serde_json::Value` tree

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::Shape;

pub(crate) fn display_key(key: &[String]) -> String {
    if key.is_empty() {
        "(root)".to_string()
    } else {
        key.join(".")
    }
}

/// Walk `key` from `root`, returning the value at the end of the path.
///
/// With `create` set, missing segments are inserted as empty objects and a
/// missing leaf is inserted with the given shape. Without it a missing
/// segment yields `None`.
pub(crate) fn walk_mut<'a>(
    root: &'a mut Value,
    key: &[String],
    create: Option<Shape>,
) -> Result<Option<&'a mut Value>> {
    let mut current = root;
    for (i, segment) in key.iter().enumerate() {
        let map = current.as_object_mut().ok_or_else(|| Error::NotAnObject {
            key: display_key(&key[..i]),
        })?;
        let Some(shape) = create else {
            match map.get_mut(segment) {
                Some(next) => {
                    current = next;
                    continue;
                }
                None => return Ok(None),
            }
        };
        let leaf = i + 1 == key.len();
        current = map
            .entry(segment.clone())
            .or_insert_with(|| empty(if leaf { shape } else { Shape::Object }));
    }
    Ok(Some(current))
}

fn empty(shape: Shape) -> Value {
    match shape {
        Shape::Object => Value::Object(Map::new()),
        Shape::Array => Value::Array(Vec::new()),
    }
}

pub(crate) fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Remove the container at `key` if it is empty, then each ancestor that is
/// left empty by that removal. The root itself is never removed.
pub(crate) fn prune_empty(root: &mut Value, key: &[String]) {
    for depth in (1..=key.len()).rev() {
        let (parent_key, child) = (&key[..depth - 1], &key[depth - 1]);
        let Ok(Some(parent)) = walk_mut(root, parent_key, None) else {
            return;
        };
        let Some(map) = parent.as_object_mut() else {
            return;
        };
        if !map.get(child).is_some_and(is_empty_container) {
            return;
        }
        map.shift_remove(child);
    }
}
