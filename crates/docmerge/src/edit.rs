//! Write a merged TOML value back into the user's own document
//!
//! The merge logic works on `serde_json::Value`. Rendering diffs the value
//! parsed from the file against the merged one and applies only the
//! differences to a `toml_edit` document, so comments, whitespace and key
//! order of everything the merge did not touch survive.

use serde_json::{Map, Value};
use toml_edit::{ArrayOfTables, Datetime, DocumentMut, InlineTable, Item, Table, TableLike};

/// Key `toml` uses when a datetime is deserialised into a generic value
const DATETIME_KEY: &str = "$__toml_private_datetime";

/// Bring `doc` (which reads as `old`) in line with `new`
pub(crate) fn sync_document(doc: &mut DocumentMut, old: &Value, new: &Value) {
    let empty = Map::new();
    let old = old.as_object().unwrap_or(&empty);
    if let Some(new) = new.as_object() {
        sync_table(doc.as_table_mut(), old, new, false);
    }
}

fn sync_table(
    table: &mut dyn TableLike,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    inline: bool,
) {
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        table.remove(key);
    }
    for (key, value) in new {
        let before = old.get(key);
        if before == Some(value) {
            continue;
        }
        match table.get_mut(key) {
            Some(slot) => update(slot, before, value),
            None => {
                if let Some(item) = to_item(value, inline) {
                    table.insert(key, item);
                }
            }
        }
    }
}

fn update(slot: &mut Item, old: Option<&Value>, new: &Value) {
    match (old, new) {
        (Some(Value::Object(old)), Value::Object(new)) if !is_datetime(new) => {
            let inline = matches!(slot, Item::Value(_));
            if let Some(table) = slot.as_table_like_mut() {
                sync_table(table, old, new, inline);
                return;
            }
        }
        (Some(Value::Array(old)), Value::Array(new)) => {
            if sync_array(slot, old, new) {
                return;
            }
        }
        _ => {}
    }
    replace(slot, new);
}

/// Rebuild an array in place, reusing the original entries that are unchanged
fn sync_array(slot: &mut Item, old: &[Value], new: &[Value]) -> bool {
    match slot {
        Item::ArrayOfTables(tables) if tables.len() == old.len() && !new.is_empty() => {
            let existing: Vec<Table> = tables.iter().cloned().collect();
            let Some(rebuilt) = reuse(old, &existing, new, |v| match to_item(v, false) {
                Some(Item::Table(t)) => Some(t),
                _ => None,
            }) else {
                return false;
            };
            let mut out = ArrayOfTables::new();
            for table in rebuilt {
                out.push(table);
            }
            *tables = out;
            true
        }
        Item::Value(toml_edit::Value::Array(items)) if items.len() == old.len() => {
            let existing: Vec<toml_edit::Value> = items.iter().cloned().collect();
            let Some(rebuilt) = reuse(old, &existing, new, to_value) else {
                return false;
            };
            items.clear();
            for value in rebuilt {
                items.push_formatted(value);
            }
            true
        }
        _ => false,
    }
}

/// Map each entry of `new` to an unused equal entry of `old` (taking its
/// formatted counterpart from `formatted`), or build a fresh one
fn reuse<T: Clone>(
    old: &[Value],
    formatted: &[T],
    new: &[Value],
    build: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    let mut used = vec![false; old.len()];
    new.iter()
        .map(|value| {
            match (0..old.len()).find(|&i| !used[i] && old[i] == *value) {
                Some(i) => {
                    used[i] = true;
                    formatted.get(i).cloned()
                }
                None => build(value),
            }
        })
        .collect()
}

/// Overwrite a changed value, keeping the surrounding comments and whitespace
fn replace(slot: &mut Item, new: &Value) {
    let inline = matches!(slot, Item::Value(_));
    let Some(mut item) = to_item(new, inline) else {
        *slot = Item::None;
        return;
    };
    if let (Item::Value(old), Item::Value(value)) = (&*slot, &mut item) {
        *value.decor_mut() = old.decor().clone();
    }
    *slot = item;
}

fn is_datetime(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.contains_key(DATETIME_KEY)
}

/// Convert to an item: a `[table]` or `[[array]]` outside inline context,
/// an inline value otherwise
fn to_item(value: &Value, inline: bool) -> Option<Item> {
    if !inline {
        match value {
            Value::Object(map) if !is_datetime(map) => {
                let mut table = Table::new();
                table.set_implicit(true);
                for (k, v) in map {
                    if let Some(item) = to_item(v, false) {
                        table.insert(k, item);
                    }
                }
                return Some(Item::Table(table));
            }
            Value::Array(items)
                if !items.is_empty()
                    && items
                        .iter()
                        .all(|v| v.as_object().is_some_and(|m| !is_datetime(m))) =>
            {
                let mut tables = ArrayOfTables::new();
                for entry in items {
                    if let Some(Item::Table(table)) = to_item(entry, false) {
                        tables.push(table);
                    }
                }
                return Some(Item::ArrayOfTables(tables));
            }
            _ => {}
        }
    }
    to_value(value).map(Item::Value)
}

fn to_value(value: &Value) -> Option<toml_edit::Value> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => n
            .as_i64()
            .map(toml_edit::Value::from)
            .or_else(|| n.as_f64().map(toml_edit::Value::from)),
        Value::String(s) => Some(s.as_str().into()),
        Value::Array(items) => Some(toml_edit::Value::Array(
            items.iter().filter_map(to_value).collect(),
        )),
        Value::Object(map) if is_datetime(map) => map
            .get(DATETIME_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Datetime>().ok())
            .map(toml_edit::Value::from),
        Value::Object(map) => {
            let mut table = InlineTable::new();
            for (k, v) in map {
                if let Some(v) = to_value(v) {
                    table.insert(k.as_str(), v);
                }
            }
            Some(toml_edit::Value::InlineTable(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn synced(text: &str, new: Value) -> String {
        let old: Value = toml::from_str(text).unwrap();
        let mut doc: DocumentMut = text.parse().unwrap();
        sync_document(&mut doc, &old, &new);
        doc.to_string()
    }

    #[test]
    fn unchanged_value_keeps_text() {
        let text = "# top\n[a]\nx = 1 # one\n\n[b]\ny = [1, 2]\n";
        let old: Value = toml::from_str(text).unwrap();
        assert_eq!(synced(text, old), text);
    }

    #[test]
    fn changed_scalar_keeps_its_comment() {
        let out = synced("x = 1 # one\ny = 2\n", json!({"x": 5, "y": 2}));
        assert!(out.starts_with("x = 5"));
        assert!(out.contains("# one"));
        assert!(out.ends_with("y = 2\n"));
    }

    #[test]
    fn new_table_is_added_and_removed_cleanly() {
        let text = "# mine\n[project]\nname = \"demo\"\n";
        let added = synced(
            text,
            json!({"project": {"name": "demo"}, "tool": {"veneer": {"on": true}}}),
        );
        assert!(added.starts_with(text));
        assert!(added.contains("[tool.veneer]\non = true\n"));
        assert!(!added.contains("[tool]\n"));

        assert_eq!(synced(&added, json!({"project": {"name": "demo"}})), text);
    }

    #[test]
    fn array_of_tables_keeps_untouched_entries() {
        let text = "[[hook]]\n# keep me\ncmd = \"mine\"\n";
        let out = synced(
            text,
            json!({"hook": [{"cmd": "mine"}, {"cmd": "tool", "_m": true}]}),
        );
        assert!(out.starts_with(text));
        assert!(out.contains("cmd = \"tool\""));
    }
}
