//! # docmerge
//!
//! Merge tool-owned fragments into JSON and TOML documents that users also
//! edit, and remove them again without touching anything else.
//!
//! Ownership is recorded inside the document itself:
//!
//! - object values merged by the tool carry a marker entry (for example
//!   `"_veneer": "managed"`)
//! - scalar values cannot carry a marker, so their keys are listed in a ledger
//!   entry named `<marker key>:owned` on the containing object
//!
//! A merge never overwrites a key the user defined. An unmerge removes only
//! what is tagged, and drops containers that became empty because of it.

mod edit;
pub mod error;
mod tree;

pub use error::{Error, Result};

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tree::{display_key, is_empty_container, prune_empty, walk_mut};

/// On-disk syntax of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Toml => write!(f, "toml"),
        }
    }
}

/// The key/value pair that tags an entry as tool-owned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub key: String,
    pub value: Value,
}

impl Marker {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether `entry` is an object carrying this marker
    pub fn is_tagged(&self, entry: &Value) -> bool {
        entry
            .as_object()
            .and_then(|o| o.get(&self.key))
            .is_some_and(|v| *v == self.value)
    }

    /// Name of the entry listing owned scalar keys
    pub fn ledger_key(&self) -> String {
        format!("{}:owned", self.key)
    }

    fn tag(&self, entry: &Value) -> Value {
        let mut entry = entry.clone();
        if let Some(map) = entry.as_object_mut() {
            map.insert(self.key.clone(), self.value.clone());
        }
        entry
    }

    fn strip(&self, entry: &Value) -> Value {
        let mut entry = entry.clone();
        if let Some(map) = entry.as_object_mut() {
            map.shift_remove(&self.key);
        }
        entry
    }

    fn read_ledger(&self, map: &Map<String, Value>) -> Vec<String> {
        map.get(&self.ledger_key())
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Shape of the container a fragment is merged into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// A map: fragment keys become entries of the container
    #[default]
    Object,
    /// A list: fragment entries are appended to the container
    Array,
}

/// A container inside a document, addressed by a key path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Key path from the document root; empty for the root itself
    pub key: Vec<String>,
    #[serde(default)]
    pub shape: Shape,
    /// Field that identifies array entries across merges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl Target {
    pub fn object<S: AsRef<str>>(key: &[S]) -> Self {
        Self {
            key: key.iter().map(|s| s.as_ref().to_string()).collect(),
            shape: Shape::Object,
            identity: None,
        }
    }

    pub fn array<S: AsRef<str>>(key: &[S], identity: Option<&str>) -> Self {
        Self {
            key: key.iter().map(|s| s.as_ref().to_string()).collect(),
            shape: Shape::Array,
            identity: identity.map(str::to_string),
        }
    }

    pub fn display_key(&self) -> String {
        display_key(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Style {
    indent: String,
    trailing_newline: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            trailing_newline: true,
        }
    }
}

impl Style {
    /// Infer indentation from the first indented line
    fn detect(text: &str) -> Self {
        let indent = text
            .lines()
            .skip(1)
            .map(|line| {
                line.chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .collect::<String>()
            })
            .find(|ws| !ws.is_empty())
            .unwrap_or_else(|| "  ".to_string());
        Self {
            indent,
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }
}

/// A parsed structured document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
    format: Format,
    style: Style,
    /// TOML text as read, with the value it parsed to
    source: Option<(String, Value)>,
}

impl Document {
    /// An empty document, used when the file does not exist yet
    pub fn empty(format: Format) -> Self {
        Self {
            root: Value::Object(Map::new()),
            format,
            style: Style::default(),
            source: None,
        }
    }

    /// Parse `text`; blank text yields an empty document
    pub fn parse(text: &str, format: Format) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::empty(format));
        }
        let root: Value = match format {
            Format::Json => serde_json::from_str(text)?,
            Format::Toml => toml::from_str(text)?,
        };
        if !root.is_object() {
            return Err(Error::RootNotObject);
        }
        let source = match format {
            Format::Json => None,
            Format::Toml => Some((text.to_string(), root.clone())),
        };
        Ok(Self {
            root,
            format,
            style: Style::detect(text),
            source,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Whether the document has no entries at all
    pub fn is_empty(&self) -> bool {
        is_empty_container(&self.root)
    }

    /// Serialise the document, keeping the detected indentation for JSON.
    ///
    /// TOML is written back through the text it was read from, so comments
    /// and layout outside the merged entries stay as they were.
    pub fn render(&self) -> Result<String> {
        let mut out = match self.format {
            Format::Json => {
                let mut buf = Vec::new();
                let formatter =
                    serde_json::ser::PrettyFormatter::with_indent(self.style.indent.as_bytes());
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                self.root.serialize(&mut ser)?;
                String::from_utf8_lossy(&buf).into_owned()
            }
            Format::Toml => {
                let empty = Value::Object(Map::new());
                let (mut doc, old) = match &self.source {
                    Some((text, value)) => (text.parse::<toml_edit::DocumentMut>()?, value),
                    None => (toml_edit::DocumentMut::new(), &empty),
                };
                edit::sync_document(&mut doc, old, &self.root);
                doc.to_string()
            }
        };
        let ends = out.ends_with('\n');
        if self.style.trailing_newline && !ends {
            out.push('\n');
        } else if !self.style.trailing_newline && ends {
            out.pop();
        }
        Ok(out)
    }

    /// Merge `fragment` into the container addressed by `target`.
    ///
    /// Returns whether the document changed.
    pub fn merge(&mut self, marker: &Marker, target: &Target, fragment: &Value) -> Result<bool> {
        let before = self.root.clone();
        let key = target.display_key();
        let container = walk_mut(&mut self.root, &target.key, Some(target.shape))?
            .ok_or_else(|| Error::NotAnObject { key: key.clone() })?;

        match target.shape {
            Shape::Object => {
                let map = container
                    .as_object_mut()
                    .ok_or_else(|| Error::NotAnObject { key: key.clone() })?;
                let desired = fragment.as_object().ok_or(Error::BadFragment {
                    key,
                    expected: "an object",
                })?;
                merge_object(map, marker, desired);
            }
            Shape::Array => {
                let items = container
                    .as_array_mut()
                    .ok_or_else(|| Error::NotAnArray { key: key.clone() })?;
                let desired = fragment.as_array().ok_or_else(|| Error::BadFragment {
                    key: key.clone(),
                    expected: "an array",
                })?;
                merge_array(items, marker, target.identity.as_deref(), desired, &key)?;
            }
        }
        Ok(self.root != before)
    }

    /// Remove every tool-owned entry from the container addressed by `target`.
    ///
    /// Returns whether the document changed. A missing container is a no-op.
    pub fn unmerge(&mut self, marker: &Marker, target: &Target) -> Result<bool> {
        let before = self.root.clone();
        let key = target.display_key();
        let Some(container) = walk_mut(&mut self.root, &target.key, None)? else {
            return Ok(false);
        };

        let emptied = match target.shape {
            Shape::Object => {
                let map = container
                    .as_object_mut()
                    .ok_or(Error::NotAnObject { key })?;
                let ledger_key = marker.ledger_key();
                let ledger = marker.read_ledger(map);
                map.retain(|k, v| !(*k == ledger_key || ledger.contains(k) || marker.is_tagged(v)));
                map.is_empty()
            }
            Shape::Array => {
                let items = container
                    .as_array_mut()
                    .ok_or(Error::NotAnArray { key })?;
                items.retain(|entry| !marker.is_tagged(entry));
                items.is_empty()
            }
        };

        let changed = self.root != before;
        if changed && emptied {
            prune_empty(&mut self.root, &target.key);
        }
        Ok(changed)
    }
}

fn merge_object(map: &mut Map<String, Value>, marker: &Marker, desired: &Map<String, Value>) {
    let ledger_key = marker.ledger_key();
    let mut ledger = marker.read_ledger(map);

    for (k, v) in desired {
        if *k == marker.key || *k == ledger_key {
            log::warn!("fragment key `{k}` is reserved for ownership tracking, skipping");
            continue;
        }
        let owned = ledger.contains(k) || map.get(k).is_some_and(|e| marker.is_tagged(e));
        if map.contains_key(k) && !owned {
            log::debug!("keeping user-defined `{k}`");
            continue;
        }
        ledger.retain(|owned| owned != k);
        if v.is_object() {
            map.insert(k.clone(), marker.tag(v));
        } else {
            map.insert(k.clone(), v.clone());
            ledger.push(k.clone());
        }
    }

    // Entries we own that the fragment no longer mentions
    map.retain(|k, v| {
        *k == ledger_key
            || desired.contains_key(k)
            || !(ledger.contains(k) || marker.is_tagged(v))
    });
    ledger.retain(|k| desired.contains_key(k) && map.contains_key(k));

    if ledger.is_empty() {
        map.shift_remove(&ledger_key);
    } else {
        let keys = ledger.into_iter().map(Value::String).collect();
        map.insert(ledger_key, Value::Array(keys));
    }
}

fn merge_array(
    items: &mut Vec<Value>,
    marker: &Marker,
    identity: Option<&str>,
    desired: &[Value],
    key: &str,
) -> Result<()> {
    let mut tagged = Vec::with_capacity(desired.len());
    for (index, entry) in desired.iter().enumerate() {
        if !entry.is_object() {
            return Err(Error::UntaggableEntry {
                key: key.to_string(),
                index,
            });
        }
        tagged.push(marker.tag(entry));
    }

    match identity {
        Some(field) => items.retain(|existing| {
            !(marker.is_tagged(existing)
                && tagged
                    .iter()
                    .any(|d| same_identity(marker, existing, d, field)))
        }),
        None => items.retain(|existing| !marker.is_tagged(existing)),
    }
    items.extend(tagged);
    Ok(())
}

/// Entries match on their identity field, or on their whole untagged content
/// when neither has the field
fn same_identity(marker: &Marker, a: &Value, b: &Value, field: &str) -> bool {
    match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => x == y,
        (None, None) => marker.strip(a) == marker.strip(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn marker() -> Marker {
        Marker::new("_veneer", "managed")
    }

    fn json_doc(value: &Value) -> Document {
        Document::parse(&value.to_string(), Format::Json).unwrap()
    }

    fn hooks() -> Target {
        Target::array(&["hooks", "PostToolUse"], Some("matcher"))
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a/settings.json")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("pyproject.toml")).unwrap(), Format::Toml);
        assert!(matches!(
            Format::from_path(Path::new("notes.yaml")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn object_merge_into_missing_container() {
        let mut doc = Document::empty(Format::Json);
        let changed = doc
            .merge(
                &marker(),
                &Target::object(&["env"]),
                &json!({"VENEER_HOME": ".veneer", "opts": {"fast": true}}),
            )
            .unwrap();
        assert!(changed);
        assert_eq!(
            doc.value(),
            &json!({"env": {
                "VENEER_HOME": ".veneer",
                "_veneer:owned": ["VENEER_HOME"],
                "opts": {"fast": true, "_veneer": "managed"},
            }})
        );
    }

    #[test]
    fn object_merge_keeps_user_keys() {
        let mut doc = json_doc(&json!({"env": {"EDITOR": "vim"}}));
        doc.merge(
            &marker(),
            &Target::object(&["env"]),
            &json!({"EDITOR": "code", "PAGER": "less"}),
        )
        .unwrap();
        let env = &doc.value()["env"];
        assert_eq!(env["EDITOR"], "vim");
        assert_eq!(env["PAGER"], "less");
        assert_eq!(env["_veneer:owned"], json!(["PAGER"]));
    }

    #[test]
    fn object_merge_overwrites_owned_and_prunes_stale() {
        let m = marker();
        let target = Target::object(&["env"]);
        let mut doc = Document::empty(Format::Json);
        doc.merge(&m, &target, &json!({"A": "1", "B": "2"})).unwrap();
        doc.merge(&m, &target, &json!({"A": "3"})).unwrap();
        assert_eq!(
            doc.value(),
            &json!({"env": {"A": "3", "_veneer:owned": ["A"]}})
        );
    }

    #[test]
    fn object_merge_is_idempotent() {
        let m = marker();
        let target = Target::object(&["env"]);
        let fragment = json!({"A": "1", "nested": {"x": 1}});
        let mut doc = Document::empty(Format::Json);
        assert!(doc.merge(&m, &target, &fragment).unwrap());
        assert!(!doc.merge(&m, &target, &fragment).unwrap());
    }

    #[test]
    fn array_merge_appends_tagged_entries() {
        let original = json!({"hooks": {"PostToolUse": [{"matcher": "Write", "command": "fmt"}]}});
        let mut doc = json_doc(&original);
        doc.merge(
            &marker(),
            &hooks(),
            &json!([{"matcher": "Edit", "command": "veneer lint"}]),
        )
        .unwrap();
        assert_eq!(
            doc.value()["hooks"]["PostToolUse"],
            json!([
                {"matcher": "Write", "command": "fmt"},
                {"matcher": "Edit", "command": "veneer lint", "_veneer": "managed"},
            ])
        );
    }

    #[test]
    fn array_merge_replaces_same_identity_without_duplicates() {
        let m = marker();
        let mut doc = Document::empty(Format::Json);
        doc.merge(&m, &hooks(), &json!([{"matcher": "Edit", "command": "old"}]))
            .unwrap();
        let changed = doc
            .merge(&m, &hooks(), &json!([{"matcher": "Edit", "command": "new"}]))
            .unwrap();
        assert!(changed);
        assert_eq!(
            doc.value()["hooks"]["PostToolUse"],
            json!([{"matcher": "Edit", "command": "new", "_veneer": "managed"}])
        );
        let again = doc
            .merge(&m, &hooks(), &json!([{"matcher": "Edit", "command": "new"}]))
            .unwrap();
        assert!(!again);
    }

    #[test]
    fn array_merge_without_identity_replaces_all_tagged() {
        let m = marker();
        let target = Target::array(&["plugins"], None);
        let mut doc = json_doc(&json!({"plugins": [{"name": "user"}]}));
        doc.merge(&m, &target, &json!([{"name": "a"}, {"name": "b"}])).unwrap();
        doc.merge(&m, &target, &json!([{"name": "b"}])).unwrap();
        assert_eq!(
            doc.value()["plugins"],
            json!([{"name": "user"}, {"name": "b", "_veneer": "managed"}])
        );
    }

    #[test]
    fn array_entries_must_be_objects() {
        let err = Document::empty(Format::Json)
            .merge(&marker(), &Target::array(&["list"], None), &json!(["plain"]))
            .unwrap_err();
        assert!(matches!(err, Error::UntaggableEntry { index: 0, .. }));
    }

    #[test]
    fn target_of_wrong_type_is_an_error() {
        let mut doc = json_doc(&json!({"env": "oops"}));
        let err = doc
            .merge(&marker(), &Target::object(&["env"]), &json!({"A": 1}))
            .unwrap_err();
        assert!(matches!(err, Error::NotAnObject { .. }));

        let mut doc = json_doc(&json!({"list": {}}));
        let err = doc
            .merge(&marker(), &Target::array(&["list"], None), &json!([]))
            .unwrap_err();
        assert!(matches!(err, Error::NotAnArray { .. }));
    }

    #[test]
    fn unmerge_removes_only_tagged_and_keeps_user_entries() {
        let m = marker();
        let mut doc = json_doc(&json!({"hooks": {"PostToolUse": [{"matcher": "Write"}]}}));
        doc.merge(&m, &hooks(), &json!([{"matcher": "Edit"}])).unwrap();
        assert!(doc.unmerge(&m, &hooks()).unwrap());
        assert_eq!(
            doc.value(),
            &json!({"hooks": {"PostToolUse": [{"matcher": "Write"}]}})
        );
    }

    #[test]
    fn unmerge_drops_containers_it_emptied() {
        let m = marker();
        let mut doc = json_doc(&json!({"model": "x"}));
        doc.merge(&m, &hooks(), &json!([{"matcher": "Edit"}])).unwrap();
        doc.merge(&m, &Target::object(&["env"]), &json!({"A": "1"})).unwrap();
        doc.unmerge(&m, &hooks()).unwrap();
        doc.unmerge(&m, &Target::object(&["env"])).unwrap();
        assert_eq!(doc.value(), &json!({"model": "x"}));
    }

    #[test]
    fn unmerge_keeps_containers_that_were_already_empty() {
        let mut doc = json_doc(&json!({"hooks": {"PostToolUse": []}}));
        assert!(!doc.unmerge(&marker(), &hooks()).unwrap());
        assert_eq!(doc.value(), &json!({"hooks": {"PostToolUse": []}}));
    }

    #[test]
    fn unmerge_missing_container_is_noop() {
        let mut doc = json_doc(&json!({"a": 1}));
        assert!(!doc.unmerge(&marker(), &hooks()).unwrap());
    }

    #[test]
    fn json_round_trip_restores_text() {
        let original = "{\n    \"model\": \"x\",\n    \"env\": {\n        \"EDITOR\": \"vim\"\n    }\n}\n";
        let m = marker();
        let mut doc = Document::parse(original, Format::Json).unwrap();
        doc.merge(&m, &Target::object(&["env"]), &json!({"PAGER": "less"})).unwrap();
        doc.merge(&m, &hooks(), &json!([{"matcher": "Edit"}])).unwrap();
        let merged = doc.render().unwrap();
        assert!(merged.contains("\n    \"env\""));

        let mut doc = Document::parse(&merged, Format::Json).unwrap();
        doc.unmerge(&m, &Target::object(&["env"])).unwrap();
        doc.unmerge(&m, &hooks()).unwrap();
        assert_eq!(doc.render().unwrap(), original);
    }

    #[test]
    fn toml_merge_and_unmerge() {
        let original = "[project]\nname = \"demo\"\n";
        let m = Marker::new("_veneer", true);
        let target = Target::object(&["tool", "veneer"]);
        let mut doc = Document::parse(original, Format::Toml).unwrap();
        doc.merge(&m, &target, &json!({"enabled": true})).unwrap();
        let rendered = doc.render().unwrap();
        assert!(rendered.contains("[tool.veneer]"));
        assert!(rendered.contains("enabled = true"));

        let mut doc = Document::parse(&rendered, Format::Toml).unwrap();
        doc.unmerge(&m, &target).unwrap();
        assert_eq!(doc.value(), &json!({"project": {"name": "demo"}}));
    }

    #[test]
    fn toml_comments_survive_merge_and_unmerge() {
        let original = "# my project\n[project]\nname = \"demo\" # the name\n";
        let m = Marker::new("_veneer", true);
        let target = Target::object(&["tool", "veneer"]);

        let mut doc = Document::parse(original, Format::Toml).unwrap();
        doc.merge(&m, &target, &json!({"enabled": true})).unwrap();
        let merged = doc.render().unwrap();
        assert!(merged.starts_with(original));
        assert!(merged.contains("[tool.veneer]"));

        let mut doc = Document::parse(&merged, Format::Toml).unwrap();
        assert!(doc.unmerge(&m, &target).unwrap());
        assert_eq!(doc.render().unwrap(), original);
    }

    #[test]
    fn new_toml_document_renders_tables() {
        let mut doc = Document::empty(Format::Toml);
        doc.merge(
            &marker(),
            &Target::object(&["tool", "veneer"]),
            &json!({"enabled": true}),
        )
        .unwrap();
        let rendered = doc.render().unwrap();
        assert!(rendered.contains("[tool.veneer]"));
        assert!(rendered.contains("enabled = true"));
        let back = Document::parse(&rendered, Format::Toml).unwrap();
        assert_eq!(back.value(), doc.value());
    }

    #[test]
    fn malformed_and_non_object_documents_are_rejected() {
        assert!(matches!(
            Document::parse("{ not json", Format::Json),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            Document::parse("[1, 2]", Format::Json),
            Err(Error::RootNotObject)
        ));
        assert!(Document::parse("  \n", Format::Json).unwrap().is_empty());
    }

    #[test]
    fn tab_indentation_is_preserved() {
        let original = "{\n\t\"a\": 1\n}\n";
        let doc = Document::parse(original, Format::Json).unwrap();
        assert_eq!(doc.render().unwrap(), original);
    }
}
