//! `{{ name }}` placeholder rendering for overlay content
//!
//! Variables come from the project being reconciled:
//!
//! - `project_name`, `tool_version`, `root`
//! - every overlay and settings `[vars]` entry (carried in the context)
//! - `has.<capability>`, rendered as `true` or `false`

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown template variable `{name}` on line {line}")]
    UnknownVariable { name: String, line: usize },
}

/// Substitute every placeholder in `template` using `lookup`
pub fn render<F>(template: &str, lookup: F) -> Result<String, RenderError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = None;
    let out = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                if missing.is_none() {
                    let offset = caps.get(0).map_or(0, |m| m.start());
                    let line = template[..offset].matches('\n').count() + 1;
                    missing = Some(RenderError::UnknownVariable {
                        name: name.to_string(),
                        line,
                    });
                }
                String::new()
            }
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(out.into_owned()),
    }
}

/// Render every string leaf of a JSON value; keys are left alone
pub fn render_value<F>(value: &Value, lookup: &F) -> Result<Value, RenderError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(match value {
        Value::String(s) => Value::String(render(s, lookup)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, lookup))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, lookup)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Variable lookup over a reconcile context
pub fn context_vars(ctx: &reconcile::Context) -> impl Fn(&str) -> Option<String> + '_ {
    move |name| match name {
        "project_name" => Some(ctx.project_name()),
        "tool_version" => Some(ctx.tool_version().to_string()),
        "root" => Some(ctx.root().display().to_string()),
        _ => match name.strip_prefix("has.") {
            Some(cap) => Some(ctx.has_capability(cap).to_string()),
            None => ctx.var(name).map(str::to_string),
        },
    }
}
