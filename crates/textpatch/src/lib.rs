//! # textpatch
//!
//! Idempotent patching of free-form text files that humans also edit.
//!
//! Two strategies are supported:
//!
//! - **Block**: the fragment is wrapped between a start and an end marker line.
//!   Re-patching rewrites only what sits between the markers; reverting removes
//!   the markers and everything between them.
//! - **Lines**: an exact run of lines with no markers (for example a single
//!   link line). It is inserted only when an identical run is not already
//!   present, and reverting removes every identical run.
//!
//! Both are fixed points: `apply(apply(x)) == apply(x)`.
//!
//! ## Example
//!
//! ```
//! use textpatch::Patch;
//!
//! let patch = Patch::block("# >>> tool >>>", "# <<< tool <<<", "export PATH=\"$HOME/.tool/bin:$PATH\"");
//! let once = patch.apply(Some("alias ll='ls -l'\n")).unwrap();
//! let twice = patch.apply(Some(&once)).unwrap();
//! assert_eq!(once, twice);
//! assert_eq!(patch.revert(&once).unwrap(), "alias ll='ls -l'\n");
//! ```

mod anchor;
mod block;
pub mod error;
mod lines;

pub use error::{Error, Result};

use lines::{Lines, split_fragment};
use serde::Serialize;

/// How the fragment is delimited inside the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Fragment wrapped between two marker lines
    Block { start: String, end: String },
    /// Fragment inserted verbatim and recognised by exact line match
    Lines,
}

/// Where a fragment goes when it is not present yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// End of file
    #[default]
    Append,
    /// Start of file, after a `#!` line if there is one
    Prepend,
}

/// A fragment together with the strategy used to apply and revert it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patch {
    #[serde(flatten)]
    pub strategy: Strategy,
    pub position: Position,
    pub fragment: String,
    /// Leading text written only when the file has to be created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl Patch {
    /// A marker-delimited block patch
    pub fn block(
        start: impl Into<String>,
        end: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            strategy: Strategy::Block {
                start: start.into(),
                end: end.into(),
            },
            position: Position::Append,
            fragment: fragment.into(),
            header: None,
        }
    }

    /// An exact-line patch
    pub fn lines(fragment: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Lines,
            position: Position::Prepend,
            fragment: fragment.into(),
            header: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Insert or refresh the fragment.
    ///
    /// `existing` is `None` when the file does not exist; the result is then
    /// the optional header followed by the fragment.
    pub fn apply(&self, existing: Option<&str>) -> Result<String> {
        let body = self.body()?;

        let Some(text) = existing else {
            return Ok(self.create(&body));
        };

        let mut buf = Lines::parse(text);
        match &self.strategy {
            Strategy::Block { start, end } => {
                block::apply(&mut buf, start, end, self.position, &body)?;
            }
            Strategy::Lines => anchor::apply(&mut buf, self.position, &body),
        }
        Ok(buf.render())
    }

    /// Remove the fragment, leaving everything else in place
    pub fn revert(&self, existing: &str) -> Result<String> {
        let mut buf = Lines::parse(existing);
        match &self.strategy {
            Strategy::Block { start, end } => {
                block::revert(&mut buf, start, end, self.position)?;
            }
            Strategy::Lines => {
                let body = split_fragment(&self.fragment);
                if !body.is_empty() {
                    anchor::revert(&mut buf, &body);
                }
            }
        }
        Ok(buf.render())
    }

    /// Whether applying would leave `existing` unchanged
    pub fn is_applied(&self, existing: &str) -> Result<bool> {
        Ok(self.apply(Some(existing))? == existing)
    }

    fn body(&self) -> Result<Vec<String>> {
        let body = split_fragment(&self.fragment);
        match &self.strategy {
            Strategy::Block { start, end } => block::check_body(start, end, &body)?,
            Strategy::Lines if body.is_empty() => return Err(Error::EmptyFragment),
            Strategy::Lines => {}
        }
        Ok(body)
    }

    fn create(&self, body: &[String]) -> String {
        let mut lines = Vec::new();
        if let Some(header) = &self.header {
            lines.extend(split_fragment(header));
            lines.push(String::new());
        }
        match &self.strategy {
            Strategy::Block { start, end } => lines.extend(block::wrap(start, end, body)),
            Strategy::Lines => lines.extend(body.iter().cloned()),
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
