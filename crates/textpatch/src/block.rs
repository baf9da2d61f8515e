//! Marker-delimited blocks
//!
//! The fragment lives between a start and an end marker line. Patching an
//! existing block rewrites only the lines between the markers. A new block is
//! separated from the content beside it by exactly one blank line: before the
//! block when appended, after it when prepended. Removing a block also removes
//! that one separator line, so patch then unpatch gives back the original.

use crate::Position;
use crate::error::{Error, Result};
use crate::lines::Lines;

/// Locate the first `start`..`end` marker pair, returning both line indices
fn find(buf: &Lines, start: &str, end: &str) -> Result<Option<(usize, usize)>> {
    let Some(s) = buf.find_marker(start, 0) else {
        return Ok(None);
    };
    let e = buf
        .find_marker(end, s + 1)
        .ok_or_else(|| Error::UnterminatedBlock {
            marker: start.to_string(),
            line: s + 1,
        })?;
    Ok(Some((s, e)))
}

/// First line index a prepended block may occupy (after a shebang)
pub(crate) fn prepend_index(buf: &Lines) -> usize {
    usize::from(buf.starts_with(0, "#!"))
}

pub(crate) fn wrap(start: &str, end: &str, body: &[String]) -> Vec<String> {
    let mut block = Vec::with_capacity(body.len() + 2);
    block.push(start.to_string());
    block.extend(body.iter().cloned());
    block.push(end.to_string());
    block
}

pub(crate) fn check_body(start: &str, end: &str, body: &[String]) -> Result<()> {
    if body.is_empty() {
        return Err(Error::EmptyFragment);
    }
    if let Some(line) = body
        .iter()
        .find(|l| l.trim() == start.trim() || l.trim() == end.trim())
    {
        return Err(Error::MarkerInFragment(line.clone()));
    }
    Ok(())
}

pub(crate) fn apply(
    buf: &mut Lines,
    start: &str,
    end: &str,
    position: Position,
    body: &[String],
) -> Result<()> {
    if let Some((s, e)) = find(buf, start, end)? {
        buf.replace(s + 1..e, body);
        return Ok(());
    }

    let mut block = wrap(start, end, body);
    match position {
        Position::Append => {
            let idx = buf.len();
            if idx > 0 {
                block.insert(0, String::new());
            }
            buf.insert(idx, &block);
        }
        Position::Prepend => {
            let idx = prepend_index(buf);
            if idx < buf.len() {
                block.push(String::new());
            }
            buf.insert(idx, &block);
        }
    }
    Ok(())
}

pub(crate) fn revert(
    buf: &mut Lines,
    start: &str,
    end: &str,
    position: Position,
) -> Result<()> {
    while let Some((s, e)) = find(buf, start, end)? {
        buf.remove(s..e + 1);
        drop_separator(buf, s, position);
    }
    Ok(())
}

/// Remove the blank separator `apply` put on the block's `position` side
fn drop_separator(buf: &mut Lines, idx: usize, position: Position) {
    let blank = match position {
        Position::Append => idx.checked_sub(1).filter(|&i| buf.is_blank(i)),
        Position::Prepend => Some(idx).filter(|&i| buf.is_blank(i)),
    };
    if let Some(i) = blank {
        buf.remove(i..i + 1);
    }
}
