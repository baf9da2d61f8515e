//! Exact-line anchors: an unmarked run of lines inserted once and removed verbatim.

use crate::Position;
use crate::block::prepend_index;
use crate::lines::Lines;

pub(crate) fn apply(buf: &mut Lines, position: Position, fragment: &[String]) {
    if buf.find_run(fragment).is_some() {
        return;
    }
    let idx = match position {
        Position::Append => buf.len(),
        Position::Prepend => prepend_index(buf),
    };
    buf.insert(idx, fragment);
}

pub(crate) fn revert(buf: &mut Lines, fragment: &[String]) {
    while let Some(idx) = buf.find_run(fragment) {
        buf.remove(idx..idx + fragment.len());
    }
}
