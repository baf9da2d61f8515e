//! A line buffer that renders back to the exact bytes it was parsed from.

use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Lines {
    lines: Vec<String>,
    trailing_newline: bool,
    crlf: bool,
}

impl Lines {
    pub(crate) fn parse(text: &str) -> Self {
        let crlf = text.contains("\r\n");
        if text.is_empty() {
            return Self {
                crlf,
                ..Self::default()
            };
        }

        let (body, trailing_newline) = match text.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (text, false),
        };

        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
            crlf,
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn is_blank(&self, idx: usize) -> bool {
        self.lines.get(idx).is_some_and(|l| l.trim().is_empty())
    }

    pub(crate) fn starts_with(&self, idx: usize, prefix: &str) -> bool {
        self.lines.get(idx).is_some_and(|l| l.starts_with(prefix))
    }

    /// Index of the first line at or after `from` whose trimmed text equals `marker`
    pub(crate) fn find_marker(&self, marker: &str, from: usize) -> Option<usize> {
        let marker = marker.trim();
        (from..self.lines.len()).find(|&i| self.lines[i].trim() == marker)
    }

    /// Index of the first run of lines equal to `needle` (line endings ignored)
    pub(crate) fn find_run(&self, needle: &[String]) -> Option<usize> {
        if needle.is_empty() || needle.len() > self.lines.len() {
            return None;
        }
        (0..=self.lines.len() - needle.len()).find(|&start| {
            needle
                .iter()
                .zip(&self.lines[start..])
                .all(|(want, have)| have.trim_end_matches('\r') == want.as_str())
        })
    }

    /// Insert `new` before `idx`, using this buffer's line ending.
    ///
    /// The final-newline state is kept, except that an empty buffer gains one.
    pub(crate) fn insert(&mut self, idx: usize, new: &[String]) {
        if self.lines.is_empty() {
            self.trailing_newline = true;
        }
        let converted: Vec<String> = new.iter().map(|l| self.native(l)).collect();
        self.lines.splice(idx..idx, converted);
    }

    pub(crate) fn replace(&mut self, range: Range<usize>, new: &[String]) {
        let converted: Vec<String> = new.iter().map(|l| self.native(l)).collect();
        self.lines.splice(range, converted);
    }

    pub(crate) fn remove(&mut self, range: Range<usize>) {
        self.lines.drain(range);
    }

    fn native(&self, line: &str) -> String {
        if self.crlf {
            format!("{line}\r")
        } else {
            line.to_string()
        }
    }
}

/// Split a fragment into lines, dropping trailing newlines and carriage returns
pub(crate) fn split_fragment(fragment: &str) -> Vec<String> {
    let trimmed = fragment.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('\n')
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_is_lossless() {
        for text in ["", "\n", "a", "a\n", "a\n\n", "a\r\nb\r\n", "\n\nx"] {
            assert_eq!(Lines::parse(text).render(), text, "input {text:?}");
        }
    }

    #[test]
    fn insert_at_end_keeps_final_newline_state() {
        let mut buf = Lines::parse("a");
        buf.insert(1, &["b".to_string()]);
        assert_eq!(buf.render(), "a\nb");

        let mut buf = Lines::parse("a\n");
        buf.insert(1, &["b".to_string()]);
        assert_eq!(buf.render(), "a\nb\n");

        let mut buf = Lines::parse("");
        buf.insert(0, &["b".to_string()]);
        assert_eq!(buf.render(), "b\n");
    }

    #[test]
    fn insert_keeps_crlf() {
        let mut buf = Lines::parse("a\r\n");
        buf.insert(0, &["z".to_string()]);
        assert_eq!(buf.render(), "z\r\na\r\n");
    }

    #[test]
    fn find_run_ignores_carriage_returns() {
        let buf = Lines::parse("x\r\ny\r\nz\r\n");
        assert_eq!(buf.find_run(&["y".to_string(), "z".to_string()]), Some(1));
        assert_eq!(buf.find_run(&["z".to_string(), "x".to_string()]), None);
    }

    #[test]
    fn split_fragment_strips_trailing_newlines() {
        assert_eq!(split_fragment("a\nb\n\n"), vec!["a", "b"]);
        assert!(split_fragment("\n").is_empty());
    }
}
