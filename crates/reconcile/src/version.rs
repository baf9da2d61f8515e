//! Overlay version numbers
//!
//! Versions are dotted numbers with an optional pre-release suffix
//! (`1.2.0`, `v2`, `1.3.0-rc.1`). Missing trailing parts compare as zero and a
//! pre-release sorts before the release it precedes. Build metadata after `+`
//! is ignored.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    pre: Option<String>,
    raw: String,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, String> {
        s.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let body = raw.strip_prefix('v').unwrap_or(raw);
        let body = body.split_once('+').map_or(body, |(v, _)| v);
        let (numbers, pre) = match body.split_once('-') {
            Some((n, p)) if !p.is_empty() => (n, Some(p.to_string())),
            Some(_) => return Err("empty pre-release".to_string()),
            None => (body, None),
        };
        if numbers.is_empty() {
            return Err("empty version".to_string());
        }
        let parts = numbers
            .split('.')
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| format!("`{p}` is not a number"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            parts,
            pre,
            raw: raw.to_string(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => cmp_pre(a, b),
        }
    }
}

/// Dot-separated pre-release parts: numeric parts compare as numbers and sort
/// before alphanumeric ones; a shorter run of equal parts sorts first
fn cmp_pre(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn numeric_not_lexical_ordering() {
        assert!(v("99.99.99") > v("1.2.0"));
        assert!(v("1.10.0") > v("1.9.3"));
    }

    #[test]
    fn missing_parts_are_zero() {
        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("v2"), v("2.0.0"));
    }

    #[test]
    fn prerelease_parts_compare_numerically() {
        assert!(v("1.0.0-rc.10") > v("1.0.0-rc.2"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.beta"));
        assert!(v("1.0.0-beta") > v("1.0.0-alpha.9"));
        assert_eq!(v("1.0.0-rc.01"), v("1.0.0-rc.1"));
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("1.3.0-rc.1") < v("1.3.0"));
        assert!(v("1.3.0-rc.1") > v("1.2.9"));
        assert_eq!(v("1.0.0+build.5"), v("1.0.0"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("one.two").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.0-").is_err());
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(v(" 1.2.0\n").to_string(), "1.2.0");
    }
}
