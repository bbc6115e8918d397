// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Ordering for the free-form version strings found in channel metadata.
//!
//! Versions are split into alternating numeric and non-numeric segments
//! which compare pairwise, numerically where both sides are numeric. A
//! version that is a strict prefix of another compares lower, so
//! `1.0 < 1.0.1` and `1.9 < 1.10`.

use std::cmp::Ordering;

pub fn compare(a: &str, b: &str) -> Ordering {
    let mut lhs = segments(a);
    let mut rhs = segments(b);

    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(m), Ok(n)) => m.cmp(&n),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Latest of an iterator of version strings
pub fn latest<'a>(versions: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    versions.max_by(|a, b| compare(a, b))
}

fn segments(version: &str) -> impl Iterator<Item = &str> {
    let mut rest = version;

    std::iter::from_fn(move || {
        rest = rest.trim_start_matches(['.', '-', '_', '+']);
        if rest.is_empty() {
            return None;
        }

        let numeric = rest.starts_with(|c: char| c.is_ascii_digit());
        let end = rest
            .find(|c: char| {
                matches!(c, '.' | '-' | '_' | '+') || c.is_ascii_digit() != numeric
            })
            .unwrap_or(rest.len());

        let (segment, tail) = rest.split_at(end);
        rest = tail;
        Some(segment)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numeric_segments() {
        assert_eq!(compare("1.0", "1.1"), Ordering::Less);
        assert_eq!(compare("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare("2.0", "2.0"), Ordering::Equal);
        assert_eq!(compare("10", "9"), Ordering::Greater);
    }

    #[test]
    fn prefix_compares_lower() {
        assert_eq!(compare("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.0"), Ordering::Greater);
    }

    #[test]
    fn mixed_segments() {
        assert_eq!(compare("1.0-rc1", "1.0-rc2"), Ordering::Less);
        assert_eq!(compare("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(compare("3.5b", "3.12"), Ordering::Less);
    }

    #[test]
    fn latest_of_set() {
        let versions = ["1.0", "1.10", "1.2"];
        assert_eq!(latest(versions.iter().copied()), Some("1.10"));
        assert_eq!(latest(std::iter::empty()), None);
    }
}
