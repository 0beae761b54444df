//! Version comparison for package constraints.
//!
//! Versions are split into alternating runs of digits and non-digits and
//! compared element-wise, digit runs as integers. This makes `1.10.0`
//! greater than `1.9.0`, which plain string comparison gets backwards.

use std::cmp::Ordering;
use std::fmt;

/// One run of a split version string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// Digits with leading zeros stripped
    Number(String),
    Text(String),
}

impl Part {
    fn number(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Part::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
    }
}

impl Ord for Part {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // Arbitrary length integers: longer is bigger, then digit-wise
            (Part::Number(a), Part::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Part::Text(a), Part::Text(b)) => a.cmp(b),
            (Part::Number(_), Part::Text(_)) => Ordering::Less,
            (Part::Text(_), Part::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Part {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed package version, ordered run by run.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    parts: Vec<Part>,
}

impl Version {
    /// Split a version string into comparable runs.
    pub fn parse(raw: &str) -> Self {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in raw.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                parts.push(finish_part(&current, in_digits));
                current.clear();
            }
            in_digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(finish_part(&current, in_digits));
        }

        Self {
            raw: raw.to_string(),
            parts,
        }
    }

    /// The version as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn finish_part(run: &str, digits: bool) -> Part {
    if digits {
        Part::number(run)
    } else {
        Part::Text(run.to_string())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_runs_compare_as_integers() {
        assert_eq!(compare("1.10.0", "1.9.0"), Ordering::Greater);
        assert!("1.10.0" < "1.9.0", "plain string order is the trap");
    }

    #[test]
    fn test_equal_versions() {
        assert_eq!(compare("2.4.1", "2.4.1"), Ordering::Equal);
        assert_eq!(compare("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_longer_version_is_greater() {
        assert_eq!(compare("1.2", "1.2.1"), Ordering::Less);
    }

    #[test]
    fn test_debian_style_versions() {
        assert_eq!(compare("7.68.0-1ubuntu2.7", "7.68.0-1ubuntu2.14"), Ordering::Less);
        assert_eq!(compare("1:2.0", "1:1.9"), Ordering::Greater);
    }

    #[test]
    fn test_text_runs_sort_after_numbers() {
        assert_eq!(compare("1.0", "1.a"), Ordering::Less);
        assert_eq!(compare("1.0rc1", "1.0rc2"), Ordering::Less);
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        assert_eq!(
            compare("1.99999999999999999999999", "1.100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn test_display_keeps_raw() {
        assert_eq!(Version::parse("0010.2").to_string(), "0010.2");
    }
}
