//! npm range satisfaction on top of `semver`.
//!
//! The `semver` crate speaks Cargo's dialect: a bare `1.2.3` means `^1.2.3`
//! and comparators are comma-separated. npm ranges are converted before
//! matching:
//! - `1.2.3` (bare full version) means `=1.2.3`
//! - `1`, `1.2`, `1.x`, `1.2.*` are x-ranges
//! - `1.0.0 - 2.0.0` is a hyphen range
//! - `>= 1.0.0 < 2.0.0` is an AND of space-separated comparators
//! - `a || b` is an OR of the above

use semver::{Version, VersionReq};

/// Check whether `version` satisfies the npm `range`.
///
/// Unparseable versions or ranges never satisfy, except for the literal
/// case where the range equals the version string.
#[must_use]
pub fn satisfies(version: &str, range: &str) -> bool {
    let range = range.trim();
    if version == range {
        return true;
    }

    let Ok(version) = Version::parse(version.trim().trim_start_matches('v')) else {
        return false;
    };

    range
        .split("||")
        .filter_map(parse_range)
        .any(|req| req.matches(&version))
}

/// Check whether `raw` parses as an npm range.
#[must_use]
pub fn is_range(raw: &str) -> bool {
    raw.split("||").all(|alt| parse_range(alt).is_some())
}

/// Extract the first `major[.minor[.patch]]` run from a string.
///
/// `^1.2` coerces to `1.2.0`, `v3` to `3.0.0`. Returns `None` when the
/// string contains no digits.
#[must_use]
pub fn coerce(raw: &str) -> Option<Version> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let mut parts = [0u64; 3];
    let mut idx = 0;
    let mut current = String::new();

    for c in raw[start..].chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == '.' && idx < 2 && !current.is_empty() {
            parts[idx] = current.parse().ok()?;
            current.clear();
            idx += 1;
        } else {
            break;
        }
    }
    if !current.is_empty() {
        parts[idx] = current.parse().ok()?;
    }

    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// Parse a single (non-OR) npm range.
fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    if range.is_empty() || range == "*" || range == "x" || range == "X" {
        return Some(VersionReq::STAR);
    }

    if let Some((start, end)) = parse_hyphen_range(range) {
        let converted = format!(">={}, {}", pad_version(start)?, hyphen_upper(end)?);
        return VersionReq::parse(&converted).ok();
    }

    let converted = convert_space_separated_comparators(range)?;
    VersionReq::parse(&converted).ok()
}

/// Split a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

/// Upper bound of a hyphen range: partial versions exclude the next bump.
fn hyphen_upper(end: &str) -> Option<String> {
    let parts: Vec<&str> = end.split('.').collect();
    match parts.as_slice() {
        [major] => Some(format!("<{}.0.0", major.parse::<u64>().ok()? + 1)),
        [major, minor] => Some(format!(
            "<{major}.{}.0",
            minor.parse::<u64>().ok()? + 1
        )),
        _ => Some(format!("<={end}")),
    }
}

fn pad_version(version: &str) -> Option<String> {
    let parts: Vec<&str> = version.split('.').collect();
    match parts.as_slice() {
        [major] => Some(format!("{}.0.0", major.parse::<u64>().ok()?)),
        [major, minor] => Some(format!(
            "{}.{}.0",
            major.parse::<u64>().ok()?,
            minor.parse::<u64>().ok()?
        )),
        _ => Some(version.to_string()),
    }
}

/// Convert space-separated comparators to comma-separated ones.
///
/// npm allows `>= 2.1.2 < 3.0.0`, Cargo's semver requires `>=2.1.2, <3.0.0`.
/// Operators separated from their version by a space are re-attached.
fn convert_space_separated_comparators(range: &str) -> Option<String> {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }
        let token = format!("{pending_op}{token}");
        pending_op.clear();
        comparators.push(convert_comparator(&token)?);
    }

    if !pending_op.is_empty() || comparators.is_empty() {
        return None;
    }

    Some(comparators.join(", "))
}

/// Convert one npm comparator to Cargo syntax.
fn convert_comparator(token: &str) -> Option<String> {
    let op_len = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = version.trim_start_matches('v');

    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit() || c == '*' || c == 'x' || c == 'X') {
        return None;
    }

    if op.is_empty() {
        let parts = version.split('.').count();
        let wildcard = version.contains(['x', 'X', '*']);
        if parts >= 3 && !wildcard {
            return Some(format!("={version}"));
        }
        return Some(convert_x_range(version));
    }

    Some(format!("{op}{}", version.replace(['x', 'X'], "*")))
}

/// Convert x-range to semver range.
fn convert_x_range(range: &str) -> String {
    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        ["*" | "x" | "X", ..] => return "*".to_string(),
        [major] | [major, "x" | "X" | "*", ..] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor] | [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_caret_and_tilde() {
        assert!(satisfies("1.5.0", "^1.0.0"));
        assert!(!satisfies("2.0.0", "^1.0.0"));
        assert!(satisfies("1.0.5", "~1.0.0"));
        assert!(!satisfies("1.1.0", "~1.0.0"));
    }

    #[test]
    fn test_bare_full_version_is_exact() {
        assert!(satisfies("1.2.3", "1.2.3"));
        assert!(!satisfies("1.2.4", "1.2.3"));
        assert!(satisfies("1.2.3", "=1.2.3"));
        assert!(satisfies("1.2.3", "v1.2.3"));
    }

    #[test]
    fn test_partial_versions_are_x_ranges() {
        assert!(satisfies("2.5.0", "2"));
        assert!(!satisfies("3.0.0", "2"));
        assert!(satisfies("1.2.9", "1.2"));
        assert!(!satisfies("1.3.0", "1.2"));
        assert!(satisfies("1.9.0", "1.x"));
        assert!(satisfies("1.2.1", "1.2.*"));
    }

    #[test]
    fn test_star_and_empty() {
        assert!(satisfies("0.0.1", "*"));
        assert!(satisfies("9.9.9", ""));
        assert!(satisfies("1.0.0", "x"));
    }

    #[test]
    fn test_hyphen_range() {
        assert!(satisfies("1.5.0", "1.0.0 - 2.0.0"));
        assert!(satisfies("2.0.0", "1.0.0 - 2.0.0"));
        assert!(!satisfies("2.0.1", "1.0.0 - 2.0.0"));
        assert!(satisfies("2.9.0", "1 - 2"));
        assert!(!satisfies("3.0.0", "1 - 2"));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert!(satisfies("2.5.0", ">= 2.1.2 < 3.0.0"));
        assert!(satisfies("2.5.0", ">=2.1.2 <3.0.0"));
        assert!(!satisfies("3.0.0", ">=2.1.2 <3.0.0"));
    }

    #[test]
    fn test_or_ranges() {
        assert!(satisfies("2.1.0", "^1.0.0 || ^2.0.0"));
        assert!(satisfies("15.0.0", "^14.0.0||^15.0.0"));
        assert!(!satisfies("3.0.0", "^1.0.0 || ^2.0.0"));
    }

    #[test]
    fn test_prerelease_excluded_from_plain_range() {
        assert!(!satisfies("2.0.0-beta.1", "^1.0.0"));
        assert!(satisfies("2.0.0-beta.2", "^2.0.0-beta.1"));
    }

    #[test]
    fn test_unparseable_never_satisfies() {
        assert!(!satisfies("not-a-version", "^1.0.0"));
        assert!(!satisfies("1.0.0", "latest"));
        assert!(satisfies("latest", "latest"));
    }

    #[test]
    fn test_is_range() {
        assert!(is_range("^1.2.3"));
        assert!(is_range("*"));
        assert!(is_range(""));
        assert!(is_range(">= 1 < 2 || 3.x"));
        assert!(!is_range("latest"));
        assert!(!is_range("next"));
        assert!(!is_range("npm/cli"));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("^1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(coerce("~1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(coerce("v3"), Some(Version::new(3, 0, 0)));
        assert_eq!(coerce("1.2.3-beta.1"), Some(Version::new(1, 2, 3)));
        assert_eq!(coerce("latest"), None);
    }
}
