// src/hooks/version_range.rs
//! npm-style version ranges
//!
//! Ranges are translated into `semver::VersionReq` sets:
//!
//! - `a || b` is a union of comparator sets
//! - `*`, `x` and the empty set match any version
//! - `1.2.3 - 2.3.4` becomes `>=1.2.3, <=2.3.4`
//! - space separated comparators are intersected (`>=1 <2`)
//! - bare versions are exact (`1.2.3` is `=1.2.3`), partial ones are wildcards
//!   (`1.2` is `1.2.*`)

use crate::utils::errors::{EngineError, Result};
use semver::{Version, VersionReq};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_range(raw, "range must not be empty"));
        }

        let alternatives = trimmed
            .split("||")
            .map(|set| translate_set(set.trim()).map_err(|e| EngineError::invalid_range(raw, e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// The range exactly as registered (part of compiled identifiers)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether an installed version string satisfies the range
    ///
    /// Empty or unparseable versions never match.
    pub fn satisfies(&self, version: &str) -> bool {
        let cleaned = version.trim().trim_start_matches('=');
        let cleaned = cleaned.strip_prefix('v').unwrap_or(cleaned);
        match Version::parse(cleaned) {
            Ok(version) => self.alternatives.iter().any(|req| req.matches(&version)),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionRange({:?})", self.raw)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn translate_set(set: &str) -> std::result::Result<VersionReq, semver::Error> {
    if set.is_empty() || is_any(set) {
        return Ok(VersionReq::STAR);
    }

    if let Some((low, high)) = set.split_once(" - ") {
        let low = strip_v(low.trim());
        let high = strip_v(high.trim());
        return VersionReq::parse(&format!(">={}, <={}", low, high));
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_operator: Option<&str> = None;

    for token in set.split_whitespace() {
        if token.chars().all(is_operator_char) {
            pending_operator = Some(token);
            continue;
        }
        let token = match pending_operator.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        comparators.push(normalize_comparator(&token));
    }

    if let Some(op) = pending_operator {
        comparators.push(op.to_string());
    }

    if comparators.iter().all(|c| is_any(c)) {
        return Ok(VersionReq::STAR);
    }

    VersionReq::parse(&comparators.join(", "))
}

fn normalize_comparator(token: &str) -> String {
    let split = token.find(|c: char| !is_operator_char(c)).unwrap_or(token.len());
    let (operator, version) = token.split_at(split);
    let version = strip_v(version);

    if !operator.is_empty() {
        return format!("{}{}", operator, version);
    }
    if version.contains(['x', 'X', '*']) {
        return version.to_string();
    }
    if version.split('.').count() < 3 {
        return format!("{}.*", version);
    }
    format!("={}", version)
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '^' | '~')
}

fn is_any(token: &str) -> bool {
    matches!(token, "*" | "x" | "X")
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_caret_range() {
        let range = VersionRange::parse("^1.0.0").unwrap();
        assert!(range.satisfies("1.0.0"));
        assert!(range.satisfies("1.1.2"));
        assert!(!range.satisfies("2.0.0"));
        assert!(!range.satisfies("0.9.9"));
    }

    #[test]
    fn test_empty_version_never_matches() {
        let range = VersionRange::parse("*").unwrap();
        assert!(!range.satisfies(""));
        assert!(!range.satisfies("not-a-version"));
        assert!(range.satisfies("0.0.1"));
    }

    #[test]
    fn test_union_and_intersection() {
        let range = VersionRange::parse(">=2.0.0 <3.0.0 || ^5.1.0").unwrap();
        assert!(range.satisfies("2.4.0"));
        assert!(!range.satisfies("3.0.0"));
        assert!(range.satisfies("5.2.0"));
        assert!(!range.satisfies("4.0.0"));
    }

    #[test]
    fn test_hyphen_range() {
        let range = VersionRange::parse("1.2.3 - 2.3.4").unwrap();
        assert!(range.satisfies("1.2.3"));
        assert!(range.satisfies("2.3.4"));
        assert!(!range.satisfies("2.3.5"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let range = VersionRange::parse("v4.17.21").unwrap();
        assert!(range.satisfies("4.17.21"));
        assert!(!range.satisfies("4.17.22"));
        assert_eq!(range.raw(), "v4.17.21");
    }

    #[test]
    fn test_separated_operator() {
        let range = VersionRange::parse(">= 7.0.0").unwrap();
        assert!(range.satisfies("7.3.1"));
        assert!(!range.satisfies("6.9.0"));
    }

    #[test]
    fn test_wildcards() {
        let range = VersionRange::parse("3.x").unwrap();
        assert!(range.satisfies("3.9.1"));
        assert!(!range.satisfies("4.0.0"));
    }

    #[test]
    fn test_partial_version_is_wildcard() {
        let range = VersionRange::parse("1.2").unwrap();
        assert!(range.satisfies("1.2.9"));
        assert!(!range.satisfies("1.3.0"));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(
            VersionRange::parse(""),
            Err(EngineError::InvalidVersionRange { .. })
        ));
        assert!(matches!(
            VersionRange::parse("latest"),
            Err(EngineError::InvalidVersionRange { .. })
        ));
    }

    proptest! {
        #[test]
        fn test_caret_matches_same_major(major in 1u64..50, minor in 0u64..50, patch in 0u64..50) {
            let range = VersionRange::parse(&format!("^{}.0.0", major)).unwrap();
            let same_major = format!("{}.{}.{}", major, minor, patch);
            let next_major = format!("{}.{}.{}", major + 1, minor, patch);
            prop_assert!(range.satisfies(&same_major));
            prop_assert!(!range.satisfies(&next_major));
        }

        #[test]
        fn test_star_matches_any_release(major in 0u64..100, minor in 0u64..100, patch in 0u64..100) {
            let range = VersionRange::parse("*").unwrap();
            let version = format!("{}.{}.{}", major, minor, patch);
            prop_assert!(range.satisfies(&version));
        }
    }
}
