//! Package versions.
//!
//! A version is `major.minor.patch[.revision][-label][+metadata]`. Missing
//! numeric parts default to zero and leading zeros are dropped, so `1.0`,
//! `1.0.0` and `01.00.000.0` are the same version. Ordering follows semantic
//! version precedence; build metadata never takes part in comparison.

mod constraint;

pub use constraint::{Bound, VersionConstraint};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{FeedError, Result};

/// A parsed, normalized package version.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release_labels: Vec<String>,
    metadata: Option<String>,
}

impl PackageVersion {
    /// Create a release version `major.minor.patch`.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        PackageVersion {
            major,
            minor,
            patch,
            revision: 0,
            release_labels: Vec::new(),
            metadata: None,
        }
    }

    /// Parse version text, rejecting anything that does not fit the grammar.
    pub fn parse(text: &str) -> Result<Self> {
        let input = text.trim();
        let malformed = |reason: &str| FeedError::MalformedVersion {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(malformed("empty version"));
        }

        let (rest, metadata) = match input.split_once('+') {
            Some((rest, meta)) => {
                validate_identifiers(meta, false).map_err(|r| malformed(&r))?;
                (rest, Some(meta.to_string()))
            }
            None => (input, None),
        };

        let (core, release_labels) = match rest.split_once('-') {
            Some((core, label)) => {
                validate_identifiers(label, true).map_err(|r| malformed(&r))?;
                (core, label.split('.').map(String::from).collect())
            }
            None => (rest, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 4 {
            return Err(malformed("more than four numeric parts"));
        }

        let mut numbers = [0u64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed(&format!("'{}' is not a number", part)));
            }
            *slot = part
                .parse()
                .map_err(|_| malformed(&format!("'{}' is out of range", part)))?;
        }

        Ok(PackageVersion {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            revision: numbers[3],
            release_labels,
            metadata,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The dot-joined pre-release label, if any.
    pub fn release_label(&self) -> Option<String> {
        if self.release_labels.is_empty() {
            None
        } else {
            Some(self.release_labels.join("."))
        }
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release_labels.is_empty()
    }

    /// True when the version needs SemVer 2.0 aware clients: a dotted
    /// pre-release label or build metadata.
    pub fn is_semver2(&self) -> bool {
        self.release_labels.len() > 1 || self.metadata.is_some()
    }

    /// Normalized form including build metadata.
    pub fn to_full_string(&self) -> String {
        match &self.metadata {
            Some(meta) => format!("{}+{}", self, meta),
            None => self.to_string(),
        }
    }

    /// Normalized form without pre-release label or metadata.
    pub fn core(&self) -> PackageVersion {
        PackageVersion {
            release_labels: Vec::new(),
            metadata: None,
            ..self.clone()
        }
    }
}

/// Validate dot-separated identifiers: non-empty, `[0-9A-Za-z-]` only.
/// Numeric pre-release identifiers may not carry leading zeros.
fn validate_identifiers(text: &str, prerelease: bool) -> std::result::Result<(), String> {
    if text.is_empty() {
        return Err("empty label".to_string());
    }
    for ident in text.split('.') {
        if ident.is_empty() {
            return Err("empty label identifier".to_string());
        }
        if !ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(format!("invalid character in '{}'", ident));
        }
        if prerelease && ident.len() > 1 && is_numeric(ident) && ident.starts_with('0') {
            return Err(format!("leading zero in numeric identifier '{}'", ident));
        }
    }
    Ok(())
}

fn is_numeric(ident: &str) -> bool {
    !ident.is_empty() && ident.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two pre-release identifiers: numeric ones numerically, numeric
/// below alphanumeric, alphanumeric ones case-insensitively.
fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.revision.cmp(&other.revision))
            .then_with(|| {
                match (self.release_labels.is_empty(), other.release_labels.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        for (a, b) in self.release_labels.iter().zip(&other.release_labels) {
                            match compare_identifier(a, b) {
                                Ordering::Equal => continue,
                                ord => return ord,
                            }
                        }
                        self.release_labels.len().cmp(&other.release_labels.len())
                    }
                }
            })
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.revision.hash(state);
        for label in &self.release_labels {
            if is_numeric(label) {
                label.trim_start_matches('0').hash(state);
            } else {
                label.to_ascii_lowercase().hash(state);
            }
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        if !self.release_labels.is_empty() {
            write!(f, "-{}", self.release_labels.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        PackageVersion::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_full_string())
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        PackageVersion::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(v("1.0").to_string(), "1.0.0");
        assert_eq!(v("01.002.0003").to_string(), "1.2.3");
        assert_eq!(v("1.2.3.0").to_string(), "1.2.3");
        assert_eq!(v("1.2.3.4").to_string(), "1.2.3.4");
        assert_eq!(v(" 2.0.0-beta.1 ").to_string(), "2.0.0-beta.1");
    }

    #[test]
    fn test_parse_metadata_kept_in_full_string() {
        let version = v("1.0.0-rc+build.5");
        assert_eq!(version.to_string(), "1.0.0-rc");
        assert_eq!(version.to_full_string(), "1.0.0-rc+build.5");
        assert_eq!(version.metadata(), Some("build.5"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", " ", "a.b.c", "1.2.3.4.5", "1..2", "1.0.0-", "1.0.0+", "1.0.0-be$ta", "v1.0.0",
            "1.0.0-01", "-1.0.0", "1.0.0-alpha..1", "99999999999999999999.0.0",
        ] {
            let result = PackageVersion::parse(bad);
            assert!(
                matches!(result, Err(FeedError::MalformedVersion { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_release_ranks_above_prerelease() {
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.1-alpha"));
    }

    #[test]
    fn test_prerelease_identifier_precedence() {
        // Ordering example from the semantic versioning rules.
        let ordered = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_label_comparison_is_case_insensitive() {
        assert_eq!(v("1.0.0-BETA"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0-Beta").cmp(&v("1.0.0-bEtA")), Ordering::Equal);
    }

    #[test]
    fn test_metadata_ignored_for_equality() {
        assert_eq!(v("1.0.0+a"), v("1.0.0+b"));
        assert_eq!(v("1.0"), v("1.0.0.0"));
    }

    #[test]
    fn test_equal_versions_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("1.0.0-RC"));
        assert!(set.contains(&v("1.0.0-rc+meta")));
        assert!(set.contains(&v("01.0-rc")));
    }

    #[test]
    fn test_revision_ordering() {
        assert!(v("1.0.0") < v("1.0.0.1"));
        assert!(v("1.0.0.1") < v("1.0.1"));
    }

    #[test]
    fn test_total_order_over_sample() {
        let sample: Vec<PackageVersion> = [
            "0.9", "1.0.0-alpha", "1.0.0-alpha.1", "1.0.0-ALPHA.2", "1.0.0", "1.0.0.5",
            "1.0.1-2", "1.0.1-rc", "1.0.1", "2.0.0+meta", "10.0.0",
        ]
        .iter()
        .map(|s| v(s))
        .collect();

        for a in &sample {
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &sample {
                // Antisymmetry
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
                for c in &sample {
                    if a <= b && b <= c {
                        assert!(a <= c, "transitivity {} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_reparse_compares_equal() {
        for text in ["1.0", "1.2.3-beta.4+sha.1", "4.0.0.12", "0.0.1-x-y-z"] {
            let parsed = v(text);
            let reparsed = v(&parsed.to_full_string());
            assert_eq!(parsed.cmp(&reparsed), Ordering::Equal);
        }
    }

    #[test]
    fn test_semver2_detection() {
        assert!(!v("1.0.0").is_semver2());
        assert!(!v("1.0.0-beta").is_semver2());
        assert!(v("1.0.0-beta.1").is_semver2());
        assert!(v("1.0.0+build").is_semver2());
    }

    #[test]
    fn test_serde_uses_full_string() {
        let json = serde_json::to_string(&v("1.0.0-rc.1+abc")).unwrap();
        assert_eq!(json, "\"1.0.0-rc.1+abc\"");
        let back: PackageVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.0.0-rc.1"));
        assert!(serde_json::from_str::<PackageVersion>("\"nope\"").is_err());
    }
}
