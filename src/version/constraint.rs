//! Version range constraints in bracket notation.
//!
//! | Text | Meaning |
//! |---|---|
//! | `1.0` / `[1.0]` | exactly 1.0 |
//! | `[1.0,2.0]` | 1.0 <= v <= 2.0 |
//! | `(1.0,2.0)` | 1.0 < v < 2.0 |
//! | `[1.0,)` | v >= 1.0 |
//! | `(,2.0]` | v <= 2.0 |

use std::fmt;
use std::str::FromStr;

use super::PackageVersion;
use crate::error::{FeedError, Result};

/// One end of a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: PackageVersion,
    pub inclusive: bool,
}

/// A version range with optional lower and upper bounds.
///
/// When both bounds are present the lower one never exceeds the upper one,
/// and equal bounds are always both inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    min: Option<Bound>,
    max: Option<Bound>,
}

impl VersionConstraint {
    /// Matches every version.
    pub fn any() -> Self {
        VersionConstraint {
            min: None,
            max: None,
        }
    }

    /// Matches exactly one version.
    pub fn exact(version: PackageVersion) -> Self {
        VersionConstraint {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    /// Build a range, validating bound order.
    pub fn new(min: Option<Bound>, max: Option<Bound>) -> Result<Self> {
        let constraint = VersionConstraint { min, max };
        if let (Some(lo), Some(hi)) = (&constraint.min, &constraint.max) {
            if lo.version > hi.version {
                return Err(constraint.invalid("lower bound exceeds upper bound"));
            }
            if lo.version == hi.version && !(lo.inclusive && hi.inclusive) {
                return Err(constraint.invalid("range is empty"));
            }
        }
        Ok(constraint)
    }

    /// Parse bracket notation; a bare version is an exact match.
    pub fn parse(text: &str) -> Result<Self> {
        let input = text.trim();
        let malformed = |reason: &str| FeedError::MalformedConstraint {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(malformed("empty constraint"));
        }

        let first = input.as_bytes()[0];
        if first != b'[' && first != b'(' {
            let version = parse_bound_version(text, input)?;
            return Ok(VersionConstraint::exact(version));
        }

        if input.len() < 2 {
            return Err(malformed("unterminated range"));
        }
        let last = input.as_bytes()[input.len() - 1];
        if last != b']' && last != b')' {
            return Err(malformed("range must end with ']' or ')'"));
        }
        let min_inclusive = first == b'[';
        let max_inclusive = last == b']';
        let inner = &input[1..input.len() - 1];

        let Some((lo, hi)) = inner.split_once(',') else {
            // "[1.0]" is the only single-value bracket form.
            if !(min_inclusive && max_inclusive) {
                return Err(malformed("single-version range must use '[' and ']'"));
            }
            let version = parse_bound_version(text, inner.trim())?;
            return Ok(VersionConstraint::exact(version));
        };
        if hi.contains(',') {
            return Err(malformed("too many ',' separators"));
        }

        let bound = |part: &str, inclusive: bool| -> Result<Option<Bound>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            Ok(Some(Bound {
                version: parse_bound_version(text, part)?,
                inclusive,
            }))
        };

        let min = bound(lo, min_inclusive)?;
        let max = bound(hi, max_inclusive)?;
        VersionConstraint::new(min, max).map_err(|_| malformed("bounds describe an empty range"))
    }

    pub fn min(&self) -> Option<&Bound> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Bound> {
        self.max.as_ref()
    }

    pub fn is_exact(&self) -> bool {
        matches!((&self.min, &self.max), (Some(lo), Some(hi)) if lo.version == hi.version)
    }

    /// True when `version` lies inside the range.
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above_min = match &self.min {
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
            None => true,
        };
        let below_max = match &self.max {
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
            None => true,
        };
        above_min && below_max
    }

    fn invalid(&self, reason: &str) -> FeedError {
        FeedError::MalformedConstraint {
            input: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn parse_bound_version(whole: &str, part: &str) -> Result<PackageVersion> {
    PackageVersion::parse(part).map_err(|e| FeedError::MalformedConstraint {
        input: whole.to_string(),
        reason: e.to_string(),
    })
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact()
            && let Some(lo) = &self.min
        {
            return write!(f, "[{}]", lo.version);
        }
        match &self.min {
            Some(b) => write!(f, "{}{}", if b.inclusive { '[' } else { '(' }, b.version)?,
            None => write!(f, "(")?,
        }
        write!(f, ",")?;
        match &self.max {
            Some(b) => write!(f, "{}{}", b.version, if b.inclusive { ']' } else { ')' }),
            None => write!(f, ")"),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        VersionConstraint::parse(s)
    }
}
