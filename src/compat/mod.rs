//! Client compatibility negotiation.
//!
//! Every request is assigned one [`ClientCompatibility`] level up front, and
//! that value is passed explicitly to each index and query call made while
//! serving the request.

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::package::PackageRecord;
use crate::version::PackageVersion;

const SEMVER2_AGENT_MARKER: &str = "(semver2)";
const SEMVER_LEVEL_PARAMETER: &str = "semverlevel";

/// Capability tier of a client, ordered from least to most capable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ClientCompatibility {
    /// Understands only SemVer 1.0 versions and listed packages.
    #[default]
    Legacy,
    /// Understands SemVer 2.0 versions (dotted labels, build metadata).
    SemVer2,
    /// Additionally understands the listed flag and can be shown delisted packages.
    Delisting,
}

impl ClientCompatibility {
    pub fn allows_semver2(self) -> bool {
        self >= ClientCompatibility::SemVer2
    }

    pub fn shows_delisted(self) -> bool {
        self >= ClientCompatibility::Delisting
    }

    /// Whether a version can be shown to this client at all.
    pub fn can_see_version(self, version: &PackageVersion) -> bool {
        self.allows_semver2() || !version.is_semver2()
    }

    /// Whether a record is visible when browsing at this level.
    pub fn can_see(self, record: &PackageRecord) -> bool {
        (record.listed || self.shows_delisted()) && self.can_see_version(&record.version)
    }

    /// Level granted to a protocol version.
    pub fn from_protocol_version(version: &PackageVersion) -> Self {
        if *version >= PackageVersion::new(3, 0, 0) {
            ClientCompatibility::Delisting
        } else if *version >= PackageVersion::new(2, 0, 0) {
            ClientCompatibility::SemVer2
        } else {
            ClientCompatibility::Legacy
        }
    }
}

impl fmt::Display for ClientCompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientCompatibility::Legacy => "legacy",
            ClientCompatibility::SemVer2 => "semver2",
            ClientCompatibility::Delisting => "delisting",
        };
        f.write_str(name)
    }
}

/// The request signals compatibility is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub protocol_version: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Pick the `semVerLevel` parameter out of a raw query string.
    pub fn from_query_string(query: &str) -> Self {
        let protocol_version = query
            .trim_start_matches('?')
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| name.eq_ignore_ascii_case(SEMVER_LEVEL_PARAMETER))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());
        RequestContext {
            protocol_version,
            user_agent: None,
        }
    }
}

/// Derive the compatibility level of one request.
///
/// A parseable protocol version decides on its own. Without one, a user agent
/// carrying the `(semver2)` marker earns SemVer 2.0 support; anything else
/// is treated as a legacy client.
pub fn negotiate(context: &RequestContext) -> ClientCompatibility {
    let from_version = context
        .protocol_version
        .as_deref()
        .and_then(|text| match PackageVersion::parse(text) {
            Ok(version) => Some(version),
            Err(e) => {
                debug!("Ignoring protocol version: {}", e);
                None
            }
        })
        .map(|version| ClientCompatibility::from_protocol_version(&version));

    let level = from_version.unwrap_or_else(|| {
        let marked = context
            .user_agent
            .as_deref()
            .is_some_and(|agent| agent.to_lowercase().contains(SEMVER2_AGENT_MARKER));
        if marked {
            ClientCompatibility::SemVer2
        } else {
            ClientCompatibility::Legacy
        }
    });

    debug!("Negotiated client compatibility: {}", level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::fixtures::record;

    fn level(protocol: &str) -> ClientCompatibility {
        negotiate(&RequestContext::new().with_protocol_version(protocol))
    }

    #[test]
    fn test_negotiate_by_protocol_version() {
        assert_eq!(level("1.0.0"), ClientCompatibility::Legacy);
        assert_eq!(level("2.0.0"), ClientCompatibility::SemVer2);
        assert_eq!(level("2.5"), ClientCompatibility::SemVer2);
        assert_eq!(level("3.0.0"), ClientCompatibility::Delisting);
        assert_eq!(level("garbage"), ClientCompatibility::Legacy);
        assert_eq!(negotiate(&RequestContext::new()), ClientCompatibility::Legacy);
    }

    #[test]
    fn test_negotiate_by_user_agent() {
        let context = RequestContext::new().with_user_agent("PkgClient/5.0 (SemVer2)");
        assert_eq!(negotiate(&context), ClientCompatibility::SemVer2);

        // An explicit protocol version wins over the agent marker
        let context = context.with_protocol_version("1.0.0");
        assert_eq!(negotiate(&context), ClientCompatibility::Legacy);
    }

    #[test]
    fn test_from_query_string() {
        let context = RequestContext::from_query_string("?id='Foo'&semVerLevel=2.0.0");
        assert_eq!(context.protocol_version.as_deref(), Some("2.0.0"));
        assert_eq!(negotiate(&context), ClientCompatibility::SemVer2);

        assert_eq!(RequestContext::from_query_string("semverlevel=").protocol_version, None);
        assert_eq!(RequestContext::from_query_string("").protocol_version, None);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(ClientCompatibility::Legacy < ClientCompatibility::SemVer2);
        assert!(ClientCompatibility::SemVer2 < ClientCompatibility::Delisting);
        assert!(!ClientCompatibility::Legacy.allows_semver2());
        assert!(ClientCompatibility::Delisting.allows_semver2());
        assert!(!ClientCompatibility::SemVer2.shows_delisted());
    }

    #[test]
    fn test_can_see() {
        let listed = record("Foo", "1.0.0");
        let delisted = listed.with_listed(false);
        let semver2 = record("Foo", "2.0.0-beta.1");

        assert!(ClientCompatibility::Legacy.can_see(&listed));
        assert!(!ClientCompatibility::Legacy.can_see(&delisted));
        assert!(!ClientCompatibility::Legacy.can_see(&semver2));
        assert!(ClientCompatibility::SemVer2.can_see(&semver2));
        assert!(!ClientCompatibility::SemVer2.can_see(&delisted));
        assert!(ClientCompatibility::Delisting.can_see(&delisted));
    }
}
