//! Target framework monikers and the compatibility table.
//!
//! Both the short folder form (`net45`, `netstandard2.0`, `net8.0-windows`) and
//! the long form (`.NETFramework,Version=v4.7.2`) are accepted. Compatibility is
//! directional: a package built for a *supported* framework can be consumed by a
//! project targeting a *requested* framework.

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{FeedError, Result};

/// Framework family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameworkFamily {
    /// .NET Framework (`net20` .. `net48`).
    NetFramework,
    /// .NET Standard.
    NetStandard,
    /// .NET Core and .NET 5+.
    NetCoreApp,
    /// Any other identifier, matched by name only.
    Other(String),
}

/// A framework version, up to three components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameworkVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FrameworkVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        FrameworkVersion {
            major,
            minor,
            patch,
        }
    }
}

/// Highest .NET Standard version each .NET Framework version implements.
const NETFRAMEWORK_STANDARD_SUPPORT: &[(FrameworkVersion, FrameworkVersion)] = &[
    (FrameworkVersion::new(4, 6, 1), FrameworkVersion::new(2, 0, 0)),
    (FrameworkVersion::new(4, 6, 0), FrameworkVersion::new(1, 3, 0)),
    (FrameworkVersion::new(4, 5, 1), FrameworkVersion::new(1, 2, 0)),
    (FrameworkVersion::new(4, 5, 0), FrameworkVersion::new(1, 1, 0)),
];

/// Highest .NET Standard version each .NET Core / .NET version implements.
const NETCOREAPP_STANDARD_SUPPORT: &[(FrameworkVersion, FrameworkVersion)] = &[
    (FrameworkVersion::new(3, 0, 0), FrameworkVersion::new(2, 1, 0)),
    (FrameworkVersion::new(2, 0, 0), FrameworkVersion::new(2, 0, 0)),
    (FrameworkVersion::new(1, 0, 0), FrameworkVersion::new(1, 6, 0)),
];

/// A target framework: family, version and an optional platform suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameworkMoniker {
    pub family: FrameworkFamily,
    pub version: FrameworkVersion,
    pub platform: Option<String>,
}

impl FrameworkMoniker {
    pub fn new(family: FrameworkFamily, version: FrameworkVersion) -> Self {
        FrameworkMoniker {
            family,
            version,
            platform: None,
        }
    }

    /// Parse a moniker in short or long form.
    pub fn parse(text: &str) -> Result<Self> {
        let input = text.trim().to_ascii_lowercase();
        let malformed = |reason: &str| FeedError::MalformedFramework {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(malformed("empty moniker"));
        }

        if let Some((name, version)) = input.split_once(",version=") {
            return parse_long_form(name, version).map_err(|r| malformed(&r));
        }

        let (body, platform) = match input.split_once('-') {
            Some((body, platform)) => {
                if platform.is_empty() || !platform.bytes().all(|b| b.is_ascii_alphanumeric()) {
                    return Err(malformed("invalid platform suffix"));
                }
                (body, Some(platform.to_string()))
            }
            None => (input.as_str(), None),
        };

        let split = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        let (identifier, version_text) = body.split_at(split);
        if identifier.is_empty() {
            return Err(malformed("missing framework identifier"));
        }

        let dotted = version_text.contains('.');
        let version = parse_short_version(version_text).map_err(|r| malformed(&r))?;

        let family = match identifier {
            // net5.0 and later are the continuation of netcoreapp.
            "net" if dotted && version.major >= 5 => FrameworkFamily::NetCoreApp,
            "net" => FrameworkFamily::NetFramework,
            "netstandard" => FrameworkFamily::NetStandard,
            "netcoreapp" => FrameworkFamily::NetCoreApp,
            other => FrameworkFamily::Other(other.to_string()),
        };

        Ok(FrameworkMoniker {
            family,
            version,
            platform,
        })
    }

    /// True when a package supporting `self` can be used by a project
    /// targeting `requested`.
    pub fn accepts(&self, requested: &FrameworkMoniker) -> bool {
        if let Some(platform) = &self.platform
            && requested.platform.as_ref() != Some(platform)
        {
            return false;
        }

        match (&self.family, &requested.family) {
            (supported, wanted) if supported == wanted => self.version <= requested.version,
            (FrameworkFamily::NetStandard, FrameworkFamily::NetFramework) => {
                standard_support(NETFRAMEWORK_STANDARD_SUPPORT, requested.version)
                    .is_some_and(|max| self.version <= max)
            }
            (FrameworkFamily::NetStandard, FrameworkFamily::NetCoreApp) => {
                standard_support(NETCOREAPP_STANDARD_SUPPORT, requested.version)
                    .is_some_and(|max| self.version <= max)
            }
            _ => false,
        }
    }
}

fn standard_support(
    table: &[(FrameworkVersion, FrameworkVersion)],
    version: FrameworkVersion,
) -> Option<FrameworkVersion> {
    table
        .iter()
        .find(|(min, _)| version >= *min)
        .map(|(_, standard)| *standard)
}

fn parse_long_form(name: &str, version: &str) -> std::result::Result<FrameworkMoniker, String> {
    let name = name.trim();
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if !version.contains('.') {
        return Err("long-form version must be dotted".to_string());
    }
    let version = parse_short_version(version)?;
    let family = match name {
        ".netframework" => FrameworkFamily::NetFramework,
        ".netstandard" => FrameworkFamily::NetStandard,
        ".netcoreapp" => FrameworkFamily::NetCoreApp,
        "" | "." => return Err("missing framework identifier".to_string()),
        other => {
            let other = other.trim_start_matches('.');
            if !other.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(format!("invalid framework identifier '{}'", other));
            }
            FrameworkFamily::Other(other.to_string())
        }
    };
    Ok(FrameworkMoniker::new(family, version))
}

/// `"45"` -> 4.5, `"472"` -> 4.7.2, `"2.0"` -> 2.0, `""` -> 0.0.
fn parse_short_version(text: &str) -> std::result::Result<FrameworkVersion, String> {
    if text.is_empty() {
        return Ok(FrameworkVersion::default());
    }
    if !text.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(format!("invalid version '{}'", text));
    }

    let parts: Vec<u32> = if text.contains('.') {
        text.split('.')
            .map(|p| p.parse::<u32>().map_err(|_| format!("invalid version '{}'", text)))
            .collect::<std::result::Result<_, _>>()?
    } else {
        text.bytes().map(|b| u32::from(b - b'0')).collect()
    };

    if parts.is_empty() || parts.len() > 3 {
        return Err(format!("invalid version '{}'", text));
    }
    Ok(FrameworkVersion::new(
        parts[0],
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    ))
}

impl fmt::Display for FrameworkMoniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.version;
        match &self.family {
            FrameworkFamily::NetFramework => {
                write!(f, "net{}{}", v.major, v.minor)?;
                if v.patch > 0 {
                    write!(f, "{}", v.patch)?;
                }
            }
            FrameworkFamily::NetStandard => write!(f, "netstandard{}.{}", v.major, v.minor)?,
            FrameworkFamily::NetCoreApp if v.major >= 5 => write!(f, "net{}.{}", v.major, v.minor)?,
            FrameworkFamily::NetCoreApp => write!(f, "netcoreapp{}.{}", v.major, v.minor)?,
            FrameworkFamily::Other(name) => write!(f, "{}{}.{}", name, v.major, v.minor)?,
        }
        if let Some(platform) = &self.platform {
            write!(f, "-{}", platform)?;
        }
        Ok(())
    }
}

impl FromStr for FrameworkMoniker {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        FrameworkMoniker::parse(s)
    }
}

impl Serialize for FrameworkMoniker {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameworkMoniker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        FrameworkMoniker::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// True when `requested` is absent, `supported` is empty, or any supported
/// framework accepts the requested one.
pub fn is_compatible(supported: &[FrameworkMoniker], requested: Option<&FrameworkMoniker>) -> bool {
    match requested {
        None => true,
        Some(_) if supported.is_empty() => true,
        Some(requested) => supported.iter().any(|s| s.accepts(requested)),
    }
}

/// True when no frameworks are requested or at least one requested
/// framework is compatible.
pub fn is_compatible_with_any(
    supported: &[FrameworkMoniker],
    requested: &[FrameworkMoniker],
) -> bool {
    requested.is_empty() || requested.iter().any(|r| is_compatible(supported, Some(r)))
}

/// Parse `|`-separated monikers, skipping tokens that fail to parse.
pub fn parse_framework_list(text: &str) -> Vec<FrameworkMoniker> {
    text.split('|')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match FrameworkMoniker::parse(token) {
            Ok(moniker) => Some(moniker),
            Err(e) => {
                warn!("Ignoring target framework: {}", e);
                None
            }
        })
        .collect()
}
