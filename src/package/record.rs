use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{FeedError, Result};
use crate::framework::FrameworkMoniker;
use crate::hash::ContentHash;
use crate::version::PackageVersion;

use super::PackageManifest;

const MAX_ID_LENGTH: usize = 100;

/// One published package version as known to the index.
///
/// Records are immutable once handed to the index; a change of listing
/// state produces a new record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageRecord {
    pub id: String,
    pub version: PackageVersion,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub supported_frameworks: Vec<FrameworkMoniker>,
    pub listed: bool,
    pub content_hash: ContentHash,
    /// Where the archive bytes live; opaque to the index.
    pub content_location: PathBuf,
    pub content_length: u64,
    pub published_at: DateTime<Utc>,
}

/// Where a record's bytes came from.
#[derive(Debug, Clone)]
pub struct PackageContent {
    pub hash: ContentHash,
    pub location: PathBuf,
    pub length: u64,
    pub published_at: DateTime<Utc>,
    pub listed: bool,
}

impl PackageRecord {
    /// Build a record from a manifest, rejecting an unusable id or version.
    ///
    /// Framework tokens that fail to parse are dropped with a warning.
    pub fn from_manifest(manifest: PackageManifest, content: PackageContent) -> Result<Self> {
        validate_id(&manifest.id)?;
        let version = PackageVersion::parse(&manifest.version).map_err(|e| {
            FeedError::InvalidPackageMetadata {
                detail: format!("package '{}': {}", manifest.id, e),
            }
        })?;

        let supported_frameworks = manifest
            .frameworks
            .iter()
            .filter_map(|token| match FrameworkMoniker::parse(token) {
                Ok(fw) => Some(fw),
                Err(e) => {
                    warn!("Package {} {}: {}", manifest.id, version, e);
                    None
                }
            })
            .collect();

        Ok(PackageRecord {
            id: manifest.id,
            version,
            title: manifest.title.filter(|t| !t.trim().is_empty()),
            description: manifest.description.filter(|d| !d.trim().is_empty()),
            tags: manifest.tags,
            authors: manifest.authors,
            supported_frameworks,
            listed: content.listed,
            content_hash: content.hash,
            content_location: content.location,
            content_length: content.length,
            published_at: content.published_at,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.id, self.version.clone())
    }

    /// Copy of this record with a different listing state.
    pub fn with_listed(&self, listed: bool) -> Self {
        PackageRecord {
            listed,
            ..self.clone()
        }
    }

    /// Case-insensitive substring match against id, title, description and tags.
    ///
    /// `term` must already be lowercase.
    pub fn matches_term(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let hit = |text: &str| text.to_lowercase().contains(term);
        hit(&self.id)
            || self.title.as_deref().is_some_and(hit)
            || self.description.as_deref().is_some_and(hit)
            || self.tags.iter().any(|t| hit(t))
    }
}

/// Check a package id: non-empty, bounded, `[A-Za-z0-9._-]`.
pub fn validate_id(id: &str) -> Result<()> {
    let invalid = |detail: String| Err(FeedError::InvalidPackageMetadata { detail });
    if id.trim().is_empty() {
        return invalid("package id is empty".to_string());
    }
    if id.len() > MAX_ID_LENGTH {
        return invalid(format!("package id '{}' is longer than {}", id, MAX_ID_LENGTH));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return invalid(format!("package id '{}' contains invalid characters", id));
    }
    if id.starts_with('.') || id.ends_with('.') {
        return invalid(format!("package id '{}' may not start or end with '.'", id));
    }
    Ok(())
}

/// Identity of a record: case-insensitive id plus version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    id: String,
    version: PackageVersion,
}

impl PackageKey {
    pub fn new(id: &str, version: PackageVersion) -> Self {
        PackageKey {
            id: id.to_lowercase(),
            version,
        }
    }

    /// Lowercased id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }
}
