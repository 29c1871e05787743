use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::PACKAGE_MEDIA_TYPE;
use crate::compat::ClientCompatibility;
use crate::hash::HASH_ALGORITHM;
use crate::package::PackageRecord;
use crate::version::PackageVersion;

const SEMVER_LEVEL_1: &str = "1.0.0";
const SEMVER_LEVEL_2: &str = "2.0.0";

/// Wire shape of one package.
///
/// The field set is fixed; fields a client's level does not understand stay
/// `None` and are left out when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedEntry {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem_ver_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: String,
    pub authors: String,
    pub supported_frameworks: String,
    pub is_prerelease: bool,
    pub is_latest_version: bool,
    pub is_absolute_latest_version: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed: Option<bool>,
    pub published: DateTime<Utc>,
    pub package_hash: String,
    pub package_hash_algorithm: String,
    pub package_size: u64,
    pub download_url: String,
    pub content_type: String,
}

impl FeedEntry {
    /// Shape one record for a client. Latest-version flags start out false;
    /// [`project_all`] fills them in relative to a result set.
    pub fn project(record: &PackageRecord, compatibility: ClientCompatibility) -> Self {
        let semver2 = compatibility.allows_semver2();
        let level = if record.version.is_semver2() {
            SEMVER_LEVEL_2
        } else {
            SEMVER_LEVEL_1
        };

        FeedEntry {
            id: record.id.clone(),
            version: record.version.to_string(),
            normalized_version: semver2.then(|| record.version.to_string()),
            full_version: semver2.then(|| record.version.to_full_string()),
            sem_ver_level: semver2.then(|| level.to_string()),
            title: record.title.clone(),
            description: record.description.clone(),
            tags: record.tags.join(" "),
            authors: record.authors.join(", "),
            supported_frameworks: record
                .supported_frameworks
                .iter()
                .map(|fw| fw.to_string())
                .collect::<Vec<_>>()
                .join("|"),
            is_prerelease: record.is_prerelease(),
            is_latest_version: false,
            is_absolute_latest_version: false,
            listed: compatibility.shows_delisted().then_some(record.listed),
            published: record.published_at,
            package_hash: record.content_hash.to_string(),
            package_hash_algorithm: HASH_ALGORITHM.to_string(),
            package_size: record.content_length,
            download_url: download_path(&record.id, &record.version),
            content_type: PACKAGE_MEDIA_TYPE.to_string(),
        }
    }
}

/// Shape a result set, marking per id the highest listed release and the
/// highest listed version overall.
pub fn project_all(
    records: &[Arc<PackageRecord>],
    compatibility: ClientCompatibility,
) -> Vec<FeedEntry> {
    let mut latest: HashMap<String, &PackageVersion> = HashMap::new();
    let mut absolute_latest: HashMap<String, &PackageVersion> = HashMap::new();
    for record in records.iter().filter(|r| r.listed) {
        let id = record.id.to_lowercase();
        let version = &record.version;
        if !record.is_prerelease() {
            latest
                .entry(id.clone())
                .and_modify(|v| *v = (*v).max(version))
                .or_insert(version);
        }
        absolute_latest
            .entry(id)
            .and_modify(|v| *v = (*v).max(version))
            .or_insert(version);
    }

    records
        .iter()
        .map(|record| {
            let id = record.id.to_lowercase();
            let is_latest = |map: &HashMap<String, &PackageVersion>| {
                record.listed && map.get(&id).is_some_and(|v| **v == record.version)
            };
            FeedEntry {
                is_latest_version: is_latest(&latest),
                is_absolute_latest_version: is_latest(&absolute_latest),
                ..FeedEntry::project(record, compatibility)
            }
        })
        .collect()
}

/// Relative download location of a package.
pub fn download_path(id: &str, version: &PackageVersion) -> String {
    format!("api/v2/package/{}/{}", id, version)
}
