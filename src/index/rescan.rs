use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;
use crate::package::{PackageKey, PackageRecord};
use crate::storage::PackageStore;

use super::IndexSnapshot;

/// A package file left out of a rescan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPackage {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a full storage rescan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// Package files listed by storage.
    pub files_found: usize,
    /// Records in the rebuilt snapshot.
    pub packages_indexed: usize,
    pub corrupt: Vec<SkippedPackage>,
    /// Files shadowed by a newer file with the same id and version.
    pub duplicates: usize,
    pub finished_at: DateTime<Utc>,
}

/// Diagnostic counters of an index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub packages: usize,
    pub rescans: u64,
    pub last_scan: Option<Arc<ScanReport>>,
}

/// Read every package in storage into a fresh snapshot.
///
/// Unreadable packages are skipped and reported. Only a storage listing
/// failure aborts the scan.
#[tracing::instrument(skip(store))]
pub(crate) fn scan_storage(store: &dyn PackageStore) -> Result<(IndexSnapshot, ScanReport)> {
    let files = store.list_package_files()?;
    let files_found = files.len();

    let mut corrupt = Vec::new();
    let mut duplicates = 0;
    let mut newest: HashMap<PackageKey, (SystemTime, PackageRecord)> = HashMap::new();

    for file in files {
        let record = match store.read_package_metadata(&file) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping package {:?}: {}", file.path, e);
                corrupt.push(SkippedPackage {
                    path: file.path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let key = record.key();
        if let Some((seen, existing)) = newest.get(&key) {
            duplicates += 1;
            let newer = file.last_modified > *seen;
            let (kept, dropped) = if newer {
                (&record.content_location, &existing.content_location)
            } else {
                (&existing.content_location, &record.content_location)
            };
            warn!(
                "Duplicate package {} {}: keeping {:?}, ignoring {:?}",
                record.id, record.version, kept, dropped
            );
            if !newer {
                continue;
            }
        }
        newest.insert(key, (file.last_modified, record));
    }

    let snapshot = IndexSnapshot::from_records(newest.into_values().map(|(_, record)| record));
    let report = ScanReport {
        files_found,
        packages_indexed: snapshot.len(),
        corrupt,
        duplicates,
        finished_at: Utc::now(),
    };
    info!(
        "Indexed {} package(s) from {} file(s), {} skipped, {} duplicate(s)",
        report.packages_indexed,
        report.files_found,
        report.corrupt.len(),
        report.duplicates
    );
    Ok((snapshot, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::package::fixtures::record;
    use crate::storage::{MockPackageStore, PackageFile};
    use crate::version::PackageVersion;
    use std::time::Duration;

    fn file(name: &str, age_secs: u64) -> PackageFile {
        PackageFile {
            path: PathBuf::from(format!("/feed/{}", name)),
            last_modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        }
    }

    fn located(id: &str, version: &str, file: &PackageFile) -> PackageRecord {
        PackageRecord {
            content_location: file.path.clone(),
            ..record(id, version)
        }
    }

    #[test_log::test]
    fn test_scan_skips_corrupt_packages() {
        let mut store = MockPackageStore::new();
        store
            .expect_list_package_files()
            .returning(|| Ok(vec![file("good.pkg", 0), file("bad.pkg", 0)]));
        store.expect_read_package_metadata().returning(|f| {
            if f.path.ends_with("bad.pkg") {
                Err(FeedError::CorruptPackage {
                    path: f.path.clone(),
                    detail: "not a zip".into(),
                })
            } else {
                Ok(located("Good", "1.0.0", f))
            }
        });

        let (snapshot, report) = scan_storage(&store).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(report.files_found, 2);
        assert_eq!(report.packages_indexed, 1);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.corrupt[0].path, PathBuf::from("/feed/bad.pkg"));
    }

    #[test]
    fn test_scan_all_corrupt_is_empty_feed() {
        let mut store = MockPackageStore::new();
        store
            .expect_list_package_files()
            .returning(|| Ok(vec![file("a.pkg", 0), file("b.pkg", 0)]));
        store.expect_read_package_metadata().returning(|f| {
            Err(FeedError::CorruptPackage {
                path: f.path.clone(),
                detail: "truncated".into(),
            })
        });

        let (snapshot, report) = scan_storage(&store).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(report.packages_indexed, 0);
        assert_eq!(report.corrupt.len(), report.files_found);
    }

    #[test]
    fn test_scan_storage_unavailable_is_fatal() {
        let mut store = MockPackageStore::new();
        store.expect_list_package_files().returning(|| {
            Err(FeedError::StorageUnavailable {
                path: PathBuf::from("/feed"),
                detail: "permission denied".into(),
            })
        });

        assert!(matches!(
            scan_storage(&store),
            Err(FeedError::StorageUnavailable { .. })
        ));
    }

    #[test_log::test]
    fn test_scan_newest_duplicate_wins() {
        let mut store = MockPackageStore::new();
        store.expect_list_package_files().returning(|| {
            Ok(vec![
                file("old.pkg", 500),
                file("new.pkg", 10),
                file("older.pkg", 900),
            ])
        });
        store
            .expect_read_package_metadata()
            .returning(|f| Ok(located("Foo", "1.0.0", f)));

        let (snapshot, report) = scan_storage(&store).unwrap();
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.packages_indexed, 1);

        let kept = snapshot
            .find("foo", &PackageVersion::parse("1.0.0").unwrap())
            .unwrap();
        assert_eq!(kept.content_location, PathBuf::from("/feed/new.pkg"));
    }

    #[test]
    fn test_stats_serialize_with_last_scan() {
        let mut store = MockPackageStore::new();
        store
            .expect_list_package_files()
            .returning(|| Ok(vec![file("a.pkg", 0)]));
        store
            .expect_read_package_metadata()
            .returning(|f| Ok(located("Foo", "1.0.0", f)));
        let (_, report) = scan_storage(&store).unwrap();

        let stats = IndexStats {
            packages: 1,
            rescans: 1,
            last_scan: Some(Arc::new(report)),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["packages"], 1);
        assert_eq!(json["last_scan"]["files_found"], 1);
        assert_eq!(json["last_scan"]["packages_indexed"], 1);

        let empty = IndexStats {
            packages: 0,
            rescans: 0,
            last_scan: None,
        };
        assert!(serde_json::to_value(&empty).unwrap()["last_scan"].is_null());
    }
}
