//! The feed service.
//!
//! [`FeedService`] wires settings, storage and the index together and
//! implements the publish, unpublish and download use cases on top of them.
//! Nothing is looked up globally: the caller builds the service once and
//! hands it to whatever serves requests.

use chrono::Utc;
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{self, PACKAGE_MEDIA_TYPE};
use crate::compat::ClientCompatibility;
use crate::error::{FeedError, Result};
use crate::hash::ContentHash;
use crate::index::{IndexStats, PackageIndex, ScanReport};
use crate::package::{PackageContent, PackageRecord, validate_id};
use crate::protocol::{SearchQuery, UpdatesQuery};
use crate::query;
use crate::runtime::Runtime;
use crate::settings::FeedSettings;
use crate::storage::{FileSystemStore, PackageStore};
use crate::version::PackageVersion;

/// What a download handler needs to stream one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadTarget {
    pub id: String,
    pub version: PackageVersion,
    pub location: PathBuf,
    pub media_type: &'static str,
    pub hash: ContentHash,
    pub length: u64,
}

pub struct FeedService {
    settings: FeedSettings,
    index: Arc<PackageIndex>,
    store: Arc<dyn PackageStore>,
    /// Serializes the check-then-write sequences of publish and unpublish.
    publish_lock: Mutex<()>,
}

impl FeedService {
    /// A service over `store`. The index starts empty and is loaded on the
    /// first mutation or an explicit [`FeedService::ensure_loaded`].
    pub fn new(settings: FeedSettings, store: Arc<dyn PackageStore>) -> Self {
        FeedService {
            index: Arc::new(PackageIndex::new(settings.allow_overwrite)),
            settings,
            store,
            publish_lock: Mutex::new(()),
        }
    }

    /// A service over filesystem storage at the configured root, loaded.
    #[tracing::instrument(skip(runtime, settings))]
    pub fn open<R: Runtime + 'static>(runtime: R, settings: FeedSettings) -> anyhow::Result<Self> {
        let root = settings.packages_root(&runtime)?;
        info!("Using packages root: {}", root.display());

        let store = FileSystemStore::new(runtime, root).skip_symbols(settings.ignore_symbols_packages);
        let service = FeedService::new(settings, Arc::new(store));
        service.ensure_loaded()?;
        Ok(service)
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<PackageIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn PackageStore> {
        &self.store
    }

    /// Load the index from storage unless a rescan already completed.
    pub fn ensure_loaded(&self) -> Result<()> {
        if !self.index.is_loaded() {
            self.clear_cache()?;
        }
        Ok(())
    }

    /// Rebuild the index from storage.
    pub fn clear_cache(&self) -> Result<Arc<ScanReport>> {
        self.index.clear_cache(self.store.as_ref())
    }

    /// Validate, store and index a package archive.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn publish(&self, bytes: &[u8]) -> Result<Arc<PackageRecord>> {
        let manifest = archive::read_manifest(bytes).map_err(|e| match e {
            FeedError::InvalidPackageMetadata { .. } => e,
            other => FeedError::InvalidPackageMetadata {
                detail: other.to_string(),
            },
        })?;
        validate_id(&manifest.id)?;
        let version = PackageVersion::parse(&manifest.version).map_err(|e| {
            FeedError::InvalidPackageMetadata {
                detail: e.to_string(),
            }
        })?;

        if self.settings.ignore_symbols_packages && archive::is_symbols_archive(bytes)? {
            return Err(FeedError::InvalidPackageMetadata {
                detail: format!("{} {} is a symbols package", manifest.id, version),
            });
        }

        self.ensure_loaded()?;
        let _guard = self.publish_lock.lock();
        if !self.settings.allow_overwrite && self.index.find_package(&manifest.id, &version).is_some() {
            return Err(FeedError::duplicate(&manifest.id, &version));
        }

        let file = self.store.write_package(&manifest.id, &version, bytes)?;
        let content = PackageContent {
            hash: ContentHash::compute(bytes),
            location: file.path,
            length: bytes.len() as u64,
            published_at: Utc::now(),
            listed: true,
        };
        let record = PackageRecord::from_manifest(manifest, content)?;
        // A rescan may already have indexed the file written above.
        self.index.upsert_package(record.clone());

        info!("Published {} {}", record.id, record.version);
        Ok(Arc::new(record))
    }

    /// Remove a package from the feed. With delisting enabled the package is
    /// hidden and stays downloadable; otherwise its file is deleted.
    #[tracing::instrument(skip(self))]
    pub fn unpublish(&self, id: &str, version: &PackageVersion) -> Result<()> {
        self.ensure_loaded()?;
        let _guard = self.publish_lock.lock();
        let record = self
            .index
            .find_package(id, version)
            .ok_or_else(|| FeedError::not_found(id, version))?;

        if self.settings.enable_delisting {
            self.store.set_listed(&record.content_location, false)?;
            self.index.set_listed(id, version, false)?;
            info!("Delisted {} {}", record.id, record.version);
        } else {
            self.store.delete_package(&record.content_location)?;
            self.index.remove_package(id, version)?;
            info!("Deleted {} {}", record.id, record.version);
        }
        Ok(())
    }

    /// Make a delisted package visible again.
    #[tracing::instrument(skip(self))]
    pub fn relist(&self, id: &str, version: &PackageVersion) -> Result<()> {
        self.ensure_loaded()?;
        let _guard = self.publish_lock.lock();
        let record = self
            .index
            .find_package(id, version)
            .ok_or_else(|| FeedError::not_found(id, version))?;

        self.store.set_listed(&record.content_location, true)?;
        self.index.set_listed(id, version, true)?;
        info!("Relisted {} {}", record.id, record.version);
        Ok(())
    }

    /// Resolve a package for download. Delisted packages resolve too.
    pub fn download(&self, id: &str, version: &PackageVersion) -> Result<DownloadTarget> {
        self.ensure_loaded()?;
        let record = self
            .index
            .find_package(id, version)
            .ok_or_else(|| FeedError::not_found(id, version))?;

        Ok(DownloadTarget {
            id: record.id.clone(),
            version: record.version.clone(),
            location: record.content_location.clone(),
            media_type: PACKAGE_MEDIA_TYPE,
            hash: record.content_hash.clone(),
            length: record.content_length,
        })
    }

    pub fn get_packages(&self, compatibility: ClientCompatibility) -> Vec<Arc<PackageRecord>> {
        self.index.get_packages(compatibility)
    }

    pub fn find_package(&self, id: &str, version: &PackageVersion) -> Option<Arc<PackageRecord>> {
        self.index.find_package(id, version)
    }

    pub fn find_packages_by_id(
        &self,
        id: &str,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        query::find_packages_by_id(&self.index.snapshot(), id, compatibility)
    }

    pub fn search(
        &self,
        query: &SearchQuery,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        if self.settings.enable_framework_filtering {
            return query.run(&self.index.snapshot(), compatibility);
        }
        let mut query = query.clone();
        query.filter.target_frameworks.clear();
        query.run(&self.index.snapshot(), compatibility)
    }

    pub fn get_updates(
        &self,
        query: &UpdatesQuery,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        if self.settings.enable_framework_filtering {
            return query.run(&self.index.snapshot(), compatibility);
        }
        let mut query = query.clone();
        query.options.target_frameworks.clear();
        query.run(&self.index.snapshot(), compatibility)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::package::PackageManifest;
    use crate::package::fixtures::record;
    use crate::runtime::RealRuntime;
    use crate::storage::{MockPackageStore, PackageFile};
    use std::sync::OnceLock;
    use std::time::SystemTime;
    use tempfile::{TempDir, tempdir};

    fn v(text: &str) -> PackageVersion {
        PackageVersion::parse(text).unwrap()
    }

    fn package(id: &str, version: &str, frameworks: &[&str]) -> Vec<u8> {
        let manifest = PackageManifest {
            frameworks: frameworks.iter().map(|f| f.to_string()).collect(),
            ..PackageManifest::new(id, version)
        };
        write_archive(&manifest, &[]).unwrap()
    }

    fn service(settings: FeedSettings) -> (TempDir, FeedService) {
        let dir = tempdir().unwrap();
        let settings = FeedSettings {
            packages_path: Some(dir.path().to_path_buf()),
            ..settings
        };
        let service = FeedService::open(RealRuntime, settings).unwrap();
        (dir, service)
    }

    #[test_log::test]
    fn test_publish_then_find_and_download() {
        let (_dir, service) = service(FeedSettings::default());
        let bytes = package("Foo", "1.0.0", &[]);
        let record = service.publish(&bytes).unwrap();
        assert_eq!(record.id, "Foo");

        let target = service.download("foo", &v("1.0.0")).unwrap();
        assert_eq!(target.media_type, "application/zip");
        assert_eq!(std::fs::read(&target.location).unwrap(), bytes);
        assert!(target.hash.verify(&bytes));
    }

    #[test]
    fn test_publish_duplicate() {
        let (_dir, service) = service(FeedSettings::default());
        service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        let result = service.publish(&package("foo", "1.0", &[]));
        assert!(matches!(result, Err(FeedError::DuplicateVersion { .. })));
    }

    #[test]
    fn test_publish_overwrite_allowed() {
        let settings = FeedSettings {
            allow_overwrite: true,
            ..Default::default()
        };
        let (_dir, service) = service(settings);
        service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        service.publish(&package("Foo", "1.0.0", &["net45"])).unwrap();

        let record = service.find_package("foo", &v("1.0.0")).unwrap();
        assert_eq!(record.supported_frameworks.len(), 1);
        assert_eq!(service.stats().packages, 1);
    }

    #[test]
    fn test_overwrite_with_other_label_case_then_delete_stays_deleted() {
        let settings = FeedSettings {
            allow_overwrite: true,
            ..Default::default()
        };
        let (dir, service) = service(settings);
        service.publish(&package("Foo", "1.0.0-BETA", &[])).unwrap();
        service.publish(&package("Foo", "1.0.0-beta", &[])).unwrap();

        let versions: Vec<_> = std::fs::read_dir(dir.path().join("foo")).unwrap().collect();
        assert_eq!(versions.len(), 1);

        service.unpublish("foo", &v("1.0.0-beta")).unwrap();
        assert!(service.find_package("foo", &v("1.0.0-BETA")).is_none());

        service.clear_cache().unwrap();
        assert!(service.find_package("foo", &v("1.0.0-beta")).is_none());
        assert_eq!(service.stats().packages, 0);
    }

    #[test]
    fn test_publish_succeeds_when_rescan_indexes_it_first() {
        let index: Arc<OnceLock<Arc<PackageIndex>>> = Arc::new(OnceLock::new());
        let location = PathBuf::from("/feed/foo/1.0.0/foo.1.0.0.pkg");

        let mut store = MockPackageStore::new();
        store.expect_list_package_files().returning(|| Ok(Vec::new()));
        let shared = Arc::clone(&index);
        let written = location.clone();
        store.expect_write_package().returning(move |_, _, _| {
            // A rescan lands between the file rename and the index insert
            let file = PackageFile {
                path: written.clone(),
                last_modified: SystemTime::now(),
            };
            let mut rescan_store = MockPackageStore::new();
            let listed = file.clone();
            rescan_store
                .expect_list_package_files()
                .returning(move || Ok(vec![listed.clone()]));
            let scanned = PackageRecord {
                content_location: written.clone(),
                ..record("Foo", "1.0.0")
            };
            rescan_store
                .expect_read_package_metadata()
                .returning(move |_| Ok(scanned.clone()));
            shared.get().unwrap().clear_cache(&rescan_store).unwrap();
            Ok(file)
        });

        let service = FeedService::new(FeedSettings::default(), Arc::new(store));
        assert!(index.set(Arc::clone(service.index())).is_ok());

        let published = service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        assert_eq!(published.content_location, location);
        assert_eq!(service.stats().packages, 1);
        assert!(service.find_package("foo", &v("1.0.0")).is_some());
    }

    #[test]
    fn test_publish_rejects_invalid_metadata() {
        let (_dir, service) = service(FeedSettings::default());
        for bytes in [
            b"not an archive".to_vec(),
            package("Foo", "one.two", &[]),
            package("bad id", "1.0.0", &[]),
        ] {
            assert!(matches!(
                service.publish(&bytes),
                Err(FeedError::InvalidPackageMetadata { .. })
            ));
        }
        assert_eq!(service.stats().packages, 0);
    }

    #[test]
    fn test_publish_rejects_symbols_when_configured() {
        let manifest = PackageManifest::new("Foo", "1.0.0");
        let symbols = write_archive(
            &manifest,
            &[
                ("lib/foo.pdb", b"pdb".as_slice()),
                ("src/foo.cs", b"src".as_slice()),
            ],
        )
        .unwrap();

        let (_dir, accepting) = service(FeedSettings::default());
        assert!(accepting.publish(&symbols).is_ok());

        let settings = FeedSettings {
            ignore_symbols_packages: true,
            ..Default::default()
        };
        let (_dir, rejecting) = service(settings);
        assert!(rejecting.publish(&symbols).is_err());
    }

    #[test]
    fn test_unpublish_deletes_by_default() {
        let (dir, service) = service(FeedSettings::default());
        service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        service.unpublish("FOO", &v("1.0.0")).unwrap();

        assert!(service.find_package("foo", &v("1.0.0")).is_none());
        assert!(!dir.path().join("foo").exists());
        assert!(matches!(
            service.unpublish("foo", &v("1.0.0")),
            Err(FeedError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unpublish_delists_when_enabled() {
        let settings = FeedSettings {
            enable_delisting: true,
            ..Default::default()
        };
        let (_dir, service) = service(settings);
        service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        service.unpublish("foo", &v("1.0.0")).unwrap();

        assert!(service.get_packages(ClientCompatibility::Legacy).is_empty());
        assert!(service.download("foo", &v("1.0.0")).is_ok());

        // Listing state survives a rescan
        service.clear_cache().unwrap();
        assert!(!service.find_package("foo", &v("1.0.0")).unwrap().listed);

        service.relist("foo", &v("1.0.0")).unwrap();
        service.clear_cache().unwrap();
        assert_eq!(service.get_packages(ClientCompatibility::Legacy).len(), 1);
    }

    #[test]
    fn test_rescan_sees_published_packages() {
        let (dir, service) = service(FeedSettings::default());
        service.publish(&package("Foo", "1.0.0", &[])).unwrap();
        service.publish(&package("Bar", "2.0.0", &[])).unwrap();

        let reopened = FeedService::open(
            RealRuntime,
            FeedSettings {
                packages_path: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(reopened.stats().packages, 2);
        assert_eq!(reopened.stats().rescans, 1);
    }

    #[test]
    fn test_framework_filtering_can_be_disabled() {
        let (_dir, filtering) = service(FeedSettings::default());
        filtering.publish(&package("Foo", "1.0.0", &["net6.0"])).unwrap();
        let query = SearchQuery::from_wire(None, "net45", false, false);
        assert!(filtering.search(&query, ClientCompatibility::Legacy).is_empty());

        let settings = FeedSettings {
            enable_framework_filtering: false,
            ..Default::default()
        };
        let (_dir, ignoring) = service(settings);
        ignoring.publish(&package("Foo", "1.0.0", &["net6.0"])).unwrap();
        assert_eq!(ignoring.search(&query, ClientCompatibility::Legacy).len(), 1);

        let updates = UpdatesQuery::from_wire("Foo", "0.9", false, false, "net45", "");
        assert!(filtering.get_updates(&updates, ClientCompatibility::Legacy).is_empty());
        assert_eq!(ignoring.get_updates(&updates, ClientCompatibility::Legacy).len(), 1);
    }
}
