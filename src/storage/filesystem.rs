use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::archive::{self, PACKAGE_EXTENSION};
use crate::error::{FeedError, Result};
use crate::hash::ContentHash;
use crate::package::{PackageContent, PackageRecord};
use crate::runtime::Runtime;
use crate::version::PackageVersion;

use super::{PackageFile, PackageStore, find_package_files};

const DELISTED_SUFFIX: &str = "delisted";
const STAGING_SUFFIX: &str = "tmp";

/// Package storage in a directory tree.
///
/// Layout: `<root>/<id>/<version>/<id>.<version>.pkg`, with the id and the
/// normalized version lowercased. A sibling `.pkg.delisted` file marks the
/// package as unlisted.
pub struct FileSystemStore<R: Runtime> {
    runtime: R,
    root: PathBuf,
    skip_symbols: bool,
}

impl<R: Runtime> FileSystemStore<R> {
    pub fn new(runtime: R, root: PathBuf) -> Self {
        Self {
            runtime,
            root,
            skip_symbols: false,
        }
    }

    /// Ignore `*.symbols.pkg` files when listing.
    pub fn skip_symbols(mut self, skip: bool) -> Self {
        self.skip_symbols = skip;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the archive for `id`/`version`.
    pub fn package_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        let id = id.to_lowercase();
        // Release labels compare case-insensitively.
        let version = version.to_string().to_lowercase();
        self.root
            .join(&id)
            .join(&version)
            .join(format!("{}.{}.{}", id, version, PACKAGE_EXTENSION))
    }

    fn delisted_marker(location: &Path) -> PathBuf {
        append_extension(location, DELISTED_SUFFIX)
    }

    fn last_modified(&self, path: &Path) -> SystemTime {
        self.runtime.modified(path).unwrap_or_else(|e| {
            warn!("Cannot read modification time of {:?}: {:#}", path, e);
            SystemTime::UNIX_EPOCH
        })
    }

    /// Remove now-empty version and id directories below the root.
    fn prune_empty_dirs(&self, location: &Path) {
        let mut dir = location.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            let empty = self
                .runtime
                .read_dir(current)
                .map(|entries| entries.is_empty())
                .unwrap_or(false);
            if !empty || self.runtime.remove_dir(current).is_err() {
                break;
            }
            debug!("Removed empty directory {:?}", current);
            dir = current.parent();
        }
    }
}

impl<R: Runtime> PackageStore for FileSystemStore<R> {
    #[tracing::instrument(skip(self))]
    fn list_package_files(&self) -> Result<Vec<PackageFile>> {
        if self.runtime.exists(&self.root) && !self.runtime.is_dir(&self.root) {
            return Err(FeedError::StorageUnavailable {
                path: self.root.clone(),
                detail: "not a directory".to_string(),
            });
        }

        let paths = find_package_files(&self.runtime, &self.root, self.skip_symbols).map_err(
            |e| FeedError::StorageUnavailable {
                path: self.root.clone(),
                detail: format!("{:#}", e),
            },
        )?;

        Ok(paths
            .into_iter()
            .map(|path| PackageFile {
                last_modified: self.last_modified(&path),
                path,
            })
            .collect())
    }

    #[tracing::instrument(skip(self), fields(path = ?file.path))]
    fn read_package_metadata(&self, file: &PackageFile) -> Result<PackageRecord> {
        let corrupt = |detail: String| FeedError::CorruptPackage {
            path: file.path.clone(),
            detail,
        };

        let bytes = self
            .runtime
            .read(&file.path)
            .map_err(|e| corrupt(format!("{:#}", e)))?;
        let manifest = archive::read_manifest(&bytes).map_err(|e| corrupt(e.to_string()))?;

        let content = PackageContent {
            hash: ContentHash::compute(&bytes),
            location: file.path.clone(),
            length: bytes.len() as u64,
            published_at: DateTime::<Utc>::from(file.last_modified),
            listed: !self.runtime.exists(&Self::delisted_marker(&file.path)),
        };
        PackageRecord::from_manifest(manifest, content).map_err(|e| corrupt(e.to_string()))
    }

    #[tracing::instrument(skip(self, bytes))]
    fn write_package(
        &self,
        id: &str,
        version: &PackageVersion,
        bytes: &[u8],
    ) -> Result<PackageFile> {
        let path = self.package_path(id, version);
        let write_failed = |e: anyhow::Error| FeedError::StorageWrite {
            path: path.clone(),
            detail: format!("{:#}", e),
        };

        if let Some(parent) = path.parent() {
            self.runtime.create_dir_all(parent).map_err(write_failed)?;
        }

        // Readers listing the tree must never see a half-written archive.
        let staging = append_extension(&path, STAGING_SUFFIX);
        self.runtime.write(&staging, bytes).map_err(write_failed)?;
        self.runtime.rename(&staging, &path).map_err(write_failed)?;

        let marker = Self::delisted_marker(&path);
        if self.runtime.exists(&marker) {
            self.runtime.remove_file(&marker).map_err(write_failed)?;
        }

        info!("Stored {} {} at {:?}", id, version, path);
        Ok(PackageFile {
            last_modified: self.last_modified(&path),
            path,
        })
    }

    #[tracing::instrument(skip(self))]
    fn delete_package(&self, location: &Path) -> Result<()> {
        let write_failed = |e: anyhow::Error| FeedError::StorageWrite {
            path: location.to_path_buf(),
            detail: format!("{:#}", e),
        };

        self.runtime.remove_file(location).map_err(write_failed)?;
        let marker = Self::delisted_marker(location);
        if self.runtime.exists(&marker) {
            self.runtime.remove_file(&marker).map_err(write_failed)?;
        }
        self.prune_empty_dirs(location);

        info!("Deleted {:?}", location);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn set_listed(&self, location: &Path, listed: bool) -> Result<()> {
        let write_failed = |e: anyhow::Error| FeedError::StorageWrite {
            path: location.to_path_buf(),
            detail: format!("{:#}", e),
        };

        if !self.runtime.exists(location) {
            return Err(FeedError::StorageWrite {
                path: location.to_path_buf(),
                detail: "package file is missing".to_string(),
            });
        }

        let marker = Self::delisted_marker(location);
        match (listed, self.runtime.exists(&marker)) {
            (true, true) => self.runtime.remove_file(&marker).map_err(write_failed)?,
            (false, false) => self.runtime.write(&marker, b"").map_err(write_failed)?,
            _ => {}
        }

        debug!("Marked {:?} listed={}", location, listed);
        Ok(())
    }
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
