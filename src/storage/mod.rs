//! Physical package storage.
//!
//! The index never touches package bytes directly. It asks a [`PackageStore`]
//! for the set of package files and for the metadata inside each one, and the
//! service layer asks it to write, delete or delist files on publish.

mod discovery;
mod filesystem;

pub use discovery::{find_package_files, is_package_file, is_symbols_package};
pub use filesystem::FileSystemStore;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::package::PackageRecord;
use crate::version::PackageVersion;

/// A package archive found in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageFile {
    pub path: PathBuf,
    pub last_modified: SystemTime,
}

#[cfg_attr(test, mockall::automock)]
pub trait PackageStore: Send + Sync {
    /// Every package file currently in storage.
    ///
    /// Fails with `StorageUnavailable` when the storage root cannot be listed.
    fn list_package_files(&self) -> Result<Vec<PackageFile>>;

    /// Read the record stored in one package file.
    ///
    /// Fails with `CorruptPackage` when the file is unreadable or its
    /// manifest is unusable.
    fn read_package_metadata(&self, file: &PackageFile) -> Result<PackageRecord>;

    /// Store archive bytes for `id`/`version`, replacing any existing file.
    fn write_package(&self, id: &str, version: &PackageVersion, bytes: &[u8])
    -> Result<PackageFile>;

    /// Delete a package file and its listing marker.
    fn delete_package(&self, location: &Path) -> Result<()>;

    /// Persist the listing state of a package file.
    fn set_listed(&self, location: &Path, listed: bool) -> Result<()>;
}
