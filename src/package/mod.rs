//! Package metadata.
//!
//! This module holds the record the index stores for each published package
//! version and the manifest format packages carry inside their archive.

mod manifest;
mod record;

pub use manifest::PackageManifest;
pub use record::{PackageContent, PackageKey, PackageRecord, validate_id};

#[cfg(test)]
pub(crate) use record::fixtures;
