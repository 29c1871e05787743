//! Package archives.
//!
//! A package is a zip archive carrying a `package.json` manifest at its root
//! next to whatever content the package ships. The feed only ever reads the
//! manifest; the rest of the archive is streamed to clients untouched.

use log::debug;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FeedError, Result};
use crate::package::PackageManifest;

/// Name of the manifest entry inside a package archive.
pub const MANIFEST_ENTRY: &str = "package.json";

/// File extension of package archives.
pub const PACKAGE_EXTENSION: &str = "pkg";

/// Media type used when package bytes are served.
pub const PACKAGE_MEDIA_TYPE: &str = "application/zip";

/// Largest manifest accepted, uncompressed.
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Read the manifest out of archive bytes.
pub fn read_manifest(bytes: &[u8]) -> Result<PackageManifest> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    // Manifest name is matched case-insensitively, root entries only.
    let entry_name = archive
        .file_names()
        .find(|name| name.eq_ignore_ascii_case(MANIFEST_ENTRY))
        .map(String::from)
        .ok_or_else(|| FeedError::InvalidPackageMetadata {
            detail: format!("archive has no {}", MANIFEST_ENTRY),
        })?;

    let entry = archive.by_name(&entry_name)?;
    let mut content = String::new();
    entry
        .take(MAX_MANIFEST_SIZE + 1)
        .read_to_string(&mut content)?;
    if content.len() as u64 > MAX_MANIFEST_SIZE {
        return Err(FeedError::InvalidPackageMetadata {
            detail: format!("{} is larger than {} bytes", entry_name, MAX_MANIFEST_SIZE),
        });
    }
    debug!("Read {} ({} bytes)", entry_name, content.len());

    Ok(serde_json::from_str(&content)?)
}

/// Whether archive bytes look like a symbols package: debug symbols
/// (`*.pdb`) shipped together with a `src/` tree.
pub fn is_symbols_archive(bytes: &[u8]) -> Result<bool> {
    let archive = ZipArchive::new(Cursor::new(bytes))?;
    let names: Vec<String> = archive
        .file_names()
        .map(|name| name.replace('\\', "/").to_ascii_lowercase())
        .collect();
    let has_symbols = names.iter().any(|name| name.ends_with(".pdb"));
    let has_sources = names.iter().any(|name| name.starts_with("src/"));
    Ok(has_symbols && has_sources)
}

/// Build archive bytes from a manifest plus extra content files.
pub fn write_archive(manifest: &PackageManifest, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    writer.start_file(MANIFEST_ENTRY, entry_options())?;
    writer.write_all(&serde_json::to_vec_pretty(manifest)?)?;

    for (name, data) in files {
        if name.eq_ignore_ascii_case(MANIFEST_ENTRY) {
            continue;
        }
        writer.start_file(*name, entry_options())?;
        writer.write_all(data)?;
    }

    Ok(writer.finish()?.into_inner())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}
