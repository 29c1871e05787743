//! Package file discovery under the storage root.

use anyhow::Result;
use glob::{MatchOptions, Pattern};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::archive::PACKAGE_EXTENSION;
use crate::runtime::Runtime;

const SYMBOLS_PATTERN: &str = "*.symbols.pkg";

/// Find every package archive below `root`, sorted by path.
///
/// A missing root yields no files. An unreadable root is an error; an
/// unreadable subdirectory is skipped with a warning.
#[tracing::instrument(skip(runtime))]
pub fn find_package_files<R: Runtime>(
    runtime: &R,
    root: &Path,
    skip_symbols: bool,
) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !runtime.exists(root) {
        debug!("Storage root {:?} does not exist", root);
        return Ok(found);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match runtime.read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e),
            Err(e) => {
                warn!("Skipping unreadable directory {:?}: {:#}", dir, e);
                continue;
            }
        };

        for path in entries {
            if runtime.is_dir(&path) {
                pending.push(path);
            } else if !is_package_file(&path) {
                continue;
            } else if skip_symbols && is_symbols_package(&path) {
                debug!("Ignoring symbols package {:?}", path);
            } else {
                found.push(path);
            }
        }
    }

    found.sort();
    debug!("Found {} package file(s) under {:?}", found.len(), root);
    Ok(found)
}

/// Whether a path names a package archive.
pub fn is_package_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// Whether a path names a symbols package (`*.symbols.pkg`).
pub fn is_symbols_package(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    Pattern::new(SYMBOLS_PATTERN).is_ok_and(|pattern| pattern.matches_with(name, options))
}
