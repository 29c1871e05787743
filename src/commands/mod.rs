//! Command-line handlers.
//!
//! Each handler drives one [`FeedService`](crate::service::FeedService) operation and prints the result,
//! either as plain lines or, with `json`, as the wire-shaped entries a client
//! at the given compatibility level would receive.

mod browse;
mod maintenance;
mod publish;

pub use browse::{find, list, search, updates};
pub use maintenance::{download, rescan, watch};
pub use publish::{delete, push, relist};

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::compat::ClientCompatibility;
use crate::package::PackageRecord;
use crate::protocol::project_all;
use crate::version::PackageVersion;

/// Print records, one `id version` line each, or as JSON feed entries.
pub(crate) fn print_records(
    records: &[Arc<PackageRecord>],
    compatibility: ClientCompatibility,
    json: bool,
) -> Result<()> {
    if json {
        return print_json(&project_all(records, compatibility));
    }
    if records.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for record in records {
        let mut line = format!("{} {}", record.id, record.version);
        if !record.listed {
            line.push_str(" (delisted)");
        }
        println!("{}", line);
    }
    Ok(())
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

pub(crate) fn parse_version(text: &str) -> Result<PackageVersion> {
    PackageVersion::parse(text).with_context(|| format!("Invalid package version '{}'", text))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::archive::write_archive;
    use crate::package::PackageManifest;
    use crate::runtime::RealRuntime;
    use crate::service::FeedService;
    use crate::settings::FeedSettings;
    use tempfile::{TempDir, tempdir};

    /// A loaded service over an empty temporary feed.
    pub fn feed(settings: FeedSettings) -> (TempDir, FeedService) {
        let dir = tempdir().unwrap();
        let settings = FeedSettings {
            packages_path: Some(dir.path().join("packages")),
            ..settings
        };
        let service = FeedService::open(RealRuntime, settings).unwrap();
        (dir, service)
    }

    pub fn archive(id: &str, version: &str) -> Vec<u8> {
        write_archive(&PackageManifest::new(id, version), &[]).unwrap()
    }
}
