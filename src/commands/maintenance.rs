use anyhow::Result;
use std::sync::Arc;

use crate::service::FeedService;

use super::{parse_version, print_json};

/// Print where a package's bytes can be read from.
#[tracing::instrument(skip(service))]
pub fn download(service: &FeedService, id: &str, version: &str, json: bool) -> Result<()> {
    let version = parse_version(version)?;
    let target = service.download(id, &version)?;
    if json {
        return print_json(&target);
    }
    println!("{}", target.location.display());
    Ok(())
}

/// Rebuild the index from storage and report what was found.
#[tracing::instrument(skip(service))]
pub fn rescan(service: &FeedService, json: bool) -> Result<()> {
    let report = service.clear_cache()?;
    if json {
        return print_json(report.as_ref());
    }

    println!(
        "Indexed {} package(s) from {} file(s).",
        report.packages_indexed, report.files_found
    );
    if report.duplicates > 0 {
        println!("Ignored {} duplicate file(s).", report.duplicates);
    }
    if !report.corrupt.is_empty() {
        println!("\nSkipped packages:");
        for skipped in &report.corrupt {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    Ok(())
}

/// Keep the index in sync with storage until Ctrl-C.
pub async fn watch(service: Arc<FeedService>) -> Result<()> {
    let interval = service.settings().poll_interval();
    println!(
        "Watching for package changes every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );
    crate::watch::watch(service, interval).await
}
