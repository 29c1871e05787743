//! Storage polling.
//!
//! Packages dropped into or removed from the storage tree by other tools are
//! picked up by polling the file listing and rescanning when it changes.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::service::FeedService;
use crate::storage::PackageFile;

/// Poll storage every `interval` until Ctrl-C.
pub async fn watch(service: Arc<FeedService>, interval: Duration) -> Result<()> {
    watch_until(service, interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await
}

/// Poll storage every `interval` until `shutdown` completes.
#[tracing::instrument(skip(service, shutdown))]
pub async fn watch_until<F>(service: Arc<FeedService>, interval: Duration, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut last = list_files(&service).await?;
    info!("Watching {} package file(s)", last.len());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopping storage watcher");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let current = match list_files(&service).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Polling storage failed: {:#}", e);
                continue;
            }
        };
        if current == last {
            debug!("Storage unchanged");
            continue;
        }

        info!("Storage changed, rescanning");
        let rescanning = Arc::clone(&service);
        match tokio::task::spawn_blocking(move || rescanning.clear_cache())
            .await
            .context("Rescan task failed")?
        {
            Ok(report) => {
                info!(
                    "Rescan indexed {} package(s), skipped {}",
                    report.packages_indexed,
                    report.corrupt.len()
                );
                last = current;
            }
            Err(e) => warn!("Rescan failed: {}", e),
        }
    }
}

async fn list_files(service: &Arc<FeedService>) -> Result<Vec<PackageFile>> {
    let service = Arc::clone(service);
    let files = tokio::task::spawn_blocking(move || service.store().list_package_files())
        .await
        .context("Storage listing task failed")??;
    Ok(files)
}
