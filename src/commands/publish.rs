use anyhow::{Context, Result, bail};
use log::debug;
use std::path::Path;

use crate::runtime::Runtime;
use crate::service::FeedService;
use crate::storage::is_symbols_package;

use super::{parse_version, print_json};

/// Publish a package file.
#[tracing::instrument(skip(runtime, service))]
pub fn push<R: Runtime>(runtime: &R, service: &FeedService, file: &Path, json: bool) -> Result<()> {
    if service.settings().ignore_symbols_packages && is_symbols_package(file) {
        bail!("Refusing to publish symbols package {}", file.display());
    }

    let bytes = runtime
        .read(file)
        .with_context(|| format!("Failed to read package {}", file.display()))?;
    debug!("Read {} bytes from {:?}", bytes.len(), file);

    let record = service
        .publish(&bytes)
        .with_context(|| format!("Failed to publish {}", file.display()))?;

    if json {
        print_json(record.as_ref())
    } else {
        println!("Published {} {}", record.id, record.version);
        Ok(())
    }
}

/// Unpublish a package: delist it or delete it, depending on settings.
#[tracing::instrument(skip(service))]
pub fn delete(service: &FeedService, id: &str, version: &str) -> Result<()> {
    let version = parse_version(version)?;
    service.unpublish(id, &version)?;
    if service.settings().enable_delisting {
        println!("Delisted {} {}", id, version);
    } else {
        println!("Deleted {} {}", id, version);
    }
    Ok(())
}

/// Make a delisted package visible again.
#[tracing::instrument(skip(service))]
pub fn relist(service: &FeedService, id: &str, version: &str) -> Result<()> {
    let version = parse_version(version)?;
    service.relist(id, &version)?;
    println!("Relisted {} {}", id, version);
    Ok(())
}
