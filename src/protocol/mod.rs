//! Translation between wire parameters and typed queries.
//!
//! Clients send lists as `|`-delimited strings. This module turns them into
//! the typed arguments of the query functions and turns records back into
//! [`FeedEntry`] values shaped for the client's compatibility level.

mod projection;

pub use projection::{FeedEntry, download_path, project_all};

use log::debug;
use std::sync::Arc;

use crate::compat::ClientCompatibility;
use crate::framework::parse_framework_list;
use crate::index::IndexSnapshot;
use crate::package::PackageRecord;
use crate::query::{SearchFilter, UpdateOptions, get_updates, search};
use crate::version::PackageVersion;

/// A `GetUpdates` request after wire decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatesQuery {
    pub ids: Vec<String>,
    pub installed_versions: Vec<PackageVersion>,
    pub constraints: Vec<String>,
    pub options: UpdateOptions,
}

impl UpdatesQuery {
    /// Decode wire parameters.
    ///
    /// Ids and versions drop empty slots while constraints keep them, so an
    /// id can go unconstrained in the middle of the list. An empty
    /// constraint string leaves every id unconstrained. An installed version
    /// that fails to parse turns the whole query into one with no updates.
    pub fn from_wire(
        package_ids: &str,
        versions: &str,
        include_prerelease: bool,
        include_all_versions: bool,
        target_frameworks: &str,
        version_constraints: &str,
    ) -> Self {
        let options = UpdateOptions {
            include_prerelease,
            include_all_versions,
            target_frameworks: parse_framework_list(target_frameworks),
        };

        let ids = split_non_empty(package_ids);
        let installed_versions = match split_non_empty(versions)
            .iter()
            .map(|text| PackageVersion::parse(text))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Ignoring update query: {}", e);
                return UpdatesQuery {
                    options,
                    ..Default::default()
                };
            }
        };

        let constraints = if version_constraints.trim().is_empty() {
            vec![String::new(); ids.len()]
        } else {
            version_constraints
                .split('|')
                .map(|c| c.trim().to_string())
                .collect()
        };

        UpdatesQuery {
            ids,
            installed_versions,
            constraints,
            options,
        }
    }

    pub fn run(
        &self,
        snapshot: &IndexSnapshot,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        get_updates(
            snapshot,
            &self.ids,
            &self.installed_versions,
            &self.constraints,
            &self.options,
            compatibility,
        )
    }
}

/// A `Search` request after wire decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub filter: SearchFilter,
}

impl SearchQuery {
    /// Decode wire parameters. Quotes around the search term are dropped and
    /// malformed framework tokens are ignored.
    pub fn from_wire(
        search_term: Option<&str>,
        target_framework: &str,
        include_prerelease: bool,
        include_delisted: bool,
    ) -> Self {
        let term = search_term.map(unquote).unwrap_or_default();
        SearchQuery {
            filter: SearchFilter {
                term: term.to_string(),
                target_frameworks: parse_framework_list(target_framework),
                include_prerelease,
                include_delisted,
            },
        }
    }

    pub fn run(
        &self,
        snapshot: &IndexSnapshot,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        search(snapshot, &self.filter, compatibility)
    }
}

fn split_non_empty(text: &str) -> Vec<String> {
    text.trim()
        .split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
}
