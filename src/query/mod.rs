//! Read-only queries over an index snapshot.
//!
//! Each query takes the snapshot captured at the start of a request and the
//! compatibility level negotiated for it, so that every query made while
//! serving one request sees the same packages.

mod updates;

pub use updates::{UpdateOptions, get_updates};

use std::sync::Arc;

use crate::compat::ClientCompatibility;
use crate::framework::{FrameworkMoniker, is_compatible_with_any};
use crate::index::IndexSnapshot;
use crate::package::PackageRecord;

/// Parameters of a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Substring matched case-insensitively against id, title, description
    /// and tags. Empty matches everything.
    pub term: String,
    /// A record is kept when compatible with at least one of these.
    pub target_frameworks: Vec<FrameworkMoniker>,
    pub include_prerelease: bool,
    /// Only honored for clients that understand delisting.
    pub include_delisted: bool,
}

impl SearchFilter {
    pub fn new(term: impl Into<String>) -> Self {
        SearchFilter {
            term: term.into(),
            ..Default::default()
        }
    }
}

/// Search the snapshot. Results are ordered by id, then version.
#[tracing::instrument(skip(snapshot))]
pub fn search(
    snapshot: &IndexSnapshot,
    filter: &SearchFilter,
    compatibility: ClientCompatibility,
) -> Vec<Arc<PackageRecord>> {
    let term = filter.term.trim().to_lowercase();
    let show_delisted = filter.include_delisted && compatibility.shows_delisted();

    snapshot
        .iter()
        .filter(|record| record.listed || show_delisted)
        .filter(|record| compatibility.can_see_version(&record.version))
        .filter(|record| filter.include_prerelease || !record.is_prerelease())
        .filter(|record| record.matches_term(&term))
        .filter(|record| is_compatible_with_any(&record.supported_frameworks, &filter.target_frameworks))
        .cloned()
        .collect()
}

/// All listed versions of one id, ascending.
///
/// Delisted versions are never returned here, whatever the client level.
pub fn find_packages_by_id(
    snapshot: &IndexSnapshot,
    id: &str,
    compatibility: ClientCompatibility,
) -> Vec<Arc<PackageRecord>> {
    snapshot
        .versions_of(id)
        .iter()
        .filter(|record| record.listed && compatibility.can_see_version(&record.version))
        .cloned()
        .collect()
}
