use log::debug;
use std::sync::Arc;

use crate::compat::ClientCompatibility;
use crate::framework::{FrameworkMoniker, is_compatible_with_any};
use crate::index::IndexSnapshot;
use crate::package::PackageRecord;
use crate::version::{PackageVersion, VersionConstraint};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub include_prerelease: bool,
    /// Return every qualifying version instead of only the highest one.
    pub include_all_versions: bool,
    pub target_frameworks: Vec<FrameworkMoniker>,
}

/// Compute available updates for installed packages.
///
/// `ids`, `installed_versions` and `constraints` are parallel: entry `i` of
/// each describes one installed package. Empty or mismatched inputs yield no
/// updates. A constraint that is empty or fails to parse does not restrict
/// anything.
///
/// Results are grouped in input order, versions ascending within a group.
#[tracing::instrument(skip(snapshot, ids, installed_versions, constraints))]
pub fn get_updates<S: AsRef<str>>(
    snapshot: &IndexSnapshot,
    ids: &[S],
    installed_versions: &[PackageVersion],
    constraints: &[S],
    options: &UpdateOptions,
    compatibility: ClientCompatibility,
) -> Vec<Arc<PackageRecord>> {
    if ids.is_empty()
        || ids.len() != installed_versions.len()
        || ids.len() != constraints.len()
    {
        debug!(
            "Ignoring update query with {} id(s), {} version(s), {} constraint(s)",
            ids.len(),
            installed_versions.len(),
            constraints.len()
        );
        return Vec::new();
    }

    let mut updates = Vec::new();
    for ((id, installed), constraint) in ids.iter().zip(installed_versions).zip(constraints) {
        let id = id.as_ref();
        let constraint = parse_constraint(constraint.as_ref());

        let mut candidates: Vec<&Arc<PackageRecord>> = snapshot
            .versions_of(id)
            .iter()
            .filter(|record| record.listed && compatibility.can_see_version(&record.version))
            .filter(|record| record.version > *installed)
            .filter(|record| constraint.as_ref().is_none_or(|c| c.satisfies(&record.version)))
            .filter(|record| options.include_prerelease || !record.is_prerelease())
            .filter(|record| {
                is_compatible_with_any(&record.supported_frameworks, &options.target_frameworks)
            })
            .collect();

        if !options.include_all_versions && candidates.len() > 1 {
            candidates.drain(..candidates.len() - 1);
        }
        updates.extend(candidates.into_iter().cloned());
    }
    updates
}

fn parse_constraint(text: &str) -> Option<VersionConstraint> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match VersionConstraint::parse(text) {
        Ok(constraint) => Some(constraint),
        Err(e) => {
            debug!("Treating constraint as unconstrained: {}", e);
            None
        }
    }
}
