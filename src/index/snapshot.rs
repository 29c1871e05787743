use std::collections::BTreeMap;
use std::sync::Arc;

use crate::package::{PackageKey, PackageRecord};
use crate::version::PackageVersion;

/// Immutable point-in-time view of the index.
///
/// Ids map case-insensitively to their versions in ascending order. Deriving
/// a new snapshot shares every untouched id's version list with the old one.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    packages: BTreeMap<String, Arc<Vec<Arc<PackageRecord>>>>,
    len: usize,
}

/// A single index mutation, replayable onto another snapshot.
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    Add(Arc<PackageRecord>),
    Remove(PackageKey),
    SetListed(PackageKey, bool),
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from records with unique keys.
    pub(crate) fn from_records(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        let mut packages: BTreeMap<String, Vec<Arc<PackageRecord>>> = BTreeMap::new();
        let mut len = 0;
        for record in records {
            packages
                .entry(record.id.to_lowercase())
                .or_default()
                .push(Arc::new(record));
            len += 1;
        }

        let packages = packages
            .into_iter()
            .map(|(id, mut versions)| {
                versions.sort_by(|a, b| a.version.cmp(&b.version));
                (id, Arc::new(versions))
            })
            .collect();
        IndexSnapshot { packages, len }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every record, id ascending then version ascending.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageRecord>> {
        self.packages.values().flat_map(|versions| versions.iter())
    }

    /// All versions of one id, ascending. Empty when the id is unknown.
    pub fn versions_of(&self, id: &str) -> &[Arc<PackageRecord>] {
        self.packages
            .get(&id.to_lowercase())
            .map(|versions| versions.as_slice())
            .unwrap_or(&[])
    }

    pub fn find(&self, id: &str, version: &PackageVersion) -> Option<&Arc<PackageRecord>> {
        let versions = self.versions_of(id);
        versions
            .binary_search_by(|r| r.version.cmp(version))
            .ok()
            .map(|i| &versions[i])
    }

    pub fn contains(&self, id: &str, version: &PackageVersion) -> bool {
        self.find(id, version).is_some()
    }

    /// Snapshot with `record` inserted, replacing a record with the same key.
    pub(crate) fn with_added(&self, record: Arc<PackageRecord>) -> Self {
        let key = record.id.to_lowercase();
        let mut versions = self.versions_of(&key).to_vec();
        let mut len = self.len;
        match versions.binary_search_by(|r| r.version.cmp(&record.version)) {
            Ok(i) => versions[i] = record,
            Err(i) => {
                versions.insert(i, record);
                len += 1;
            }
        }

        let mut packages = self.packages.clone();
        packages.insert(key, Arc::new(versions));
        IndexSnapshot { packages, len }
    }

    /// Snapshot without the record for `key`, or `None` if it is absent.
    pub(crate) fn with_removed(&self, key: &PackageKey) -> Option<Self> {
        let mut versions = self.versions_of(key.id()).to_vec();
        let i = versions
            .binary_search_by(|r| r.version.cmp(key.version()))
            .ok()?;
        versions.remove(i);

        let mut packages = self.packages.clone();
        if versions.is_empty() {
            packages.remove(key.id());
        } else {
            packages.insert(key.id().to_string(), Arc::new(versions));
        }
        Some(IndexSnapshot {
            packages,
            len: self.len - 1,
        })
    }

    /// Snapshot with the listing state of `key` changed, or `None` if absent.
    pub(crate) fn with_listed(&self, key: &PackageKey, listed: bool) -> Option<Self> {
        let record = self.find(key.id(), key.version())?;
        if record.listed == listed {
            return Some(self.clone());
        }
        Some(self.with_added(Arc::new(record.with_listed(listed))))
    }

    /// Apply mutations in order. Mutations that no longer apply are skipped.
    pub(crate) fn replay(self, mutations: Vec<Mutation>) -> Self {
        mutations
            .into_iter()
            .fold(self, |snapshot, mutation| match mutation {
                Mutation::Add(record) => snapshot.with_added(record),
                Mutation::Remove(key) => snapshot.with_removed(&key).unwrap_or(snapshot),
                Mutation::SetListed(key, listed) => {
                    snapshot.with_listed(&key, listed).unwrap_or(snapshot)
                }
            })
    }
}
