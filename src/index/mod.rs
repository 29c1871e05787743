//! The package index.
//!
//! [`PackageIndex`] holds the current [`IndexSnapshot`] behind an atomic
//! pointer. Readers load the pointer and work on that immutable snapshot
//! without taking any lock. Writers serialize on a mutex, derive a new
//! snapshot from the current one and swap it in.
//!
//! A rescan builds its snapshot from storage without holding the writer
//! lock. Mutations that land meanwhile are journaled and replayed onto the
//! rescanned snapshot before it is installed. Concurrent rescan requests
//! coalesce: a caller that arrives while a rescan is running waits for it
//! and shares its report.

mod rescan;
mod snapshot;

pub use rescan::{IndexStats, ScanReport, SkippedPackage};
pub use snapshot::IndexSnapshot;

use arc_swap::{ArcSwap, ArcSwapOption};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compat::ClientCompatibility;
use crate::error::{FeedError, Result};
use crate::package::{PackageKey, PackageRecord};
use crate::storage::PackageStore;
use crate::version::PackageVersion;

use snapshot::Mutation;

#[derive(Default)]
struct WriterState {
    /// Present while a rescan is building its snapshot.
    journal: Option<Vec<Mutation>>,
}

impl WriterState {
    fn record(&mut self, mutation: Mutation) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(mutation);
        }
    }
}

pub struct PackageIndex {
    current: ArcSwap<IndexSnapshot>,
    writer: Mutex<WriterState>,
    allow_overwrite: bool,
    rescan_gate: Mutex<()>,
    rescans_completed: AtomicU64,
    last_scan: ArcSwapOption<ScanReport>,
}

impl PackageIndex {
    /// An empty index. With `allow_overwrite`, adding an existing id and
    /// version replaces the record instead of failing.
    pub fn new(allow_overwrite: bool) -> Self {
        PackageIndex {
            current: ArcSwap::from_pointee(IndexSnapshot::empty()),
            writer: Mutex::new(WriterState::default()),
            allow_overwrite,
            rescan_gate: Mutex::new(()),
            rescans_completed: AtomicU64::new(0),
            last_scan: ArcSwapOption::empty(),
        }
    }

    /// The current snapshot, for several reads against one consistent view.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }

    /// Whether at least one rescan has completed.
    pub fn is_loaded(&self) -> bool {
        self.rescans_completed.load(Ordering::Acquire) > 0
    }

    pub fn allows_overwrite(&self) -> bool {
        self.allow_overwrite
    }

    #[tracing::instrument(skip(self, record), fields(id = %record.id, version = %record.version))]
    pub fn add_package(&self, record: PackageRecord) -> Result<()> {
        self.insert(record, self.allow_overwrite)
    }

    /// Add or replace a record regardless of the overwrite setting.
    ///
    /// For callers that already checked for duplicates under their own lock
    /// and must not fail when a rescan picked the record up meanwhile.
    #[tracing::instrument(skip(self, record), fields(id = %record.id, version = %record.version))]
    pub fn upsert_package(&self, record: PackageRecord) {
        // Cannot fail with replace enabled.
        let _ = self.insert(record, true);
    }

    fn insert(&self, record: PackageRecord, replace: bool) -> Result<()> {
        let record = Arc::new(record);
        let mut writer = self.writer.lock();
        let current = self.current.load();
        if !replace && current.contains(&record.id, &record.version) {
            return Err(FeedError::duplicate(&record.id, &record.version));
        }

        self.current
            .store(Arc::new(current.with_added(Arc::clone(&record))));
        writer.record(Mutation::Add(record));
        debug!("Added package to index");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_package(&self, id: &str, version: &PackageVersion) -> Result<()> {
        let key = PackageKey::new(id, version.clone());
        let mut writer = self.writer.lock();
        let next = self
            .current
            .load()
            .with_removed(&key)
            .ok_or_else(|| FeedError::not_found(id, version))?;

        self.current.store(Arc::new(next));
        writer.record(Mutation::Remove(key));
        debug!("Removed package from index");
        Ok(())
    }

    /// Change the listing state of one record.
    #[tracing::instrument(skip(self))]
    pub fn set_listed(&self, id: &str, version: &PackageVersion, listed: bool) -> Result<()> {
        let key = PackageKey::new(id, version.clone());
        let mut writer = self.writer.lock();
        let next = self
            .current
            .load()
            .with_listed(&key, listed)
            .ok_or_else(|| FeedError::not_found(id, version))?;

        self.current.store(Arc::new(next));
        writer.record(Mutation::SetListed(key, listed));
        Ok(())
    }

    /// Rebuild the index from storage.
    ///
    /// Corrupt packages are skipped and listed in the report. Fails only when
    /// storage cannot be listed, in which case the current snapshot stays.
    #[tracing::instrument(skip(self, store))]
    pub fn clear_cache(&self, store: &dyn PackageStore) -> Result<Arc<ScanReport>> {
        let observed = self.rescans_completed.load(Ordering::Acquire);
        let _gate = self.rescan_gate.lock();
        if self.rescans_completed.load(Ordering::Acquire) != observed {
            if let Some(report) = self.last_scan.load_full() {
                debug!("Joined a rescan that finished while waiting");
                return Ok(report);
            }
        }

        self.writer.lock().journal = Some(Vec::new());
        let (snapshot, report) = match rescan::scan_storage(store) {
            Ok(scanned) => scanned,
            Err(e) => {
                self.writer.lock().journal = None;
                return Err(e);
            }
        };

        {
            let mut writer = self.writer.lock();
            let journal = writer.journal.take().unwrap_or_default();
            if !journal.is_empty() {
                debug!("Replaying {} mutation(s) onto rescanned index", journal.len());
            }
            self.current.store(Arc::new(snapshot.replay(journal)));
        }

        let report = Arc::new(report);
        self.last_scan.store(Some(Arc::clone(&report)));
        self.rescans_completed.fetch_add(1, Ordering::AcqRel);
        info!("Index rebuilt with {} package(s)", self.current.load().len());
        Ok(report)
    }

    /// Every record visible at `compatibility`, id then version ascending.
    pub fn get_packages(&self, compatibility: ClientCompatibility) -> Vec<Arc<PackageRecord>> {
        self.current
            .load()
            .iter()
            .filter(|record| compatibility.can_see(record))
            .cloned()
            .collect()
    }

    /// Exact lookup, delisted records included.
    pub fn find_package(&self, id: &str, version: &PackageVersion) -> Option<Arc<PackageRecord>> {
        self.current.load().find(id, version).cloned()
    }

    /// All versions of one id visible at `compatibility`, ascending.
    pub fn find_packages_by_id(
        &self,
        id: &str,
        compatibility: ClientCompatibility,
    ) -> Vec<Arc<PackageRecord>> {
        self.current
            .load()
            .versions_of(id)
            .iter()
            .filter(|record| compatibility.can_see(record))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            packages: self.current.load().len(),
            rescans: self.rescans_completed.load(Ordering::Acquire),
            last_scan: self.last_scan.load_full(),
        }
    }
}

impl Default for PackageIndex {
    fn default() -> Self {
        Self::new(false)
    }
}
