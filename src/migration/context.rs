//! Per-run state

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::config::MigrationSettings;
use crate::core::{MigrationReport, MigrationStatus};

use super::lookup::LookupCache;

/// Aggregate counters of a run
///
/// Shared with the upload workers, which add uploaded and failed steps
/// concurrently with the scan.
#[derive(Debug, Default)]
pub struct MigrationCounters {
    migrated_tests: AtomicUsize,
    failed_tests: AtomicUsize,
    uploaded_steps: AtomicUsize,
    failed_steps: AtomicUsize,
}

impl MigrationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_migrated_test(&self) {
        self.migrated_tests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed_test(&self) {
        self.failed_tests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_uploaded_steps(&self, steps: usize) {
        self.uploaded_steps.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn add_failed_steps(&self, steps: usize) {
        self.failed_steps.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn migrated_tests(&self) -> usize {
        self.migrated_tests.load(Ordering::Relaxed)
    }

    pub fn failed_tests(&self) -> usize {
        self.failed_tests.load(Ordering::Relaxed)
    }

    pub fn uploaded_steps(&self) -> usize {
        self.uploaded_steps.load(Ordering::Relaxed)
    }

    pub fn failed_steps(&self) -> usize {
        self.failed_steps.load(Ordering::Relaxed)
    }

    /// Final report; only meaningful once every upload has finished
    pub fn report(&self) -> MigrationReport {
        MigrationReport::from_counts(
            self.migrated_tests(),
            self.failed_tests(),
            self.uploaded_steps(),
            self.failed_steps(),
        )
    }

    /// Report with an explicit status, counters included
    pub fn report_with(&self, status: MigrationStatus) -> MigrationReport {
        MigrationReport {
            status,
            ..self.report()
        }
    }
}

/// Everything one migration run owns
///
/// Built once per invocation and dropped at its end, so independent runs
/// never share lookups, counters or migrated ids.
#[derive(Debug)]
pub struct RunContext {
    pub settings: MigrationSettings,
    pub lookups: LookupCache,
    pub counters: Arc<MigrationCounters>,
    /// Sheet unique id to remote id of every test created so far
    pub migrated_ids: HashMap<String, String>,
}

impl RunContext {
    pub fn new(settings: MigrationSettings, lookups: LookupCache) -> Self {
        Self {
            settings,
            lookups,
            counters: Arc::new(MigrationCounters::new()),
            migrated_ids: HashMap::new(),
        }
    }

    /// Remember a created test so later call steps can reference it
    pub fn record_migrated(&mut self, unique_id: &str, remote_id: &str) {
        self.migrated_ids
            .insert(unique_id.to_string(), remote_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_report() {
        let counters = MigrationCounters::new();
        counters.add_migrated_test();
        counters.add_migrated_test();
        counters.add_failed_test();
        counters.add_uploaded_steps(4);

        let report = counters.report();
        assert_eq!(report.migrated_tests, 2);
        assert_eq!(report.failed_tests, 1);
        assert_eq!(report.uploaded_steps, 4);
        assert_eq!(report.status, MigrationStatus::NotAllTestsWereMigrated);

        counters.add_failed_steps(1);
        assert_eq!(
            counters.report().status,
            MigrationStatus::NotAllTestsAndStepsWereMigrated
        );
    }

    #[test]
    fn test_fresh_counters_succeed() {
        assert_eq!(MigrationCounters::new().report().status, MigrationStatus::Success);
    }
}
