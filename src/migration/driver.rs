//! Migration driver
//!
//! Validates the sheet, builds the lookup cache, then walks the rows: every
//! test root row becomes a created manual test and the step rows after it
//! become that test's script. Per-test and per-step failures are counted and
//! logged; only sheet and initialization failures end the run early.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::config::{MigrationSettings, Settings};
use crate::core::{MigrationReport, MigrationStatus};
use crate::entities::{collection, kind, EntityBuilder, EntityModel};
use crate::remote::{HttpWorkspace, RemoteError, Workspace};
use crate::sheet::{
    ColumnMap, DuplicateUniqueIdError, ImportRow, MissingColumnsError, Sheet, SheetError,
};

use super::context::RunContext;
use super::extension::ExtensionColumns;
use super::lookup::LookupCache;
use super::resolver::{ResolveError, Resolver};
use super::scan::{scan, ScanVisitor};
use super::steps::{StepOutcome, StepScript};
use super::upload::{UploadJob, UploadPool};

/// Why a sheet cannot be migrated at all
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("the file has no header row")]
    NoHeader,

    #[error(transparent)]
    MissingColumns(#[from] MissingColumnsError),

    #[error(transparent)]
    DuplicateUniqueId(#[from] DuplicateUniqueIdError),

    #[error("the file has no data rows")]
    NoDataRows,
}

impl PrepareError {
    pub fn status(&self) -> MigrationStatus {
        match self {
            PrepareError::Sheet(_) => MigrationStatus::InitSheetFailed,
            PrepareError::NoHeader | PrepareError::NoDataRows => MigrationStatus::EmptyFile,
            PrepareError::MissingColumns(_) | PrepareError::DuplicateUniqueId(_) => {
                MigrationStatus::IncorrectFile
            }
        }
    }
}

/// A sheet whose header and unique ids have been validated
#[derive(Debug, Clone)]
pub struct PreparedSheet {
    sheet: Sheet,
    columns: ColumnMap,
}

impl PreparedSheet {
    pub fn open(path: &Path) -> Result<Self, PrepareError> {
        Self::prepare(Sheet::open(path)?)
    }

    /// Validate the header and unique ids before any row is processed
    pub fn prepare(sheet: Sheet) -> Result<Self, PrepareError> {
        let header = sheet.header().ok_or(PrepareError::NoHeader)?;
        let columns = ColumnMap::from_header(header)?;
        columns.validate_unique_ids(sheet.rows())?;
        if sheet.rows().is_empty() {
            return Err(PrepareError::NoDataRows);
        }
        Ok(Self { sheet, columns })
    }

    pub fn header(&self) -> &[String] {
        self.sheet.header().unwrap_or_default()
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }
}

/// Why one test could not be created
#[derive(Debug, Error)]
enum TestFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("create request failed: {0}")]
    Create(#[from] RemoteError),

    #[error("created test came back without an id")]
    NoId,
}

/// Runs migrations against one workspace
pub struct Migrator {
    ws: Arc<dyn Workspace>,
    settings: MigrationSettings,
}

impl Migrator {
    pub fn new(ws: Arc<dyn Workspace>, settings: MigrationSettings) -> Self {
        Self { ws, settings }
    }

    /// Migrate every test of a prepared sheet
    ///
    /// Each call starts from a fresh lookup cache and fresh counters.
    pub fn run(&self, sheet: &PreparedSheet) -> MigrationReport {
        let lookups = match LookupCache::build(self.ws.as_ref(), &self.settings) {
            Ok(lookups) => lookups,
            Err(e) => {
                error!(error = %e, "failed to initialize lookup tables");
                return MigrationReport::aborted(e.status());
            }
        };

        let mut ctx = RunContext::new(self.settings.clone(), lookups);
        let extensions = ExtensionColumns::scan(sheet.header(), &ctx.settings.extension_fields);
        let pool = UploadPool::start(
            Arc::clone(&self.ws),
            Arc::clone(&ctx.counters),
            ctx.settings.upload_workers,
        );

        {
            let mut visitor = MigrationVisitor {
                ws: self.ws.as_ref(),
                ctx: &mut ctx,
                extensions: &extensions,
                pool: &pool,
                current: None,
            };
            scan(sheet.columns(), sheet.sheet().rows(), &mut visitor);
        }

        // Counters are final only once every queued upload has finished
        pool.drain();

        let report = ctx.counters.report();
        info!(
            status = %report.status,
            migrated_tests = report.migrated_tests,
            failed_tests = report.failed_tests,
            uploaded_steps = report.uploaded_steps,
            failed_steps = report.failed_steps,
            "migration finished"
        );
        report
    }
}

/// Open, validate, connect and migrate
pub fn migrate_file(path: &Path, settings: &Settings) -> MigrationReport {
    let sheet = match PreparedSheet::open(path) {
        Ok(sheet) => sheet,
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot migrate file");
            return MigrationReport::aborted(e.status());
        }
    };
    debug!(rows = sheet.sheet().rows().len(), "sheet validated");

    let ws = match HttpWorkspace::connect(&settings.connection) {
        Ok(ws) => ws,
        Err(e) => {
            error!(server = %settings.connection.server, error = %e, "cannot connect to the workspace");
            return MigrationReport::aborted(MigrationStatus::InitRemoteFailed);
        }
    };
    info!(workspace = %settings.connection.workspace_url(), "connected");

    Migrator::new(Arc::new(ws), settings.migration.clone()).run(&sheet)
}

struct CurrentTest {
    id: String,
    label: String,
    script: StepScript,
}

struct MigrationVisitor<'a> {
    ws: &'a dyn Workspace,
    ctx: &'a mut RunContext,
    extensions: &'a ExtensionColumns,
    pool: &'a UploadPool,
    current: Option<CurrentTest>,
}

impl MigrationVisitor<'_> {
    fn build_entity(&mut self, row: &ImportRow<'_>) -> Result<EntityModel, ResolveError> {
        let name = row.name().ok_or(ResolveError::MissingName)?;
        let label = row.label();
        let mut resolver = Resolver::new(self.ws, &mut self.ctx.lookups);

        let mut builder = EntityBuilder::new()
            .with_type(kind::MANUAL_TEST)
            .with_name(name)
            .with_owner(resolver.owner(row))
            .with_product_areas(resolver.product_areas(row)?);

        if let Some(description) = row.description() {
            builder = builder.with_description(description);
        }
        if let Some(designer) = resolver.designer(row) {
            builder = builder.with_designer(designer);
        }
        if let Some(phase) = resolver.phase(row) {
            builder = builder.with_phase(phase);
        }
        if let Some(test_types) = resolver.test_types(row) {
            builder = builder.with_test_types(test_types);
        }
        if let Some(tags) = resolver.user_tags(row) {
            builder = builder.with_user_tags(tags);
        }
        if let Some(covered) = resolver.covered_content(row) {
            builder = builder.with_covered_content(covered);
        }
        if let Some(minutes) = resolver.estimated_duration(row) {
            builder = builder.with_estimated_duration(minutes);
        }

        let ws = resolver.ws();
        for (field, value) in
            self.extensions
                .resolve(row.sheet_row(), &label, ws, resolver.cache())
        {
            builder = builder.with_extension(field, value);
        }

        Ok(builder.build())
    }

    fn create_test(&mut self, row: &ImportRow<'_>) -> Result<String, TestFailure> {
        let entity = self.build_entity(row)?;
        let created = self.ws.create(collection::MANUAL_TESTS, &entity)?;
        created.id().ok_or(TestFailure::NoId)
    }

    fn fail_step(&self, row: &ImportRow<'_>, reason: &str) {
        self.ctx.counters.add_failed_steps(1);
        warn!(row = row.number(), reason, "step not migrated");
    }
}

impl ScanVisitor for MigrationVisitor<'_> {
    fn start_test(&mut self, row: ImportRow<'_>) -> bool {
        let label = row.label();
        match self.create_test(&row) {
            Ok(id) => {
                if let Some(unique_id) = row.unique_id() {
                    self.ctx.record_migrated(unique_id, &id);
                }
                self.ctx.counters.add_migrated_test();
                info!("test {} => {}", label, id);
                self.current = Some(CurrentTest {
                    id,
                    label,
                    script: StepScript::new(),
                });
                true
            }
            Err(e) => {
                self.ctx.counters.add_failed_test();
                error!(unique_id = %label, row = row.number(), error = %e, "test not migrated");
                false
            }
        }
    }

    fn step(&mut self, row: ImportRow<'_>) {
        let Some(current) = self.current.as_mut() else {
            self.fail_step(&row, "no test to attach the step to");
            return;
        };

        let outcome = current.script.push(
            row.step_type(),
            row.step_description(),
            &self.ctx.migrated_ids,
        );
        match outcome {
            StepOutcome::Appended => {}
            StepOutcome::UnknownKind(Some(kind)) => {
                let reason = format!("unknown step type '{}'", kind);
                self.fail_step(&row, &reason);
            }
            StepOutcome::UnknownKind(None) => self.fail_step(&row, "step has no step_type"),
            StepOutcome::UnresolvedCall(target) => {
                let reason = format!("called test '{}' was not migrated before this step", target);
                self.fail_step(&row, &reason);
            }
            StepOutcome::Blank(kind) => {
                let reason = format!("{} step has no step_description", kind);
                self.fail_step(&row, &reason);
            }
        }
    }

    fn finish_test(&mut self) {
        let Some(test) = self.current.take() else {
            return;
        };
        if test.script.is_empty() {
            debug!(unique_id = %test.label, "test has no steps");
            return;
        }
        self.pool.submit(UploadJob {
            body: test.script.body(),
            steps: test.script.len(),
            test_id: test.id,
        });
    }

    fn skipped_step(&mut self, row: ImportRow<'_>) {
        debug!(row = row.number(), "step of a test that was not migrated, skipped");
    }

    fn orphan_step(&mut self, row: ImportRow<'_>) {
        self.fail_step(&row, "step appears before any test");
    }

    fn untyped_row(&mut self, row: ImportRow<'_>) {
        self.ctx.counters.add_failed_steps(1);
        error!(row = row.number(), "row has no type");
    }

    fn unknown_row(&mut self, row: ImportRow<'_>, inside_test: bool) {
        let row_type = row.row_type().unwrap_or_default();
        if inside_test {
            let reason = format!("row type '{}' is neither a test nor a step", row_type);
            self.fail_step(&row, &reason);
            return;
        }
        self.ctx.counters.add_failed_test();
        error!(
            unique_id = %row.label(),
            row = row.number(),
            row_type,
            "row type is neither a test nor a step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::lookup::tests::seeded_workspace;
    use crate::sheet::Column;

    fn header() -> Vec<String> {
        Column::all().iter().map(|c| c.header().to_string()).collect()
    }

    #[test]
    fn test_prepare_statuses() {
        let empty = Sheet::from_texts::<String>(&[]);
        assert_eq!(
            PreparedSheet::prepare(empty).unwrap_err().status(),
            MigrationStatus::EmptyFile
        );

        let header_only = Sheet::from_texts(&[header()]);
        assert_eq!(
            PreparedSheet::prepare(header_only).unwrap_err().status(),
            MigrationStatus::EmptyFile
        );

        let missing = Sheet::from_texts(&[vec!["name".to_string(), "type".to_string()]]);
        assert_eq!(
            PreparedSheet::prepare(missing).unwrap_err().status(),
            MigrationStatus::IncorrectFile
        );
    }

    #[test]
    fn test_run_twice_starts_fresh() {
        let ws = Arc::new(seeded_workspace());
        let mut row = vec![String::new(); Column::all().len()];
        let columns = ColumnMap::from_header(&header()).unwrap();
        row[columns.index(Column::Type)] = "test_manual".to_string();
        row[columns.index(Column::Name)] = "Login".to_string();
        row[columns.index(Column::UniqueId)] = "T1".to_string();
        let sheet = PreparedSheet::prepare(Sheet::from_texts(&[header(), row])).unwrap();

        let migrator = Migrator::new(ws.clone(), MigrationSettings::new("qa@example.com"));
        let first = migrator.run(&sheet);
        let second = migrator.run(&sheet);

        assert_eq!(first.migrated_tests, 1);
        assert_eq!(second.migrated_tests, 1);
        assert_eq!(second.status, MigrationStatus::Success);
        assert_eq!(ws.records(collection::MANUAL_TESTS).len(), 2);
    }

    #[test]
    fn test_init_failure_aborts() {
        let ws = Arc::new(seeded_workspace());
        ws.fail_queries_on(collection::PHASES);
        let columns = ColumnMap::from_header(&header()).unwrap();
        let mut row = vec![String::new(); Column::all().len()];
        row[columns.index(Column::Type)] = "test_manual".to_string();
        let sheet = PreparedSheet::prepare(Sheet::from_texts(&[header(), row])).unwrap();

        let report = Migrator::new(ws.clone(), MigrationSettings::new("qa@example.com")).run(&sheet);
        assert_eq!(report.status, MigrationStatus::InitPhasesFailed);
        assert!(ws.records(collection::MANUAL_TESTS).is_empty());
    }
}
