//! Test and step migration pipeline
//!
//! Rows flow through the pipeline in sheet order:
//!
//! - [`driver`] validates the sheet and walks it with the [`scan`] state machine
//! - [`lookup`] holds the remote entities fetched before the scan
//! - [`resolver`] and [`extension`] turn a root row into an entity payload
//! - [`steps`] assembles the step rows of a test into its script
//! - [`upload`] sends scripts from a worker pool
//! - [`context`] owns the per-run state and counters
//! - [`outline`] runs the scan offline for `stm check`

pub mod context;
pub mod driver;
pub mod extension;
pub mod lookup;
pub mod outline;
pub mod resolver;
pub mod scan;
pub mod steps;
pub mod upload;

pub use context::{MigrationCounters, RunContext};
pub use driver::{migrate_file, Migrator, PrepareError, PreparedSheet};
pub use extension::{ExtensionFieldSpec, RefKind, ScalarKind};
pub use lookup::{InitError, LookupCache};
pub use outline::SheetOutline;
pub use resolver::ResolveError;
pub use steps::{StepKind, StepScript};
