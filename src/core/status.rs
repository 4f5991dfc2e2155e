//! Migration outcome

use serde::Serialize;
use std::fmt;

/// Final status of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Every test and every step made it
    Success,
    /// No header, or no data rows
    EmptyFile,
    /// Mandatory columns missing or unique ids repeated
    IncorrectFile,
    /// Some tests failed, all uploaded steps succeeded
    NotAllTestsWereMigrated,
    /// All tests created, some steps failed
    NotAllStepsWereUploaded,
    NotAllTestsAndStepsWereMigrated,
    /// Every test root row failed
    NoTestsWereMigrated,
    InitSheetFailed,
    InitRemoteFailed,
    /// Users, application modules or test types could not be loaded
    InitEntitiesFailed,
    InitPhasesFailed,
    InitUserTagsFailed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Success => "success",
            MigrationStatus::EmptyFile => "empty_file",
            MigrationStatus::IncorrectFile => "incorrect_file",
            MigrationStatus::NotAllTestsWereMigrated => "not_all_tests_were_migrated",
            MigrationStatus::NotAllStepsWereUploaded => "not_all_steps_were_uploaded",
            MigrationStatus::NotAllTestsAndStepsWereMigrated => {
                "not_all_tests_and_steps_were_migrated"
            }
            MigrationStatus::NoTestsWereMigrated => "no_tests_were_migrated",
            MigrationStatus::InitSheetFailed => "init_sheet_failed",
            MigrationStatus::InitRemoteFailed => "init_remote_failed",
            MigrationStatus::InitEntitiesFailed => "init_entities_failed",
            MigrationStatus::InitPhasesFailed => "init_phases_failed",
            MigrationStatus::InitUserTagsFailed => "init_user_tags_failed",
        }
    }

    /// Process exit code; 1 is left for errors outside the migration itself
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationStatus::Success => 0,
            MigrationStatus::EmptyFile => 2,
            MigrationStatus::IncorrectFile => 3,
            MigrationStatus::NotAllTestsWereMigrated => 4,
            MigrationStatus::NotAllStepsWereUploaded => 5,
            MigrationStatus::NotAllTestsAndStepsWereMigrated => 6,
            MigrationStatus::NoTestsWereMigrated => 7,
            MigrationStatus::InitSheetFailed => 10,
            MigrationStatus::InitRemoteFailed => 11,
            MigrationStatus::InitEntitiesFailed => 12,
            MigrationStatus::InitPhasesFailed => 13,
            MigrationStatus::InitUserTagsFailed => 14,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MigrationStatus::Success => "all tests and steps were migrated",
            MigrationStatus::EmptyFile => "the file contains no tests",
            MigrationStatus::IncorrectFile => "the file is not a valid test sheet",
            MigrationStatus::NotAllTestsWereMigrated => "some tests could not be migrated",
            MigrationStatus::NotAllStepsWereUploaded => "some steps could not be uploaded",
            MigrationStatus::NotAllTestsAndStepsWereMigrated => {
                "some tests and some steps could not be migrated"
            }
            MigrationStatus::NoTestsWereMigrated => "no test could be migrated",
            MigrationStatus::InitSheetFailed => "the file could not be read",
            MigrationStatus::InitRemoteFailed => "could not connect to the workspace",
            MigrationStatus::InitEntitiesFailed => {
                "could not load users, application modules or test types"
            }
            MigrationStatus::InitPhasesFailed => "could not load phases",
            MigrationStatus::InitUserTagsFailed => "could not load user tags",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MigrationStatus::Success)
    }

    /// Whether the run stopped before any row was processed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::EmptyFile
                | MigrationStatus::IncorrectFile
                | MigrationStatus::InitSheetFailed
                | MigrationStatus::InitRemoteFailed
                | MigrationStatus::InitEntitiesFailed
                | MigrationStatus::InitPhasesFailed
                | MigrationStatus::InitUserTagsFailed
        )
    }

    pub fn all() -> &'static [MigrationStatus] {
        &[
            MigrationStatus::Success,
            MigrationStatus::EmptyFile,
            MigrationStatus::IncorrectFile,
            MigrationStatus::NotAllTestsWereMigrated,
            MigrationStatus::NotAllStepsWereUploaded,
            MigrationStatus::NotAllTestsAndStepsWereMigrated,
            MigrationStatus::NoTestsWereMigrated,
            MigrationStatus::InitSheetFailed,
            MigrationStatus::InitRemoteFailed,
            MigrationStatus::InitEntitiesFailed,
            MigrationStatus::InitPhasesFailed,
            MigrationStatus::InitUserTagsFailed,
        ]
    }

    /// Derive the status of a completed scan from its counters
    pub fn from_counts(migrated_tests: usize, failed_tests: usize, failed_steps: usize) -> Self {
        match (failed_tests > 0, failed_steps > 0) {
            (true, true) => MigrationStatus::NotAllTestsAndStepsWereMigrated,
            (false, true) => MigrationStatus::NotAllStepsWereUploaded,
            (true, false) if migrated_tests == 0 => MigrationStatus::NoTestsWereMigrated,
            (true, false) => MigrationStatus::NotAllTestsWereMigrated,
            (false, false) => MigrationStatus::Success,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status plus the aggregate counters of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    pub migrated_tests: usize,
    pub failed_tests: usize,
    pub uploaded_steps: usize,
    pub failed_steps: usize,
}

impl MigrationReport {
    /// Report for a run that stopped before processing rows
    pub fn aborted(status: MigrationStatus) -> Self {
        Self {
            status,
            migrated_tests: 0,
            failed_tests: 0,
            uploaded_steps: 0,
            failed_steps: 0,
        }
    }

    pub fn from_counts(
        migrated_tests: usize,
        failed_tests: usize,
        uploaded_steps: usize,
        failed_steps: usize,
    ) -> Self {
        Self {
            status: MigrationStatus::from_counts(migrated_tests, failed_tests, failed_steps),
            migrated_tests,
            failed_tests,
            uploaded_steps,
            failed_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_distinct() {
        let codes: HashSet<i32> = MigrationStatus::all().iter().map(|s| s.exit_code()).collect();
        assert_eq!(codes.len(), MigrationStatus::all().len());
        assert!(!codes.contains(&1));
        assert_eq!(MigrationStatus::Success.exit_code(), 0);
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(MigrationStatus::from_counts(3, 0, 0), MigrationStatus::Success);
        assert_eq!(
            MigrationStatus::from_counts(2, 1, 0),
            MigrationStatus::NotAllTestsWereMigrated
        );
        assert_eq!(
            MigrationStatus::from_counts(3, 0, 2),
            MigrationStatus::NotAllStepsWereUploaded
        );
        assert_eq!(
            MigrationStatus::from_counts(2, 1, 1),
            MigrationStatus::NotAllTestsAndStepsWereMigrated
        );
        assert_eq!(
            MigrationStatus::from_counts(0, 4, 0),
            MigrationStatus::NoTestsWereMigrated
        );
    }

    #[test]
    fn test_names_are_snake_case() {
        for status in MigrationStatus::all() {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_fatal_statuses() {
        assert!(MigrationStatus::IncorrectFile.is_fatal());
        assert!(MigrationStatus::InitPhasesFailed.is_fatal());
        assert!(!MigrationStatus::NotAllStepsWereUploaded.is_fatal());
        assert!(!MigrationStatus::Success.is_fatal());
    }
}
