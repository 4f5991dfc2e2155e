//! Row scan state machine
//!
//! Groups each test root row with the step rows that follow it. The scan is
//! independent of the workspace: a [`ScanVisitor`] decides what starting a
//! test, appending a step, or finishing a test means.
//!
//! ```text
//! AwaitingRoot --root ok--> Building --root ok--> Building
//!      |                      |   ^                  ...
//!      +--root failed--> FailedRow +--root ok
//! Building --step or unknown row--> Building
//! any state --end of rows--> Done
//! ```

use tracing::trace;

use crate::sheet::{ColumnMap, ImportRow, SheetRow};

/// What a row means to the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    /// Starts a new test
    Root,
    Step,
    /// No `type` at all
    Untyped,
    /// A `type` that is neither a test nor a step
    Unknown,
}

pub fn classify(row: &ImportRow<'_>) -> RowClass {
    if row.is_test_root() {
        RowClass::Root
    } else if row.is_step() {
        RowClass::Step
    } else if row.row_type().is_none() {
        RowClass::Untyped
    } else {
        RowClass::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No test started yet
    AwaitingRoot,
    /// Collecting steps of a created test
    Building,
    /// The current test failed; its steps are skipped
    FailedRow,
    Done,
}

/// Callbacks of the scan
pub trait ScanVisitor {
    /// A root row; return whether the test was started
    fn start_test(&mut self, row: ImportRow<'_>) -> bool;

    /// A step row of the current test
    fn step(&mut self, row: ImportRow<'_>);

    /// The current test has no more steps
    fn finish_test(&mut self);

    /// A step row belonging to a test that failed
    fn skipped_step(&mut self, row: ImportRow<'_>) {
        let _ = row;
    }

    /// A step row before any test root
    fn orphan_step(&mut self, row: ImportRow<'_>);

    /// A row with no type
    fn untyped_row(&mut self, row: ImportRow<'_>);

    /// A row with an unrecognized type
    ///
    /// `inside_test` is set when the row sits within the step span of a
    /// started test; the test keeps collecting steps after it.
    fn unknown_row(&mut self, row: ImportRow<'_>, inside_test: bool);
}

/// Walk the data rows in order
///
/// A row of unknown type inside a test's steps is reported and passed over;
/// only a root row or the end of the rows finishes a test. Outside a test it
/// stands for a failed root, and the steps after it are skipped.
pub fn scan(columns: &ColumnMap, rows: &[SheetRow], visitor: &mut impl ScanVisitor) -> ScanState {
    let mut state = ScanState::AwaitingRoot;

    for sheet_row in rows {
        let row = columns.row(sheet_row);
        let class = classify(&row);
        trace!(row = row.number(), ?class, ?state, "scan");

        state = match (class, state) {
            (RowClass::Root, current) => {
                if current == ScanState::Building {
                    visitor.finish_test();
                }
                if visitor.start_test(row) {
                    ScanState::Building
                } else {
                    ScanState::FailedRow
                }
            }
            (RowClass::Unknown, ScanState::Building) => {
                visitor.unknown_row(row, true);
                ScanState::Building
            }
            (RowClass::Unknown, _) => {
                visitor.unknown_row(row, false);
                ScanState::FailedRow
            }
            (RowClass::Step, ScanState::Building) => {
                visitor.step(row);
                ScanState::Building
            }
            (RowClass::Step, ScanState::FailedRow) => {
                visitor.skipped_step(row);
                ScanState::FailedRow
            }
            (RowClass::Step, current) => {
                visitor.orphan_step(row);
                current
            }
            (RowClass::Untyped, current) => {
                visitor.untyped_row(row);
                current
            }
        };
    }

    if state == ScanState::Building {
        visitor.finish_test();
    }
    ScanState::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{Column, Sheet};

    /// Records callbacks as short strings
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail: Vec<&'static str>,
    }

    impl ScanVisitor for Recorder {
        fn start_test(&mut self, row: ImportRow<'_>) -> bool {
            let id = row.label();
            self.events.push(format!("start {}", id));
            !self.fail.iter().any(|f| *f == id)
        }
        fn step(&mut self, row: ImportRow<'_>) {
            self.events.push(format!("step {}", row.number()));
        }
        fn finish_test(&mut self) {
            self.events.push("finish".to_string());
        }
        fn skipped_step(&mut self, row: ImportRow<'_>) {
            self.events.push(format!("skip {}", row.number()));
        }
        fn orphan_step(&mut self, row: ImportRow<'_>) {
            self.events.push(format!("orphan {}", row.number()));
        }
        fn untyped_row(&mut self, row: ImportRow<'_>) {
            self.events.push(format!("untyped {}", row.number()));
        }
        fn unknown_row(&mut self, row: ImportRow<'_>, inside_test: bool) {
            let place = if inside_test { "in test" } else { "alone" };
            self.events.push(format!("unknown {} {}", row.number(), place));
        }
    }

    fn sheet(rows: &[(&str, &str)]) -> (ColumnMap, Sheet) {
        let header: Vec<String> = Column::all().iter().map(|c| c.header().to_string()).collect();
        let columns = ColumnMap::from_header(&header).unwrap();

        let mut lines = vec![header.clone()];
        for (row_type, unique_id) in rows {
            let mut cells = vec![String::new(); header.len()];
            cells[columns.index(Column::Type)] = row_type.to_string();
            cells[columns.index(Column::UniqueId)] = unique_id.to_string();
            cells[columns.index(Column::Name)] = "n".to_string();
            lines.push(cells);
        }
        (columns, Sheet::from_texts(&lines))
    }

    #[test]
    fn test_groups_steps_under_roots() {
        let (columns, sheet) = sheet(&[
            ("test_manual", "T1"),
            ("step", ""),
            ("step", ""),
            ("test_manual", "T2"),
            ("step", ""),
        ]);
        let mut recorder = Recorder::default();
        let end = scan(&columns, sheet.rows(), &mut recorder);

        assert_eq!(end, ScanState::Done);
        assert_eq!(
            recorder.events,
            vec![
                "start T1", "step 3", "step 4", "finish", "start T2", "step 6", "finish"
            ]
        );
    }

    #[test]
    fn test_failed_root_skips_its_steps() {
        let (columns, sheet) = sheet(&[
            ("test_manual", "T1"),
            ("step", ""),
            ("test_manual", "T2"),
            ("step", ""),
        ]);
        let mut recorder = Recorder {
            fail: vec!["T1"],
            ..Recorder::default()
        };
        scan(&columns, sheet.rows(), &mut recorder);

        assert_eq!(
            recorder.events,
            vec!["start T1", "skip 3", "start T2", "step 5", "finish"]
        );
    }

    #[test]
    fn test_stray_rows() {
        let (columns, sheet) = sheet(&[
            ("step", ""),
            ("test_manual", "T1"),
            ("", ""),
            ("step", ""),
            ("defect", "D1"),
            ("step", ""),
        ]);
        let mut recorder = Recorder::default();
        scan(&columns, sheet.rows(), &mut recorder);

        assert_eq!(
            recorder.events,
            vec![
                "orphan 2",
                "start T1",
                "untyped 4",
                "step 5",
                "unknown 6 in test",
                "step 7",
                "finish"
            ]
        );
    }

    #[test]
    fn test_unknown_row_outside_test_skips_following_steps() {
        let (columns, sheet) = sheet(&[
            ("defect", "D1"),
            ("step", ""),
            ("test_manual", "T1"),
            ("step", ""),
        ]);
        let mut recorder = Recorder::default();
        scan(&columns, sheet.rows(), &mut recorder);

        assert_eq!(
            recorder.events,
            vec!["unknown 2 alone", "skip 3", "start T1", "step 5", "finish"]
        );
    }

    #[test]
    fn test_types_are_case_insensitive() {
        let (columns, sheet) = sheet(&[("Test_Manual", "T1"), ("STEP", "")]);
        let mut recorder = Recorder::default();
        scan(&columns, sheet.rows(), &mut recorder);
        assert_eq!(recorder.events, vec!["start T1", "step 3", "finish"]);
    }
}
