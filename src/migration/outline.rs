//! Offline outline of a sheet
//!
//! Runs the same scan as a migration without touching a workspace, to show
//! which tests and steps a migration would produce and which rows it would
//! count as failures.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::sheet::ImportRow;

use super::driver::PreparedSheet;
use super::scan::{scan, ScanVisitor};
use super::steps::StepKind;

/// One test root and its steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutline {
    pub row: usize,
    pub unique_id: Option<String>,
    pub name: Option<String>,
    pub steps: usize,
    pub calls: usize,
}

/// A row a migration would count as failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineIssue {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetOutline {
    pub tests: Vec<TestOutline>,
    pub issues: Vec<OutlineIssue>,
}

impl SheetOutline {
    /// Scan a prepared sheet
    pub fn of(sheet: &PreparedSheet) -> Self {
        let mut roots = HashMap::new();
        for sheet_row in sheet.sheet().rows() {
            let row = sheet.columns().row(sheet_row);
            if row.is_test_root() {
                if let Some(id) = row.unique_id() {
                    roots.insert(id.to_string(), row.number());
                }
            }
        }

        let mut visitor = OutlineVisitor {
            roots,
            seen: HashSet::new(),
            outline: SheetOutline::default(),
        };
        scan(sheet.columns(), sheet.sheet().rows(), &mut visitor);
        visitor.outline
    }

    pub fn step_count(&self) -> usize {
        self.tests.iter().map(|t| t.steps).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

struct OutlineVisitor {
    /// Unique id of every test root to its row
    roots: HashMap<String, usize>,
    /// Unique ids of roots scanned so far
    seen: HashSet<String>,
    outline: SheetOutline,
}

impl OutlineVisitor {
    fn issue(&mut self, row: &ImportRow<'_>, message: impl Into<String>) {
        self.outline.issues.push(OutlineIssue {
            row: row.number(),
            message: message.into(),
        });
    }
}

impl ScanVisitor for OutlineVisitor {
    fn start_test(&mut self, row: ImportRow<'_>) -> bool {
        if let Some(id) = row.unique_id() {
            self.seen.insert(id.to_string());
        }
        if row.name().is_none() {
            self.issue(&row, "test has no name");
            return false;
        }
        self.outline.tests.push(TestOutline {
            row: row.number(),
            unique_id: row.unique_id().map(String::from),
            name: row.name().map(String::from),
            steps: 0,
            calls: 0,
        });
        true
    }

    fn step(&mut self, row: ImportRow<'_>) {
        let kind = match row.step_type().and_then(StepKind::parse) {
            Some(kind) => kind,
            None => {
                let message = match row.step_type() {
                    Some(t) => format!("unknown step type '{}'", t),
                    None => "step has no step_type".to_string(),
                };
                self.issue(&row, message);
                return;
            }
        };

        let Some(text) = row.step_description().map(str::trim) else {
            self.issue(&row, format!("{} step has no step_description", kind));
            return;
        };

        if kind == StepKind::Call {
            if !self.seen.contains(text) {
                let message = match self.roots.get(text) {
                    Some(target_row) => format!(
                        "called test '{}' appears later, on row {}",
                        text, target_row
                    ),
                    None => format!("called test '{}' does not exist", text),
                };
                self.issue(&row, message);
                return;
            }
        }

        if let Some(test) = self.outline.tests.last_mut() {
            test.steps += 1;
            if kind == StepKind::Call {
                test.calls += 1;
            }
        }
    }

    fn finish_test(&mut self) {}

    fn skipped_step(&mut self, row: ImportRow<'_>) {
        self.issue(&row, "step of a test that would not be migrated");
    }

    fn orphan_step(&mut self, row: ImportRow<'_>) {
        self.issue(&row, "step appears before any test");
    }

    fn untyped_row(&mut self, row: ImportRow<'_>) {
        self.issue(&row, "row has no type");
    }

    fn unknown_row(&mut self, row: ImportRow<'_>, _inside_test: bool) {
        let message = format!(
            "type '{}' is neither a test nor a step",
            row.row_type().unwrap_or_default()
        );
        self.issue(&row, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{Column, ColumnMap, Sheet};

    fn build(rows: &[(&str, &str, &str, &str, &str)]) -> PreparedSheet {
        let header: Vec<String> = Column::all().iter().map(|c| c.header().to_string()).collect();
        let columns = ColumnMap::from_header(&header).unwrap();
        let mut lines = vec![header.clone()];
        for (row_type, unique_id, name, step_type, step_description) in rows {
            let mut cells = vec![String::new(); header.len()];
            cells[columns.index(Column::Type)] = row_type.to_string();
            cells[columns.index(Column::UniqueId)] = unique_id.to_string();
            cells[columns.index(Column::Name)] = name.to_string();
            cells[columns.index(Column::StepType)] = step_type.to_string();
            cells[columns.index(Column::StepDescription)] = step_description.to_string();
            lines.push(cells);
        }
        PreparedSheet::prepare(Sheet::from_texts(&lines)).unwrap()
    }

    #[test]
    fn test_outline_counts() {
        let sheet = build(&[
            ("test_manual", "T1", "Login", "", ""),
            ("step", "", "", "simple", "open page"),
            ("step", "", "", "validation", "page open"),
            ("test_manual", "T2", "Logout", "", ""),
            ("step", "", "", "call", "T1"),
        ]);
        let outline = SheetOutline::of(&sheet);

        assert!(outline.is_clean());
        assert_eq!(outline.tests.len(), 2);
        assert_eq!(outline.tests[0].steps, 2);
        assert_eq!(outline.tests[1].calls, 1);
        assert_eq!(outline.step_count(), 3);
    }

    #[test]
    fn test_outline_reports_forward_and_missing_calls() {
        let sheet = build(&[
            ("test_manual", "T1", "Login", "", ""),
            ("step", "", "", "call", "T2"),
            ("step", "", "", "call", "T9"),
            ("step", "", "", "teleport", "x"),
            ("test_manual", "T2", "Logout", "", ""),
        ]);
        let outline = SheetOutline::of(&sheet);

        let messages: Vec<&str> = outline.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "called test 'T2' appears later, on row 6",
                "called test 'T9' does not exist",
                "unknown step type 'teleport'",
            ]
        );
        assert_eq!(outline.tests[0].steps, 0);
    }

    #[test]
    fn test_outline_unknown_row_inside_test() {
        let sheet = build(&[
            ("test_manual", "T1", "Login", "", ""),
            ("step", "", "", "simple", "a"),
            ("defect", "D1", "", "", ""),
            ("step", "", "", "simple", "b"),
        ]);
        let outline = SheetOutline::of(&sheet);

        assert_eq!(outline.tests.len(), 1);
        assert_eq!(outline.tests[0].steps, 2);
        assert_eq!(outline.issues.len(), 1);
        assert_eq!(outline.issues[0].row, 4);
        assert_eq!(outline.issues[0].message, "type 'defect' is neither a test nor a step");
    }

    #[test]
    fn test_outline_nameless_test_skips_steps() {
        let sheet = build(&[
            ("test_manual", "T1", "", "", ""),
            ("step", "", "", "simple", "a"),
        ]);
        let outline = SheetOutline::of(&sheet);

        assert!(outline.tests.is_empty());
        assert_eq!(outline.issues.len(), 2);
        assert_eq!(outline.issues[1].row, 3);
    }
}
