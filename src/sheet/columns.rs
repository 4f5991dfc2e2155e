//! Mandatory columns and typed row access

use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

use super::SheetRow;

/// Type tag of a row that starts a new manual test
pub const TEST_ROOT_TYPE: &str = "test_manual";

/// Type tag of a row that belongs to the preceding test's script
pub const STEP_TYPE: &str = "step";

/// The columns every import sheet must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Type,
    Owner,
    Phase,
    UserTags,
    Designer,
    StepType,
    UniqueId,
    TestType,
    Description,
    ProductAreas,
    CoveredContent,
    StepDescription,
    EstimatedDuration,
}

impl Column {
    /// Header text of the column
    pub fn header(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Type => "type",
            Column::Owner => "owner",
            Column::Phase => "phase",
            Column::UserTags => "user_tags",
            Column::Designer => "designer",
            Column::StepType => "step_type",
            Column::UniqueId => "unique_id",
            Column::TestType => "test_type",
            Column::Description => "description",
            Column::ProductAreas => "product_areas",
            Column::CoveredContent => "covered_content",
            Column::StepDescription => "step_description",
            Column::EstimatedDuration => "estimated_duration",
        }
    }

    /// All mandatory columns
    pub fn all() -> &'static [Column] {
        &[
            Column::Name,
            Column::Type,
            Column::Owner,
            Column::Phase,
            Column::UserTags,
            Column::Designer,
            Column::StepType,
            Column::UniqueId,
            Column::TestType,
            Column::Description,
            Column::ProductAreas,
            Column::CoveredContent,
            Column::StepDescription,
            Column::EstimatedDuration,
        ]
    }

    /// Look up a mandatory column by (normalized) header text
    pub fn from_header(header: &str) -> Option<Column> {
        let normalized = normalize_header(header);
        Self::all()
            .iter()
            .copied()
            .find(|c| c.header() == normalized)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Header names are compared trimmed and lowercased
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Raised when the header row lacks mandatory columns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing mandatory columns: {}", missing.join(", "))]
pub struct MissingColumnsError {
    pub missing: Vec<String>,
}

/// Raised when two data rows share a unique id
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unique_id '{unique_id}' on row {row} duplicates row {first_row}")]
pub struct DuplicateUniqueIdError {
    pub unique_id: String,
    pub row: usize,
    pub first_row: usize,
}

/// Mandatory column name to column index, built once from the header row
#[derive(Debug, Clone)]
pub struct ColumnMap {
    indexes: HashMap<Column, usize>,
}

impl ColumnMap {
    /// Scan the header and fail with every absent mandatory column
    pub fn from_header(header: &[String]) -> Result<Self, MissingColumnsError> {
        let mut indexes = HashMap::new();

        for (idx, name) in header.iter().enumerate() {
            if let Some(column) = Column::from_header(name) {
                // First occurrence wins for duplicated headers
                indexes.entry(column).or_insert(idx);
            }
        }

        let missing: Vec<String> = Column::all()
            .iter()
            .filter(|c| !indexes.contains_key(c))
            .map(|c| c.header().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(MissingColumnsError { missing });
        }

        Ok(Self { indexes })
    }

    pub fn index(&self, column: Column) -> usize {
        self.indexes[&column]
    }

    /// Wrap a row for typed access
    pub fn row<'a>(&'a self, row: &'a SheetRow) -> ImportRow<'a> {
        ImportRow { row, columns: self }
    }

    /// Fail on the first unique id that repeats across data rows
    pub fn validate_unique_ids(&self, rows: &[SheetRow]) -> Result<(), DuplicateUniqueIdError> {
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for row in rows {
            let Some(id) = self.row(row).unique_id() else {
                continue;
            };
            if let Some(&first_row) = seen.get(id) {
                return Err(DuplicateUniqueIdError {
                    unique_id: id.to_string(),
                    row: row.number(),
                    first_row,
                });
            }
            seen.insert(id, row.number());
        }

        Ok(())
    }
}

/// Typed view over one data row
#[derive(Debug, Clone, Copy)]
pub struct ImportRow<'a> {
    row: &'a SheetRow,
    columns: &'a ColumnMap,
}

impl<'a> ImportRow<'a> {
    pub fn sheet_row(&self) -> &'a SheetRow {
        self.row
    }

    /// Row number in the sheet, for diagnostics
    pub fn number(&self) -> usize {
        self.row.number()
    }

    /// Trimmed cell text, `None` when blank
    pub fn get(&self, column: Column) -> Option<&'a str> {
        self.row
            .cell(self.columns.index(column))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn unique_id(&self) -> Option<&'a str> {
        self.get(Column::UniqueId)
    }

    /// Unique id for log messages
    pub fn label(&self) -> String {
        match self.unique_id() {
            Some(id) => id.to_string(),
            None => format!("<row {}>", self.number()),
        }
    }

    pub fn row_type(&self) -> Option<&'a str> {
        self.get(Column::Type)
    }

    pub fn name(&self) -> Option<&'a str> {
        self.get(Column::Name)
    }

    pub fn description(&self) -> Option<&'a str> {
        self.get(Column::Description)
    }

    pub fn owner(&self) -> Option<&'a str> {
        self.get(Column::Owner)
    }

    pub fn designer(&self) -> Option<&'a str> {
        self.get(Column::Designer)
    }

    pub fn phase(&self) -> Option<&'a str> {
        self.get(Column::Phase)
    }

    pub fn user_tags(&self) -> Option<&'a str> {
        self.get(Column::UserTags)
    }

    pub fn test_type(&self) -> Option<&'a str> {
        self.get(Column::TestType)
    }

    pub fn product_areas(&self) -> Option<&'a str> {
        self.get(Column::ProductAreas)
    }

    pub fn covered_content(&self) -> Option<&'a str> {
        self.get(Column::CoveredContent)
    }

    pub fn step_type(&self) -> Option<&'a str> {
        self.get(Column::StepType)
    }

    /// Step text; kept untrimmed apart from blank detection
    pub fn step_description(&self) -> Option<&'a str> {
        self.row
            .cell(self.columns.index(Column::StepDescription))
            .filter(|s| !s.trim().is_empty())
    }

    /// Estimated duration in whole minutes; decimals are truncated
    pub fn estimated_duration(&self) -> Option<i64> {
        let raw = self.get(Column::EstimatedDuration)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value.trunc() as i64),
            _ => {
                warn!(
                    unique_id = %self.label(),
                    value = raw,
                    "estimated_duration is not a number, the field will be left blank"
                );
                None
            }
        }
    }

    /// True iff the row's type is the manual-test tag
    pub fn is_test_root(&self) -> bool {
        self.row_type()
            .is_some_and(|t| t.eq_ignore_ascii_case(TEST_ROOT_TYPE))
    }

    pub fn is_step(&self) -> bool {
        self.row_type()
            .is_some_and(|t| t.eq_ignore_ascii_case(STEP_TYPE))
    }
}

/// Header columns that are neither mandatory nor in `known`
pub fn unrecognized_columns(header: &[String], known: &HashSet<String>) -> Vec<(usize, String)> {
    header
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .filter(|(_, name)| {
            Column::from_header(name).is_none() && !known.contains(&normalize_header(name))
        })
        .map(|(idx, name)| (idx, name.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_header() -> Vec<String> {
        Column::all().iter().map(|c| c.header().to_string()).collect()
    }

    fn row_with(columns: &ColumnMap, number: usize, values: &[(Column, &str)]) -> SheetRow {
        let mut cells = vec![String::new(); Column::all().len()];
        for (column, value) in values {
            cells[columns.index(*column)] = value.to_string();
        }
        SheetRow::from_texts(number, &cells)
    }

    #[test]
    fn test_from_header_all_present() {
        let map = ColumnMap::from_header(&full_header()).unwrap();
        assert_eq!(map.index(Column::Name), 0);
        assert_eq!(map.index(Column::EstimatedDuration), 13);
    }

    #[test]
    fn test_from_header_reports_every_missing_column() {
        let header: Vec<String> = full_header()
            .into_iter()
            .filter(|h| h != "owner" && h != "phase")
            .collect();

        let err = ColumnMap::from_header(&header).unwrap_err();
        assert_eq!(err.missing, vec!["owner".to_string(), "phase".to_string()]);
    }

    #[test]
    fn test_from_header_is_case_insensitive_and_order_free() {
        let mut header = full_header();
        header.reverse();
        header[0] = " ESTIMATED_DURATION ".to_string();
        header.push("extra".to_string());

        let map = ColumnMap::from_header(&header).unwrap();
        assert_eq!(map.index(Column::EstimatedDuration), 0);
        assert_eq!(map.index(Column::Name), 13);
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let mut header = full_header();
        header.push("name".to_string());

        let map = ColumnMap::from_header(&header).unwrap();
        assert_eq!(map.index(Column::Name), 0);
    }

    #[test]
    fn test_get_blank_is_none() {
        let map = ColumnMap::from_header(&full_header()).unwrap();
        let row = row_with(&map, 2, &[(Column::Name, "Login"), (Column::Owner, "  ")]);
        let row = map.row(&row);

        assert_eq!(row.name(), Some("Login"));
        assert_eq!(row.owner(), None);
        assert_eq!(row.phase(), None);
    }

    #[test]
    fn test_is_test_root() {
        let map = ColumnMap::from_header(&full_header()).unwrap();
        let root = row_with(&map, 2, &[(Column::Type, "test_manual")]);
        let step = row_with(&map, 3, &[(Column::Type, "step")]);
        let blank = row_with(&map, 4, &[(Column::Name, "x")]);

        assert!(map.row(&root).is_test_root());
        assert!(!map.row(&step).is_test_root());
        assert!(map.row(&step).is_step());
        assert!(!map.row(&blank).is_test_root());
    }

    #[test]
    fn test_estimated_duration_truncates() {
        let map = ColumnMap::from_header(&full_header()).unwrap();
        let row = row_with(&map, 2, &[(Column::EstimatedDuration, "12.9")]);
        assert_eq!(map.row(&row).estimated_duration(), Some(12));

        let row = row_with(&map, 2, &[(Column::EstimatedDuration, "soon")]);
        assert_eq!(map.row(&row).estimated_duration(), None);
    }

    #[test]
    fn test_validate_unique_ids() {
        let map = ColumnMap::from_header(&full_header()).unwrap();
        let rows = vec![
            row_with(&map, 2, &[(Column::UniqueId, "1")]),
            row_with(&map, 3, &[(Column::UniqueId, "2")]),
            row_with(&map, 4, &[]),
            row_with(&map, 5, &[]),
        ];
        assert!(map.validate_unique_ids(&rows).is_ok());

        let rows = vec![
            row_with(&map, 2, &[(Column::UniqueId, "1")]),
            row_with(&map, 3, &[(Column::UniqueId, "2")]),
            row_with(&map, 4, &[(Column::UniqueId, "1")]),
        ];
        let err = map.validate_unique_ids(&rows).unwrap_err();
        assert_eq!(err.unique_id, "1");
        assert_eq!(err.row, 4);
        assert_eq!(err.first_row, 2);
    }

    #[test]
    fn test_unrecognized_columns() {
        let mut header = full_header();
        header.push("str_udf".to_string());
        header.push("Notes".to_string());
        header.push("".to_string());

        let known: HashSet<String> = ["str_udf".to_string()].into_iter().collect();
        let unused = unrecognized_columns(&header, &known);
        assert_eq!(unused, vec![(15, "Notes".to_string())]);
    }
}
