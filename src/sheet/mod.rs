//! Spreadsheet adapter
//!
//! Reads the first worksheet of a workbook (or a CSV file) into plain text
//! rows. The first non-blank row is the header; everything after it is data.
//! Cell values are always read as strings regardless of the underlying type.

pub mod columns;

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use columns::{
    Column, ColumnMap, DuplicateUniqueIdError, ImportRow, MissingColumnsError, STEP_TYPE,
    TEST_ROOT_TYPE,
};

/// Date cells are rendered in the same shape the extension-field date parser expects
const DATE_CELL_FORMAT: &str = "%d-%m-%Y %H:%M:%S UTC";

/// One spreadsheet row, immutable once read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number in the source sheet (header is row 1)
    number: usize,
    cells: Vec<Option<String>>,
}

impl SheetRow {
    pub fn new(number: usize, cells: Vec<Option<String>>) -> Self {
        Self { number, cells }
    }

    /// Build a row from raw strings, treating blank strings as empty cells
    pub fn from_texts<S: AsRef<str>>(number: usize, texts: &[S]) -> Self {
        let cells = texts.iter().map(|t| non_blank(t.as_ref())).collect();
        Self { number, cells }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    /// Cell text at a column index, `None` for blank or missing cells
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// A loaded worksheet: header plus data rows
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    header: Option<Vec<String>>,
    rows: Vec<SheetRow>,
}

impl Sheet {
    /// Open a spreadsheet file, dispatching on its extension
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        if !path.exists() {
            return Err(SheetError::NotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let rows = match extension.as_str() {
            "csv" => read_csv(path)?,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
            other => {
                return Err(SheetError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension: other.to_string(),
                })
            }
        };

        Ok(Self::from_rows(rows))
    }

    /// Assemble a sheet from already-read rows; the first non-blank row is the header
    pub fn from_rows(rows: Vec<SheetRow>) -> Self {
        let mut rows = rows.into_iter().filter(|r| !r.is_empty());

        let header = rows.next().map(|r| {
            (0..r.len())
                .map(|i| r.cell(i).unwrap_or_default().to_string())
                .collect()
        });

        Self {
            header,
            rows: rows.collect(),
        }
    }

    /// Convenience constructor used by tests and the template command
    pub fn from_texts<S: AsRef<str>>(lines: &[Vec<S>]) -> Self {
        let rows = lines
            .iter()
            .enumerate()
            .map(|(i, cells)| SheetRow::from_texts(i + 1, cells))
            .collect();
        Self::from_rows(rows)
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }
}

/// Errors raised while reading a spreadsheet
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("unsupported spreadsheet format '.{extension}' for {path:?} (expected xlsx, xls, ods or csv)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("cannot open workbook {path:?}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("workbook {0:?} has no worksheets")]
    NoWorksheet(PathBuf),

    #[error("CSV error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

fn read_workbook(path: &Path) -> Result<Vec<SheetRow>, SheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::NoWorksheet(path.to_path_buf()))?
        .map_err(|e| SheetError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    // The used range may not start at A1
    let (first_row, first_col) = range.start().unwrap_or((0, 0));

    let rows = range
        .rows()
        .enumerate()
        .map(|(i, cells)| {
            let mut texts: Vec<Option<String>> = vec![None; first_col as usize];
            texts.extend(cells.iter().map(cell_text));
            SheetRow::new(first_row as usize + i + 1, texts)
        })
        .collect();

    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<SheetRow>, SheetError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| SheetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| SheetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let texts: Vec<&str> = record.iter().collect();
        rows.push(SheetRow::from_texts(idx + 1, &texts));
    }

    Ok(rows)
}

/// Render a workbook cell as text
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => non_blank(s),
        Data::Float(n) => {
            // Integral numbers lose the decimal part so ids like 12 read as "12"
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        Data::Int(n) => Some(n.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format(DATE_CELL_FORMAT).to_string()),
        Data::Error(e) => Some(format!("#{:?}", e)),
    }
}

fn non_blank(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_from_texts_splits_header_and_rows() {
        let sheet = Sheet::from_texts(&[
            vec!["name", "type"],
            vec!["Login", "test_manual"],
            vec!["", ""],
            vec!["open page", "step"],
        ]);

        assert_eq!(sheet.header().unwrap(), ["name", "type"]);
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.rows()[1].number(), 4);
        assert_eq!(sheet.rows()[1].cell(0), Some("open page"));
    }

    #[test]
    fn test_empty_sheet_has_no_header() {
        let sheet = Sheet::from_texts::<&str>(&[]);
        assert!(sheet.header().is_none());
        assert!(sheet.rows().is_empty());
    }

    #[test]
    fn test_blank_cells_are_none() {
        let row = SheetRow::from_texts(2, &["a", "  ", ""]);
        assert_eq!(row.cell(0), Some("a"));
        assert_eq!(row.cell(1), None);
        assert_eq!(row.cell(2), None);
        assert_eq!(row.cell(9), None);
    }

    #[test]
    fn test_open_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tests.csv");
        fs::write(&path, "name,type\nLogin,test_manual\n\"Step, with comma\",step\n").unwrap();

        let sheet = Sheet::open(&path).unwrap();
        assert_eq!(sheet.header().unwrap(), ["name", "type"]);
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.rows()[1].cell(0), Some("Step, with comma"));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Sheet::open(Path::new("/nonexistent/tests.xlsx")).unwrap_err();
        assert!(matches!(err, SheetError::NotFound(_)));
    }

    #[test]
    fn test_open_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tests.txt");
        fs::write(&path, "name").unwrap();

        let err = Sheet::open(&path).unwrap_err();
        assert!(matches!(err, SheetError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_cell_text_numbers() {
        assert_eq!(cell_text(&Data::Float(12.0)), Some("12".to_string()));
        assert_eq!(cell_text(&Data::Float(1.5)), Some("1.5".to_string()));
        assert_eq!(cell_text(&Data::Int(7)), Some("7".to_string()));
        assert_eq!(cell_text(&Data::Bool(true)), Some("true".to_string()));
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String("  ".into())), None);
    }
}
