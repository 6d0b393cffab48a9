//! Spreadsheet access: one sheet of a workbook becomes a [`RawSheet`].

use crate::error::{GgrReportError, Result};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single cell as read from the workbook, before any cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Blank cells, whitespace-only text and spreadsheet error cells all count as missing.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(number) => number.to_string(),
            CellValue::Bool(flag) => flag.to_string(),
            CellValue::Date(datetime) => datetime.to_string(),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(text) => CellValue::Text(text.clone()),
            Data::Float(number) => CellValue::Number(*number),
            Data::Int(number) => CellValue::Number(*number as f64),
            Data::Bool(flag) => CellValue::Bool(*flag),
            Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
                Some(datetime) => CellValue::Date(datetime),
                None => CellValue::Text(cell.to_string()),
            },
            Data::DurationIso(text) => CellValue::Text(text.clone()),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Which sheet of a workbook to read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelector {
    #[default]
    First,
    Index(usize),
    Name(String),
}

impl SheetSelector {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) => SheetSelector::Name(name.to_string()),
            None => SheetSelector::First,
        }
    }
}

/// Tabular content of one sheet: header names plus data rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Cell at `(row, col)`. Positions outside a row, including the missing tail of a
    /// row shorter than the header, read as [`CellValue::Empty`].
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn workbook_sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path).map_err(|e| {
        GgrReportError::WorkbookError(format!("cannot open {}: {}", path.display(), e))
    })?;
    Ok(workbook.sheet_names())
}

/// Reads one sheet. `header_row` is the zero-based physical row holding column names;
/// everything above it is treated as banner text and skipped.
pub fn read_workbook_sheet(
    path: &Path,
    selector: &SheetSelector,
    header_row: usize,
) -> Result<RawSheet> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        GgrReportError::WorkbookError(format!("cannot open {}: {}", path.display(), e))
    })?;
    let names = workbook.sheet_names();

    let sheet_name = match selector {
        SheetSelector::First => names.first().cloned(),
        SheetSelector::Index(idx) => names.get(*idx).cloned(),
        SheetSelector::Name(name) => names.iter().find(|n| *n == name).cloned(),
    }
    .ok_or_else(|| {
        GgrReportError::NotFound(format!(
            "sheet {:?} not found in {}",
            selector,
            path.display()
        ))
    })?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| GgrReportError::WorkbookError(format!("sheet '{}': {}", sheet_name, e)))?;

    let sheet = sheet_from_range(&sheet_name, &range, header_row);
    debug!(
        "Read sheet '{}' from {}: {} columns, {} rows",
        sheet_name,
        path.display(),
        sheet.columns.len(),
        sheet.rows.len()
    );
    Ok(sheet)
}

fn sheet_from_range(name: &str, range: &Range<Data>, header_row: usize) -> RawSheet {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let width = range.width() + start_col as usize;

    let mut header_seen = false;
    let mut sheet = RawSheet::new(name, Vec::new());

    for (offset, cells) in range.rows().enumerate() {
        let physical_row = start_row as usize + offset;
        if physical_row < header_row {
            continue;
        }

        // Cells left of the used range are blank; keep physical column positions.
        let mut row = vec![CellValue::Empty; start_col as usize];
        row.extend(cells.iter().map(CellValue::from));
        row.resize(width, CellValue::Empty);

        if !header_seen {
            sheet.columns = row
                .iter()
                .enumerate()
                .map(|(idx, cell)| match cell {
                    CellValue::Empty => format!("Unnamed: {}", idx),
                    other => other.as_text().trim().to_string(),
                })
                .collect();
            header_seen = true;
            continue;
        }

        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        sheet.push_row(row);
    }

    sheet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_emptiness() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text("   ".to_string()).is_empty());
        assert!(!CellValue::Text("0".to_string()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }

    #[test]
    fn test_push_row_aligns_to_header() {
        let mut sheet = RawSheet::new("OpA", vec!["Date".to_string(), "GGR".to_string()]);
        sheet.push_row(vec![CellValue::Text("2024-01-01".to_string())]);
        sheet.push_row(vec![
            CellValue::Text("2024-01-02".to_string()),
            CellValue::Number(10.0),
            CellValue::Number(99.0),
        ]);

        assert_eq!(sheet.rows[0].len(), 2);
        assert_eq!(sheet.rows[0][1], CellValue::Empty);
        assert_eq!(sheet.rows[1].len(), 2);
        assert_eq!(sheet.value(1, "GGR"), Some(&CellValue::Number(10.0)));
    }

    #[test]
    fn test_cell_reads_past_short_rows_as_empty() {
        let mut sheet = RawSheet::new("OpA", vec!["Date".to_string(), "GGR".to_string()]);
        sheet.rows.push(vec![CellValue::Text("2024-01-01".to_string())]);

        assert_eq!(sheet.cell(0, 0), &CellValue::Text("2024-01-01".to_string()));
        assert_eq!(sheet.cell(0, 1), &CellValue::Empty);
        assert_eq!(sheet.cell(5, 0), &CellValue::Empty);
    }

    #[test]
    fn test_sheet_from_range_skips_banner_row() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 1));
        range.set_value((0, 0), Data::String("Operator GGR export".to_string()));
        range.set_value((1, 0), Data::String("Date".to_string()));
        range.set_value((1, 1), Data::String("GGR".to_string()));
        range.set_value((2, 0), Data::String("2024-01-01".to_string()));
        range.set_value((2, 1), Data::Float(100.0));
        range.set_value((3, 0), Data::String("2024-01-02".to_string()));
        range.set_value((3, 1), Data::String("1,250.00".to_string()));

        let sheet = sheet_from_range("OpA", &range, 1);
        assert_eq!(sheet.columns, vec!["Date".to_string(), "GGR".to_string()]);
        assert_eq!(sheet.len(), 2);
        assert_eq!(
            sheet.value(1, "GGR"),
            Some(&CellValue::Text("1,250.00".to_string()))
        );
    }

    #[test]
    fn test_sheet_from_range_names_blank_headers() {
        let mut range: Range<Data> = Range::new((0, 0), (1, 2));
        range.set_value((0, 0), Data::String("Date".to_string()));
        range.set_value((0, 2), Data::String("GGR".to_string()));
        range.set_value((1, 0), Data::String("2024-01-01".to_string()));
        range.set_value((1, 2), Data::Int(5));

        let sheet = sheet_from_range("OpA", &range, 0);
        assert_eq!(sheet.columns[1], "Unnamed: 1");
        assert_eq!(sheet.value(0, "GGR"), Some(&CellValue::Number(5.0)));
    }
}
