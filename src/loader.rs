use crate::error::{GgrReportError, Result};
use crate::storage::Storage;
use crate::utils::{clean_numeric_text, excel_serial_to_date, parse_amount, parse_date_text};
use crate::workbook::{CellValue, RawSheet};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DATE_COLUMN: &str = "Date";
pub const GGR_COLUMN: &str = "GGR";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily GGR ordered by strictly increasing date, with no missing values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedSeries {
    points: Vec<SeriesPoint>,
}

impl CleanedSeries {
    /// Builds a series from arbitrary points: sorts by date and sums values that share a day.
    pub fn from_points(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|p| p.date);

        let mut merged: Vec<SeriesPoint> = Vec::with_capacity(points.len());
        for point in points {
            match merged.last_mut() {
                Some(last) if last.date == point.date => last.value += point.value,
                _ => merged.push(point),
            }
        }

        Self { points: merged }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

pub(crate) fn cell_to_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(datetime) => Some(datetime.date()),
        CellValue::Text(text) => parse_date_text(text),
        CellValue::Number(serial) => excel_serial_to_date(*serial),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn ggr_value(data_row: usize, cell: &CellValue) -> Result<f64> {
    let parsed = match cell {
        CellValue::Number(value) if value.is_finite() => Some(*value),
        CellValue::Text(text) => parse_amount(&clean_numeric_text(text, false)),
        _ => None,
    };

    parsed.ok_or_else(|| GgrReportError::ValidationError {
        data_row,
        column: GGR_COLUMN.to_string(),
        value: cell.as_text(),
    })
}

/// Turns one raw sheet into a [`CleanedSeries`].
///
/// Columns that are empty in every row are pruned first, then `Date` and `GGR` must
/// both be present. Rows are dropped when the date does not parse, when any remaining
/// column is blank, or when GGR is not numeric after separator stripping.
pub fn clean_sheet(sheet: &RawSheet) -> Result<CleanedSeries> {
    let kept: Vec<usize> = (0..sheet.columns.len())
        .filter(|&idx| (0..sheet.len()).any(|row| !sheet.cell(row, idx).is_empty()))
        .collect();

    let find = |name: &str| {
        kept.iter()
            .copied()
            .find(|&idx| sheet.columns[idx] == name)
            .ok_or_else(|| GgrReportError::SchemaError {
                sheet: sheet.name.clone(),
                column: name.to_string(),
            })
    };
    let date_idx = find(DATE_COLUMN)?;
    let ggr_idx = find(GGR_COLUMN)?;

    let mut dated: Vec<(NaiveDate, usize)> = (0..sheet.len())
        .filter_map(|row_idx| {
            cell_to_date(sheet.cell(row_idx, date_idx)).map(|date| (date, row_idx))
        })
        .collect();
    let unparsed_dates = sheet.rows.len() - dated.len();
    dated.sort_by_key(|(date, _)| *date);

    let mut points = Vec::with_capacity(dated.len());
    let mut incomplete = 0;
    let mut invalid = 0;
    for (date, row_idx) in dated {
        if kept.iter().any(|&idx| sheet.cell(row_idx, idx).is_empty()) {
            incomplete += 1;
            continue;
        }

        match ggr_value(row_idx, sheet.cell(row_idx, ggr_idx)) {
            Ok(value) => points.push(SeriesPoint { date, value }),
            Err(e) => {
                invalid += 1;
                warn!("Sheet '{}': skipping row: {}", sheet.name, e);
            }
        }
    }

    let series = CleanedSeries::from_points(points);
    debug!(
        "Sheet '{}': {} rows in, {} points out ({} bad dates, {} incomplete, {} invalid GGR, {} pruned columns)",
        sheet.name,
        sheet.rows.len(),
        series.len(),
        unparsed_dates,
        incomplete,
        invalid,
        sheet.columns.len() - kept.len()
    );
    Ok(series)
}

/// Reads a sheet of an uploaded workbook as a cleaned daily GGR series.
#[derive(Debug, Clone)]
pub struct DataLoader {
    storage: Arc<Storage>,
}

impl DataLoader {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// `file_name` defaults to the latest upload, `sheet` to the first sheet.
    pub fn load(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<CleanedSeries> {
        let raw = self.load_raw(file_name, sheet)?;
        clean_sheet(&raw)
    }

    pub fn load_raw(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<RawSheet> {
        self.storage.read_sheet(file_name, sheet)
    }
}
