use crate::loader::{cell_to_date, DATE_COLUMN, GGR_COLUMN};
use crate::utils::{clean_numeric_text, parse_amount};
use crate::workbook::{CellValue, RawSheet};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const BETS_CLOSED_COLUMN: &str = "Bets Closed";
pub const WAGERED_COLUMN: &str = "Closed Bets Wagered Amount";
pub const WINNINGS_COLUMN: &str = "Total Winnings";

/// Window used for the week-over-week comparison.
const WEEK: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyExtreme {
    /// `None` when the row's date cell could not be read as a date.
    pub date: Option<NaiveDate>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorMetrics {
    pub total_bets_closed: f64,
    pub total_wagered: f64,
    pub total_winnings: f64,
    pub total_ggr: f64,
    pub average_daily_ggr: f64,
    pub highest_day: Option<DailyExtreme>,
    pub lowest_day: Option<DailyExtreme>,
    pub weekly_change_pct: Option<f64>,
}

/// Cleans a summary column: separators and spaces stripped, anything unparseable becomes 0.
/// A column that is absent altogether contributes zeros.
fn numeric_column(sheet: &RawSheet, column: &str) -> Vec<f64> {
    let Some(idx) = sheet.column_index(column) else {
        warn!(
            "Sheet '{}' has no '{}' column, counting it as zero",
            sheet.name, column
        );
        return vec![0.0; sheet.len()];
    };

    let mut coerced = 0;
    let values = (0..sheet.len())
        .map(|row| {
            let cell = sheet.cell(row, idx);
            let value = match cell {
                CellValue::Number(value) if value.is_finite() => Some(*value),
                CellValue::Text(text) => parse_amount(&clean_numeric_text(text, true)),
                _ => None,
            };
            if value.is_none() && !cell.is_empty() {
                coerced += 1;
            }
            value.unwrap_or(0.0)
        })
        .collect();

    if coerced > 0 {
        debug!(
            "Sheet '{}': {} non-numeric '{}' cells counted as 0",
            sheet.name, coerced, column
        );
    }
    values
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentage change between the mean of the last seven values and the seven before.
/// `None` with fewer than 14 values or when the earlier week averages to zero.
pub fn weekly_change(values: &[f64]) -> Option<f64> {
    if values.len() < 2 * WEEK {
        return None;
    }

    let n = values.len();
    let last = mean(&values[n - WEEK..]);
    let prior = mean(&values[n - 2 * WEEK..n - WEEK]);
    if prior == 0.0 {
        return None;
    }

    Some((last - prior) / prior * 100.0).filter(|change| change.is_finite())
}

fn extreme_day(sheet: &RawSheet, ggr: &[f64], pick_max: bool) -> Option<DailyExtreme> {
    let mut best: Option<usize> = None;
    for (idx, value) in ggr.iter().enumerate() {
        best = match best {
            Some(current) if (pick_max && *value <= ggr[current]) => Some(current),
            Some(current) if (!pick_max && *value >= ggr[current]) => Some(current),
            _ => Some(idx),
        };
    }

    best.map(|idx| DailyExtreme {
        date: sheet.value(idx, DATE_COLUMN).and_then(cell_to_date),
        value: ggr[idx],
    })
}

/// Summary statistics for one operator sheet, computed over every row in sheet order.
pub fn summarize(sheet: &RawSheet) -> OperatorMetrics {
    let bets = numeric_column(sheet, BETS_CLOSED_COLUMN);
    let wagered = numeric_column(sheet, WAGERED_COLUMN);
    let winnings = numeric_column(sheet, WINNINGS_COLUMN);
    let ggr = numeric_column(sheet, GGR_COLUMN);

    OperatorMetrics {
        total_bets_closed: bets.iter().sum(),
        total_wagered: wagered.iter().sum(),
        total_winnings: winnings.iter().sum(),
        total_ggr: ggr.iter().sum(),
        average_daily_ggr: mean(&ggr),
        highest_day: extreme_day(sheet, &ggr, true),
        lowest_day: extreme_day(sheet, &ggr, false),
        weekly_change_pct: weekly_change(&ggr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator_sheet(rows: &[(&str, &str)]) -> RawSheet {
        let mut sheet = RawSheet::new(
            "OpA",
            vec![
                "Date".to_string(),
                BETS_CLOSED_COLUMN.to_string(),
                WAGERED_COLUMN.to_string(),
                WINNINGS_COLUMN.to_string(),
                "GGR".to_string(),
            ],
        );
        for (date, ggr) in rows {
            sheet.push_row(vec![
                CellValue::Text(date.to_string()),
                CellValue::Text("1 000".to_string()),
                CellValue::Text("5,000.50".to_string()),
                CellValue::Number(4000.0),
                CellValue::Text(ggr.to_string()),
            ]);
        }
        sheet
    }

    #[test]
    fn test_empty_sheet_yields_zero_totals() {
        let metrics = summarize(&operator_sheet(&[]));

        assert_eq!(metrics.total_bets_closed, 0.0);
        assert_eq!(metrics.total_wagered, 0.0);
        assert_eq!(metrics.total_winnings, 0.0);
        assert_eq!(metrics.total_ggr, 0.0);
        assert_eq!(metrics.average_daily_ggr, 0.0);
        assert_eq!(metrics.highest_day, None);
        assert_eq!(metrics.lowest_day, None);
        assert_eq!(metrics.weekly_change_pct, None);
    }

    #[test]
    fn test_totals_and_extremes() {
        let sheet = operator_sheet(&[
            ("2024-01-01", "1,000.00"),
            ("2024-01-02", "3,500.25"),
            ("2024-01-03", "-200"),
            ("2024-01-04", "oops"),
        ]);
        let metrics = summarize(&sheet);

        assert_eq!(metrics.total_bets_closed, 4000.0);
        assert!((metrics.total_wagered - 20002.0).abs() < 1e-9);
        assert_eq!(metrics.total_winnings, 16000.0);
        assert!((metrics.total_ggr - 4300.25).abs() < 1e-9);
        assert!((metrics.average_daily_ggr - 4300.25 / 4.0).abs() < 1e-9);

        let highest = metrics.highest_day.unwrap();
        assert_eq!(highest.date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(highest.value, 3500.25);

        let lowest = metrics.lowest_day.unwrap();
        assert_eq!(lowest.date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(lowest.value, -200.0);
    }

    #[test]
    fn test_missing_summary_column_counts_as_zero() {
        let mut sheet = RawSheet::new("OpB", vec!["Date".to_string(), "GGR".to_string()]);
        sheet.push_row(vec![
            CellValue::Text("2024-01-01".to_string()),
            CellValue::Number(10.0),
        ]);

        let metrics = summarize(&sheet);
        assert_eq!(metrics.total_bets_closed, 0.0);
        assert_eq!(metrics.total_ggr, 10.0);
    }

    #[test]
    fn test_short_rows_contribute_zero() {
        let mut sheet = RawSheet::new(
            "OpA",
            vec!["Date".to_string(), "Notes".to_string(), "GGR".to_string()],
        );
        sheet.rows.push(vec![
            CellValue::Text("2024-01-01".to_string()),
            CellValue::Text("ok".to_string()),
            CellValue::Number(40.0),
        ]);
        sheet.rows.push(vec![CellValue::Text("2024-01-02".to_string())]);

        let metrics = summarize(&sheet);
        assert_eq!(metrics.total_ggr, 40.0);
        assert_eq!(metrics.average_daily_ggr, 20.0);
        assert_eq!(
            metrics.lowest_day.unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn test_extreme_day_keeps_first_occurrence() {
        let sheet = operator_sheet(&[("2024-01-01", "5"), ("2024-01-02", "5")]);
        let metrics = summarize(&sheet);
        assert_eq!(
            metrics.highest_day.unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            metrics.lowest_day.unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn test_weekly_change_twenty_percent() {
        let mut values = vec![100.0; 7];
        values.extend(vec![120.0; 7]);
        let change = weekly_change(&values).unwrap();
        assert!((change - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_change_uses_last_fourteen_only() {
        let mut values = vec![1_000_000.0; 5];
        values.extend([90.0, 110.0, 95.0, 105.0, 100.0, 100.0, 100.0]);
        values.extend([130.0, 110.0, 120.0, 120.0, 115.0, 125.0, 120.0]);
        let change = weekly_change(&values).unwrap();
        assert!((change - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_change_guards() {
        assert_eq!(weekly_change(&[100.0; 13]), None);

        let mut values = vec![0.0; 7];
        values.extend(vec![50.0; 7]);
        assert_eq!(weekly_change(&values), None);
    }
}
