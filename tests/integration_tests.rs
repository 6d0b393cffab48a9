use chrono::{Duration, NaiveDate};
use ggr_report_builder::*;
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::Path;

const HEADERS: [&str; 5] = [
    "Date",
    "Bets Closed",
    "Closed Bets Wagered Amount",
    "Total Winnings",
    "GGR",
];

struct OperatorSheet<'a> {
    name: &'a str,
    days: usize,
    base: f64,
    reversed: bool,
}

impl<'a> OperatorSheet<'a> {
    fn new(name: &'a str, days: usize, base: f64) -> Self {
        Self {
            name,
            days,
            base,
            reversed: false,
        }
    }

    fn ggr(&self, day: usize) -> f64 {
        self.base + 40.0 * day as f64 + if day % 7 == 5 { 250.0 } else { 0.0 }
    }

    fn total_ggr(&self) -> f64 {
        (0..self.days).map(|day| self.ggr(day)).sum()
    }
}

fn with_separators(value: f64) -> String {
    if value >= 1000.0 {
        format!("{},{:06.2}", (value / 1000.0).floor() as i64, value % 1000.0)
    } else {
        format!("{:.2}", value)
    }
}

/// Workbook laid out like the operator exports: a banner row, headers on the second row,
/// text dates and amounts with thousands separators.
fn operator_workbook(sheets: &[OperatorSheet]) -> anyhow::Result<Vec<u8>> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut workbook = Workbook::new();

    for operator in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(operator.name)?;
        sheet.write_string(0, 0, format!("{} daily summary", operator.name))?;
        for (col, header) in HEADERS.iter().enumerate() {
            sheet.write_string(1, col as u16, *header)?;
        }

        for day in 0..operator.days {
            let position = if operator.reversed {
                operator.days - 1 - day
            } else {
                day
            };
            let row = (position + 2) as u32;
            let ggr = operator.ggr(day);
            let wagered = ggr * 10.0;
            let date = start + Duration::days(day as i64);

            sheet.write_string(row, 0, date.format("%Y-%m-%d").to_string())?;
            sheet.write_number(row, 1, 100.0 + day as f64)?;
            sheet.write_string(row, 2, with_separators(wagered))?;
            sheet.write_number(row, 3, wagered - ggr)?;
            sheet.write_string(row, 4, with_separators(ggr))?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn workbook_without_ggr() -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("NoGgr")?;
    sheet.write_string(0, 0, "banner")?;
    sheet.write_string(1, 0, "Date")?;
    sheet.write_string(1, 1, "Bets Closed")?;
    for day in 0..5u32 {
        sheet.write_string(day + 2, 0, format!("2024-02-0{}", day + 1))?;
        sheet.write_number(day + 2, 1, 10.0)?;
    }
    Ok(workbook.save_to_buffer()?)
}

fn service_in(root: &Path, policy: SheetFailurePolicy) -> GgrReportService {
    let config = ReportConfig {
        sheet_failure_policy: policy,
        ..ReportConfig::rooted_at(root)
    };
    GgrReportService::new(config).unwrap()
}

fn pdf_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".pdf"))
        .collect()
}

#[test]
fn test_two_operator_report_ranks_higher_ggr_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);

    let bytes = operator_workbook(&[
        OperatorSheet::new("OpA", 21, 1000.0),
        OperatorSheet::new("OpB", 21, 3000.0),
    ])?;
    let summary = service.upload("operators.xlsx", &bytes)?;
    assert!(summary.message.starts_with("File parsed:"));

    let sheets = service.sheet_names(None)?;
    assert_eq!(sheets, vec!["OpA".to_string(), "OpB".to_string()]);

    let report = service.build_report(None, &sheets)?;
    assert_eq!(report.ranking.len(), 2);
    assert_eq!(report.ranking[0].operator, "OpB");
    assert_eq!(report.ranking[1].operator, "OpA");
    assert!(report.ranking[0].total_ggr > report.ranking[1].total_ggr);
    assert!(report.skipped.is_empty());

    assert!(report.path.is_file());
    let file_name = report.path.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(file_name, format!("full_report_{}.pdf", report.request_id));

    // Cover, four pages per operator, ranking.
    let document = lopdf::Document::load(&report.path)?;
    assert_eq!(document.get_pages().len(), 1 + 4 * 2 + 1);

    let chart_dir = service
        .config()
        .plots_dir
        .join(report.request_id.to_string());
    let mut charts: Vec<String> = fs::read_dir(&chart_dir)?
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    charts.sort();
    assert_eq!(
        charts,
        vec![
            "forecast_OpA.png",
            "forecast_OpB.png",
            "seasonality_OpA.png",
            "seasonality_OpB.png",
            "time_series_OpA.png",
            "time_series_OpB.png",
        ]
    );

    let manifest = read_manifest(&service.config().reports_dir)?;
    let entry = &manifest[&report.request_id.to_string()];
    assert_eq!(entry.report, report.path);
    assert_eq!(entry.sheets, sheets);
    assert_eq!(entry.charts.len(), 6);
    Ok(())
}

#[test]
fn test_similar_sheet_names_keep_separate_charts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "operators.xlsx",
        &operator_workbook(&[
            OperatorSheet::new("Op&A", 14, 500.0),
            OperatorSheet::new("Op_A", 14, 900.0),
        ])?,
    )?;

    let sheets = service.sheet_names(None)?;
    assert_eq!(sheets, vec!["Op&A".to_string(), "Op_A".to_string()]);
    let report = service.build_report(None, &sheets)?;

    let manifest = read_manifest(&service.config().reports_dir)?;
    let mut charts = manifest[&report.request_id.to_string()].charts.clone();
    assert_eq!(charts.len(), 6);
    charts.sort();
    charts.dedup();
    assert_eq!(charts.len(), 6);
    assert!(charts.iter().all(|path| path.is_file()));
    Ok(())
}

#[test]
fn test_concurrent_style_requests_get_distinct_outputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "operators.xlsx",
        &operator_workbook(&[OperatorSheet::new("OpA", 14, 500.0)])?,
    )?;

    let sheets = vec!["OpA".to_string()];
    let first = service.build_report(None, &sheets)?;
    let second = service.build_report(None, &sheets)?;

    assert_ne!(first.request_id, second.request_id);
    assert_ne!(first.path, second.path);
    assert!(first.path.is_file() && second.path.is_file());
    assert_eq!(read_manifest(&service.config().reports_dir)?.len(), 2);
    Ok(())
}

#[test]
fn test_metrics_from_uploaded_sheet() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    let op = OperatorSheet::new("OpA", 21, 1000.0);
    service.upload("operators.xlsx", &operator_workbook(&[op])?)?;

    let metrics = service.metrics(None, Some("OpA"))?;
    let expected = OperatorSheet::new("OpA", 21, 1000.0).total_ggr();
    assert!((metrics.total_ggr - expected).abs() < 1e-6);
    assert!((metrics.total_bets_closed - 2310.0).abs() < 1e-9);
    assert!((metrics.average_daily_ggr - expected / 21.0).abs() < 1e-6);
    assert!(metrics.weekly_change_pct.is_some());

    let highest = metrics.highest_day.unwrap();
    assert_eq!(highest.date, NaiveDate::from_ymd_opt(2024, 1, 20));
    Ok(())
}

#[test]
fn test_load_sorts_rows_regardless_of_input_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    let mut reversed = OperatorSheet::new("OpA", 15, 800.0);
    reversed.reversed = true;
    service.upload("reversed.xlsx", &operator_workbook(&[reversed])?)?;

    let series = service.load(None, Some("OpA"))?;
    assert_eq!(series.len(), 15);
    assert!(series
        .points()
        .windows(2)
        .all(|pair| pair[0].date < pair[1].date));
    assert_eq!(series.points()[0].value, 800.0);
    Ok(())
}

#[test]
fn test_missing_ggr_column_is_schema_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload("no_ggr.xlsx", &workbook_without_ggr()?)?;

    let err = service.load(None, Some("NoGgr")).unwrap_err();
    assert!(matches!(err, GgrReportError::SchemaError { ref column, .. } if column == "GGR"));

    let chart_err = service
        .render_chart(ChartKind::Trend, None, Some("NoGgr"))
        .unwrap_err();
    assert_eq!(chart_err.kind(), ErrorKind::Schema);
    Ok(())
}

#[test]
fn test_nothing_uploaded_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);

    let err = service.load(None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Not found: No file has been uploaded yet.");
}

#[test]
fn test_explicit_file_name_overrides_latest() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "january.xlsx",
        &operator_workbook(&[OperatorSheet::new("OpA", 14, 100.0)])?,
    )?;
    service.upload(
        "february.xlsx",
        &operator_workbook(&[OperatorSheet::new("OpA", 20, 100.0)])?,
    )?;

    assert_eq!(service.load(None, Some("OpA"))?.len(), 20);
    assert_eq!(service.load(Some("january.xlsx"), Some("OpA"))?.len(), 14);

    let missing = service.load(Some("march.xlsx"), None).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn test_short_sheet_fails_seasonality_with_insufficient_data() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "short.xlsx",
        &operator_workbook(&[OperatorSheet::new("Short", 10, 400.0)])?,
    )?;

    let err = service
        .render_chart(ChartKind::Seasonality, None, Some("Short"))
        .unwrap_err();
    match &err {
        GgrReportError::ChartRenderError { kind, sheet, .. } => {
            assert_eq!(*kind, ChartKind::Seasonality);
            assert_eq!(sheet, "Short");
        }
        other => panic!("expected a chart render error, got {:?}", other),
    }
    assert!(matches!(
        err.root_cause(),
        GgrReportError::InsufficientData {
            required: 14,
            actual: 10,
            ..
        }
    ));

    // Trend and forecast still work on the same sheet.
    assert!(service
        .render_chart(ChartKind::Trend, None, Some("Short"))?
        .is_file());
    assert!(service
        .render_chart(ChartKind::Forecast, None, Some("Short"))?
        .is_file());
    Ok(())
}

#[test]
fn test_fail_fast_writes_no_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "mixed.xlsx",
        &operator_workbook(&[
            OperatorSheet::new("OpA", 21, 1000.0),
            OperatorSheet::new("Short", 10, 400.0),
        ])?,
    )?;

    let sheets = service.sheet_names(None)?;
    let err = service.build_report(None, &sheets).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChartRender);

    assert!(pdf_files(&service.config().reports_dir).is_empty());
    let leftover_dirs = fs::read_dir(&service.config().plots_dir)?
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .count();
    assert_eq!(leftover_dirs, 0);
    Ok(())
}

#[test]
fn test_skip_sheet_policy_reports_remaining_operators() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::SkipSheet);
    service.upload(
        "mixed.xlsx",
        &operator_workbook(&[
            OperatorSheet::new("OpA", 21, 1000.0),
            OperatorSheet::new("Short", 10, 400.0),
        ])?,
    )?;

    let sheets = service.sheet_names(None)?;
    let report = service.build_report(None, &sheets)?;

    assert_eq!(report.ranking.len(), 1);
    assert_eq!(report.ranking[0].operator, "OpA");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].sheet, "Short");
    assert_eq!(report.skipped[0].kind, ErrorKind::ChartRender);

    // Cover, OpA's four pages, the warning page, ranking.
    let document = lopdf::Document::load(&report.path)?;
    assert_eq!(document.get_pages().len(), 7);
    Ok(())
}

#[test]
fn test_chart_rendering_reuses_the_same_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "operators.xlsx",
        &operator_workbook(&[OperatorSheet::new("OpA", 14, 1000.0)])?,
    )?;

    let first = service.render_chart(ChartKind::Trend, None, Some("OpA"))?;
    let second = service.render_chart(ChartKind::Trend, None, Some("OpA"))?;
    assert_eq!(first, second);
    assert_eq!(first, service.config().plots_dir.join("time_series_OpA.png"));

    let image = image::open(&second)?;
    assert_eq!((image.width(), image.height()), (1200, 600));
    Ok(())
}

#[test]
fn test_clear_storage_removes_everything() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast);
    service.upload(
        "operators.xlsx",
        &operator_workbook(&[OperatorSheet::new("OpA", 14, 1000.0)])?,
    )?;
    let report = service.build_report(None, &["OpA".to_string()])?;
    assert!(report.path.is_file());

    let removed = service.clear_storage();
    assert!(removed >= 3);
    assert!(!report.path.exists());
    assert!(service.storage().registry().get().is_none());
    assert_eq!(
        service.load(None, None).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}

#[test]
fn test_custom_models_are_used() -> anyhow::Result<()> {
    use std::sync::Arc;

    struct Flat;

    impl SeasonalDecomposer for Flat {
        fn decompose(&self, values: &[f64], _period: usize) -> Result<Decomposition> {
            Ok(Decomposition {
                observed: values.to_vec(),
                trend: values.iter().map(|v| Some(*v)).collect(),
                seasonal: vec![0.0; values.len()],
                residual: vec![Some(0.0); values.len()],
            })
        }
    }

    let dir = tempfile::tempdir()?;
    let service = service_in(dir.path(), SheetFailurePolicy::FailFast).with_models(
        Arc::new(Flat),
        Arc::new(TrendSeasonalForecaster::default()),
    );
    service.upload(
        "short.xlsx",
        &operator_workbook(&[OperatorSheet::new("Short", 5, 100.0)])?,
    )?;

    let path = service.render_chart(ChartKind::Seasonality, None, Some("Short"))?;
    assert!(path.ends_with("seasonality_Short.png"));
    Ok(())
}
