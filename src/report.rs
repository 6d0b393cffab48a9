//! Multi-operator PDF report: cover, per-sheet metrics and charts, and a GGR ranking.

use crate::charts::{ChartKind, ChartRenderer};
use crate::config::SheetFailurePolicy;
use crate::error::{ErrorKind, Result};
use crate::metrics::{summarize, OperatorMetrics};
use crate::pdf::{DrawingSurface, FontFace, PdfCanvas};
use crate::text::wrap;
use crate::utils::{format_amount, format_date};
use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const MARGIN: f32 = 50.0;
const LEADING: f32 = 14.0;
const METRIC_ROW_STEP: f32 = 18.0;
const RANKING_ROW_STEP: f32 = 20.0;
const VALUE_COLUMN_OFFSET: f32 = 250.0;
const CHART_WIDTH: f32 = 500.0;
const CHART_HEIGHT: f32 = 300.0;

pub const MANIFEST_FILE: &str = "manifest.json";

const INTRO_TEXT: &str = "This report provides a comprehensive overview of Gross Gaming Revenue (GGR) \
trends, seasonality, and forecasts across all registered operators. It is designed for \
decision-makers who may not be familiar with data analytics, and provides clear explanations \
for each chart and metric to help interpret performance and identify patterns.";

fn chart_caption(kind: ChartKind) -> (&'static str, &'static str) {
    match kind {
        ChartKind::Trend => (
            "GGR Trend Over Time",
            "This chart shows daily GGR over time, helping visualize performance fluctuations \
             and long-term trends for the operator.",
        ),
        ChartKind::Seasonality => (
            "Seasonality Analysis",
            "This chart decomposes the GGR data into trend, seasonality, and residual \
             components, highlighting recurring weekly/monthly patterns.",
        ),
        ChartKind::Forecast => (
            "Forecasting Future GGR",
            "Using a trend and weekly-seasonality forecasting model, this chart predicts \
             future GGR for the next 30 days and provides confidence intervals.",
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOperator {
    pub rank: usize,
    pub operator: String,
    pub total_ggr: f64,
}

/// Orders operators by total GGR, highest first. Equal totals keep their input order.
pub fn rank_operators(totals: &[(String, f64)]) -> Vec<RankedOperator> {
    let mut ordered: Vec<&(String, f64)> = totals.iter().collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, (operator, total_ggr))| RankedOperator {
            rank: idx + 1,
            operator: operator.clone(),
            total_ggr: *total_ggr,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSheet {
    pub sheet: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub request_id: Uuid,
    pub path: PathBuf,
    pub ranking: Vec<RankedOperator>,
    pub skipped: Vec<SkippedSheet>,
}

/// One manifest record per generated report, keyed by request id in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub report: PathBuf,
    pub charts: Vec<PathBuf>,
    pub sheets: Vec<String>,
    pub skipped: Vec<String>,
    pub generated_at: DateTime<Local>,
}

pub type Manifest = BTreeMap<String, ManifestEntry>;

/// Reads the report manifest in `reports_dir`. A missing manifest is empty.
pub fn read_manifest(reports_dir: &Path) -> Result<Manifest> {
    let path = reports_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(Manifest::new());
    }
    let json = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&json)?)
}

#[derive(Debug)]
struct SheetSection {
    sheet: String,
    metrics: OperatorMetrics,
    charts: Vec<(ChartKind, PathBuf)>,
}

#[derive(Debug)]
enum SheetOutcome {
    Rendered(SheetSection),
    Skipped(SkippedSheet),
}

pub struct ReportAssembler {
    charts: ChartRenderer,
    policy: SheetFailurePolicy,
    manifest_lock: Mutex<()>,
}

impl ReportAssembler {
    pub fn new(charts: ChartRenderer, policy: SheetFailurePolicy) -> Self {
        Self {
            charts,
            policy,
            manifest_lock: Mutex::new(()),
        }
    }

    /// Builds one report for `sheets` of the workbook (latest upload when `file_name` is `None`).
    ///
    /// Every call writes to its own request-scoped paths, so concurrent calls never share
    /// output files. Storage cleanup waits until the call returns.
    pub fn build_report(&self, file_name: Option<&str>, sheets: &[String]) -> Result<GeneratedReport> {
        let storage = Arc::clone(self.charts.loader().storage());
        let _guard = storage.shared_access();

        let resolved = storage.resolve(file_name)?;
        let request_id = Uuid::new_v4();
        let chart_dir = storage.plots_dir().join(request_id.to_string());
        let report_path = storage
            .reports_dir()
            .join(format!("full_report_{}.pdf", request_id));

        info!(
            "Building report {} from {} for {} sheet(s)",
            request_id,
            resolved.name,
            sheets.len()
        );

        let result = self.assemble(&resolved.name, sheets, &chart_dir, &report_path);
        let (ranking, skipped, chart_paths) = match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Report {} failed: {}", request_id, e);
                discard(&chart_dir);
                return Err(e);
            }
        };

        let entry = ManifestEntry {
            file_name: resolved.name.clone(),
            report: report_path.clone(),
            charts: chart_paths,
            sheets: sheets.to_vec(),
            skipped: skipped.iter().map(|s| s.sheet.clone()).collect(),
            generated_at: Local::now(),
        };
        if let Err(e) = self.record(storage.reports_dir(), request_id, entry) {
            warn!("Could not update report manifest: {}", e);
        }

        info!("Report {} written to {}", request_id, report_path.display());
        Ok(GeneratedReport {
            request_id,
            path: report_path,
            ranking,
            skipped,
        })
    }

    #[allow(clippy::type_complexity)]
    fn assemble(
        &self,
        file_name: &str,
        sheets: &[String],
        chart_dir: &Path,
        report_path: &Path,
    ) -> Result<(Vec<RankedOperator>, Vec<SkippedSheet>, Vec<PathBuf>)> {
        let mut outcomes = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            debug!("Processing operator sheet: {}", sheet);
            match self.process_sheet(file_name, sheet, chart_dir) {
                Ok(section) => outcomes.push(SheetOutcome::Rendered(section)),
                Err(e) => match self.policy {
                    SheetFailurePolicy::FailFast => return Err(e),
                    SheetFailurePolicy::SkipSheet => {
                        warn!("Skipping sheet '{}': {}", sheet, e);
                        outcomes.push(SheetOutcome::Skipped(SkippedSheet {
                            sheet: sheet.clone(),
                            kind: e.kind(),
                            message: e.to_string(),
                        }));
                    }
                },
            }
        }

        let totals: Vec<(String, f64)> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                SheetOutcome::Rendered(section) => {
                    Some((section.sheet.clone(), section.metrics.total_ggr))
                }
                SheetOutcome::Skipped(_) => None,
            })
            .collect();
        let ranking = rank_operators(&totals);

        let mut canvas = PdfCanvas::new();
        compose(&mut canvas, Local::now().date_naive(), &outcomes, &ranking)?;
        canvas.save(report_path)?;

        let mut skipped = Vec::new();
        let mut chart_paths = Vec::new();
        for outcome in outcomes {
            match outcome {
                SheetOutcome::Rendered(section) => {
                    chart_paths.extend(section.charts.into_iter().map(|(_, path)| path))
                }
                SheetOutcome::Skipped(sheet) => skipped.push(sheet),
            }
        }
        Ok((ranking, skipped, chart_paths))
    }

    fn process_sheet(&self, file_name: &str, sheet: &str, chart_dir: &Path) -> Result<SheetSection> {
        let mut charts = Vec::with_capacity(ChartKind::ALL.len());
        for kind in ChartKind::ALL {
            let path = self
                .charts
                .render_into(chart_dir, kind, Some(file_name), Some(sheet))?;
            charts.push((kind, path));
        }

        let raw = self.charts.loader().load_raw(Some(file_name), Some(sheet))?;
        Ok(SheetSection {
            sheet: sheet.to_string(),
            metrics: summarize(&raw),
            charts,
        })
    }

    fn record(&self, reports_dir: &Path, request_id: Uuid, entry: ManifestEntry) -> Result<()> {
        let _lock = self
            .manifest_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut manifest = read_manifest(reports_dir)?;
        manifest.insert(request_id.to_string(), entry);

        let path = reports_dir.join(MANIFEST_FILE);
        let partial = path.with_extension("json.part");
        fs::write(&partial, serde_json::to_string_pretty(&manifest)?)?;
        fs::rename(&partial, &path)?;
        Ok(())
    }
}

fn discard(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

/// Draws wrapped text downwards from `y` and returns the baseline after the last line.
fn draw_wrapped<S: DrawingSurface>(surface: &mut S, text: &str, x: f32, mut y: f32, width: f32) -> f32 {
    for line in wrap(text, width) {
        surface.draw_text(x, y, &line);
        y -= LEADING;
    }
    y
}

fn compose<S: DrawingSurface>(
    surface: &mut S,
    generated_on: NaiveDate,
    outcomes: &[SheetOutcome],
    ranking: &[RankedOperator],
) -> Result<()> {
    draw_cover(surface, generated_on)?;
    for outcome in outcomes {
        match outcome {
            SheetOutcome::Rendered(section) => {
                draw_metrics_page(surface, &section.sheet, &section.metrics)?;
                for (kind, path) in &section.charts {
                    draw_chart_page(surface, *kind, path)?;
                }
            }
            SheetOutcome::Skipped(skipped) => draw_skipped_page(surface, skipped)?,
        }
    }
    draw_ranking(surface, ranking)
}

fn draw_cover<S: DrawingSurface>(surface: &mut S, generated_on: NaiveDate) -> Result<()> {
    let (width, height) = surface.page_size();

    surface.set_font(FontFace::Bold, 22.0);
    surface.draw_centered_text(width / 2.0, height - 120.0, "GGR Analysis Report");

    surface.set_font(FontFace::Regular, 13.0);
    surface.draw_centered_text(
        width / 2.0,
        height - 160.0,
        "Comprehensive Performance Analysis by Operator",
    );
    surface.draw_centered_text(
        width / 2.0,
        height - 190.0,
        &format!("Generated on: {}", generated_on.format("%Y-%m-%d")),
    );

    surface.set_font(FontFace::Regular, 11.0);
    draw_wrapped(surface, INTRO_TEXT, MARGIN, height - 250.0, width - 2.0 * MARGIN);
    surface.new_page()
}

fn metric_rows(metrics: &OperatorMetrics) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Total Bets Closed", format_amount(metrics.total_bets_closed, 0)),
        ("Total Wagered Amount", format_amount(metrics.total_wagered, 2)),
        ("Total Winnings", format_amount(metrics.total_winnings, 2)),
        ("Total GGR", format_amount(metrics.total_ggr, 2)),
        ("Average Daily GGR", format_amount(metrics.average_daily_ggr, 2)),
    ];
    if let Some(day) = &metrics.highest_day {
        rows.push((
            "Highest GGR Day",
            format!("{} ({})", format_date(day.date), format_amount(day.value, 2)),
        ));
    }
    if let Some(day) = &metrics.lowest_day {
        rows.push((
            "Lowest GGR Day",
            format!("{} ({})", format_date(day.date), format_amount(day.value, 2)),
        ));
    }
    if let Some(change) = metrics.weekly_change_pct {
        rows.push(("Weekly % Change", format!("{:.2}%", change)));
    }
    rows
}

fn draw_metrics_page<S: DrawingSurface>(
    surface: &mut S,
    sheet: &str,
    metrics: &OperatorMetrics,
) -> Result<()> {
    let (_, height) = surface.page_size();

    surface.set_font(FontFace::Bold, 18.0);
    surface.draw_text(MARGIN, height - 50.0, &format!("Operator: {}", sheet));
    surface.set_font(FontFace::Bold, 13.0);
    surface.draw_text(MARGIN, height - 80.0, "Key Performance Summary:");

    surface.set_font(FontFace::Regular, 11.0);
    let mut y = height - 110.0;
    for (label, value) in metric_rows(metrics) {
        surface.draw_text(MARGIN, y, &format!("{}:", label));
        surface.draw_text(MARGIN + VALUE_COLUMN_OFFSET, y, &value);
        y -= METRIC_ROW_STEP;
    }
    surface.new_page()
}

fn draw_chart_page<S: DrawingSurface>(surface: &mut S, kind: ChartKind, image: &Path) -> Result<()> {
    let (width, height) = surface.page_size();
    let (title, description) = chart_caption(kind);

    surface.set_font(FontFace::Bold, 14.0);
    surface.draw_text(MARGIN, height - 70.0, title);
    surface.set_font(FontFace::Regular, 11.0);
    draw_wrapped(surface, description, MARGIN, height - 90.0, width - 2.0 * MARGIN);
    surface.draw_image(image, MARGIN, height - 500.0, CHART_WIDTH, CHART_HEIGHT)?;
    surface.new_page()
}

fn draw_skipped_page<S: DrawingSurface>(surface: &mut S, skipped: &SkippedSheet) -> Result<()> {
    let (width, height) = surface.page_size();

    surface.set_font(FontFace::Bold, 18.0);
    surface.draw_text(MARGIN, height - 50.0, &format!("Operator: {}", skipped.sheet));
    surface.set_font(FontFace::Bold, 13.0);
    surface.draw_text(
        MARGIN,
        height - 80.0,
        "Warning: this operator could not be analysed and is left out of the ranking.",
    );
    surface.set_font(FontFace::Regular, 11.0);
    draw_wrapped(surface, &skipped.message, MARGIN, height - 110.0, width - 2.0 * MARGIN);
    surface.new_page()
}

fn draw_ranking<S: DrawingSurface>(surface: &mut S, ranking: &[RankedOperator]) -> Result<()> {
    let (width, height) = surface.page_size();

    surface.set_font(FontFace::Bold, 18.0);
    surface.draw_centered_text(width / 2.0, height - 50.0, "Operator Ranking by Total GGR");
    surface.set_font(FontFace::Regular, 12.0);

    let mut y = height - 100.0;
    for entry in ranking {
        surface.draw_text(MARGIN, y, &format!("{}. {}", entry.rank, entry.operator));
        surface.draw_text(
            MARGIN + VALUE_COLUMN_OFFSET,
            y,
            &format!("Total GGR: {}", format_amount(entry.total_ggr, 2)),
        );
        y -= RANKING_ROW_STEP;
        if y < MARGIN {
            surface.new_page()?;
            surface.set_font(FontFace::Regular, 12.0);
            y = height - 50.0;
        }
    }
    Ok(())
}
