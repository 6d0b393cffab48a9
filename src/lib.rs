//! # GGR Report Builder
//!
//! A library for turning uploaded gaming-operator workbooks into daily Gross Gaming
//! Revenue (GGR) analysis: cleaned time series, summary metrics, trend / seasonality /
//! forecast charts, and a multi-operator PDF report with a GGR ranking.
//!
//! ## Core Concepts
//!
//! - **Sheet**: one tab of an uploaded workbook, holding one operator's daily rows
//! - **Cleaned series**: strictly increasing `(date, GGR)` pairs with no missing values
//! - **Operator metrics**: totals, daily average, best/worst day and week-over-week change
//! - **Charts**: PNG images rendered per sheet, with models behind replaceable traits
//! - **Report**: cover page, one metrics page and three chart pages per operator, ranking
//!
//! ## Example
//!
//! ```rust,ignore
//! use ggr_report_builder::*;
//!
//! let service = GgrReportService::new(ReportConfig::rooted_at("app"))?;
//! service.upload("operators.xlsx", &std::fs::read("operators.xlsx")?)?;
//!
//! let sheets = service.sheet_names(None)?;
//! let report = service.build_report(None, &sheets)?;
//! println!("{} -> {}", report.request_id, report.path.display());
//! for entry in &report.ranking {
//!     println!("{}. {} ({:.2})", entry.rank, entry.operator, entry.total_ggr);
//! }
//! ```

pub mod charts;
pub mod config;
pub mod error;
pub mod loader;
pub mod maintenance;
pub mod metrics;
pub mod models;
pub mod pdf;
pub mod registry;
pub mod report;
pub mod storage;
pub mod text;
pub mod utils;
pub mod workbook;

pub use charts::{ChartKind, ChartRenderer};
pub use config::{ReportConfig, SheetFailurePolicy};
pub use error::{ErrorKind, GgrReportError, Result};
pub use loader::{clean_sheet, CleanedSeries, DataLoader, SeriesPoint};
pub use maintenance::CleanupTask;
pub use metrics::{summarize, weekly_change, DailyExtreme, OperatorMetrics};
pub use models::{
    ClassicalDecomposer, Decomposition, FittedForecast, ForecastPoint, Forecaster,
    SeasonalDecomposer, TrendSeasonalForecaster,
};
pub use pdf::{DrawingSurface, FontFace, PdfCanvas};
pub use registry::LatestFileRegistry;
pub use report::{
    rank_operators, read_manifest, GeneratedReport, ManifestEntry, RankedOperator,
    ReportAssembler, SkippedSheet,
};
pub use storage::{Storage, UploadSummary};
pub use text::wrap;
pub use workbook::{CellValue, RawSheet, SheetSelector};

use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the pipeline needs, wired from one [`ReportConfig`].
pub struct GgrReportService {
    config: ReportConfig,
    storage: Arc<Storage>,
    loader: DataLoader,
    charts: ChartRenderer,
    reports: ReportAssembler,
}

impl GgrReportService {
    pub fn new(config: ReportConfig) -> Result<Self> {
        config.validate()?;

        info!(
            "Starting GGR report service (uploads: {}, reports: {})",
            config.upload_dir.display(),
            config.reports_dir.display()
        );
        debug!(
            "Seasonal period {}, forecast horizon {} days, failure policy {:?}",
            config.seasonal_period, config.forecast_horizon_days, config.sheet_failure_policy
        );

        let storage = Arc::new(Storage::open(&config)?);
        let loader = DataLoader::new(Arc::clone(&storage));
        let charts = ChartRenderer::new(loader.clone(), &config);
        let reports = ReportAssembler::new(charts.clone(), config.sheet_failure_policy);

        Ok(Self {
            config,
            storage,
            loader,
            charts,
            reports,
        })
    }

    /// Replaces the statistical models used for seasonality and forecast charts.
    pub fn with_models(
        mut self,
        decomposer: Arc<dyn SeasonalDecomposer>,
        forecaster: Arc<dyn Forecaster>,
    ) -> Self {
        self.charts = self.charts.with_models(decomposer, forecaster);
        self.reports = ReportAssembler::new(self.charts.clone(), self.config.sheet_failure_policy);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadSummary> {
        self.storage.save_upload(file_name, bytes)
    }

    pub fn sheet_names(&self, file_name: Option<&str>) -> Result<Vec<String>> {
        let _guard = self.storage.shared_access();
        self.storage.sheet_names(file_name)
    }

    pub fn load(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<CleanedSeries> {
        let _guard = self.storage.shared_access();
        self.loader.load(file_name, sheet)
    }

    pub fn metrics(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<OperatorMetrics> {
        let _guard = self.storage.shared_access();
        let raw = self.loader.load_raw(file_name, sheet)?;
        Ok(summarize(&raw))
    }

    pub fn render_chart(
        &self,
        kind: ChartKind,
        file_name: Option<&str>,
        sheet: Option<&str>,
    ) -> Result<PathBuf> {
        self.charts.render(kind, file_name, sheet)
    }

    pub fn build_report(&self, file_name: Option<&str>, sheets: &[String]) -> Result<GeneratedReport> {
        self.reports.build_report(file_name, sheets)
    }

    /// Empties all storage areas right away. Returns the number of entries removed.
    pub fn clear_storage(&self) -> usize {
        self.storage.clear_all()
    }

    /// Starts the periodic cleanup at the configured interval.
    pub fn start_cleanup(&self) -> Result<CleanupTask> {
        CleanupTask::spawn(Arc::clone(&self.storage), self.config.cleanup_interval())
    }
}

/// One-shot report generation: opens the configured storage and builds a report.
pub fn generate_report(
    config: ReportConfig,
    file_name: Option<&str>,
    sheets: &[String],
) -> Result<GeneratedReport> {
    GgrReportService::new(config)?.build_report(file_name, sheets)
}
