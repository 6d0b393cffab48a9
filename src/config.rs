use crate::error::{GgrReportError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SheetFailurePolicy {
    #[default]
    #[schemars(
        description = "Abort the whole report on the first sheet that fails. No report file is written."
    )]
    FailFast,

    #[schemars(
        description = "Replace a failing sheet with a warning page and leave it out of the ranking."
    )]
    SkipSheet,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReportConfig {
    #[schemars(description = "Directory holding uploaded workbooks and the latest-file marker")]
    pub upload_dir: PathBuf,

    #[schemars(description = "Directory where chart images are written")]
    pub plots_dir: PathBuf,

    #[schemars(description = "Directory where PDF reports and the report manifest are written")]
    pub reports_dir: PathBuf,

    #[schemars(description = "Scratch data directory, emptied together with the others on cleanup")]
    pub data_dir: PathBuf,

    #[schemars(
        description = "Zero-based physical row holding the column headers. Rows above it are banner rows and are skipped."
    )]
    pub header_row: usize,

    #[schemars(description = "Seasonal cycle length in days used for decomposition (7 = weekly)")]
    pub seasonal_period: usize,

    #[schemars(description = "Number of days forecast beyond the last observed date")]
    pub forecast_horizon_days: u32,

    #[schemars(description = "Coverage of the forecast confidence band, strictly between 0 and 1")]
    pub forecast_interval_width: f64,

    #[schemars(description = "What to do when a single sheet fails during report generation")]
    pub sheet_failure_policy: SheetFailurePolicy,

    #[schemars(
        description = "Upper bound in seconds for one decomposition or forecast call. Null disables the guard."
    )]
    pub model_timeout_secs: Option<u64>,

    #[schemars(
        description = "TrueType font used for chart titles and labels. When unset, common system fonts are probed."
    )]
    pub chart_font: Option<PathBuf>,

    #[schemars(description = "Interval in hours between storage cleanup runs")]
    pub cleanup_interval_hours: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("app/uploads"),
            plots_dir: PathBuf::from("app/plots"),
            reports_dir: PathBuf::from("app/reports"),
            data_dir: PathBuf::from("app/data"),
            header_row: 1,
            seasonal_period: 7,
            forecast_horizon_days: 30,
            forecast_interval_width: 0.8,
            sheet_failure_policy: SheetFailurePolicy::FailFast,
            model_timeout_secs: Some(120),
            chart_font: None,
            cleanup_interval_hours: 6,
        }
    }
}

impl ReportConfig {
    /// Places every storage area under one root, keeping the default layout.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            upload_dir: root.join("uploads"),
            plots_dir: root.join("plots"),
            reports_dir: root.join("reports"),
            data_dir: root.join("data"),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ReportConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.seasonal_period < 2 {
            return Err(GgrReportError::InvalidConfig(format!(
                "seasonal_period must be at least 2, got {}",
                self.seasonal_period
            )));
        }

        if self.forecast_horizon_days == 0 {
            return Err(GgrReportError::InvalidConfig(
                "forecast_horizon_days must be positive".to_string(),
            ));
        }

        if !(self.forecast_interval_width > 0.0 && self.forecast_interval_width < 1.0) {
            return Err(GgrReportError::InvalidConfig(format!(
                "forecast_interval_width must be between 0 and 1, got {}",
                self.forecast_interval_width
            )));
        }

        if self.model_timeout_secs == Some(0) {
            return Err(GgrReportError::InvalidConfig(
                "model_timeout_secs must be positive when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn model_timeout(&self) -> Option<Duration> {
        self.model_timeout_secs.map(Duration::from_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.max(1) * 3600)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
