//! Chart rendering: trend, seasonal decomposition and forecast images per sheet.

pub mod canvas;
pub mod plots;

use crate::config::ReportConfig;
use crate::error::{GgrReportError, Result};
use crate::loader::DataLoader;
use crate::models::{
    run_with_deadline, ClassicalDecomposer, Forecaster, SeasonalDecomposer,
    TrendSeasonalForecaster,
};
use ab_glyph::FontVec;
use image::RgbImage;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Trend,
    Seasonality,
    Forecast,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Trend, ChartKind::Seasonality, ChartKind::Forecast];

    pub fn file_stem(&self) -> &'static str {
        match self {
            ChartKind::Trend => "time_series",
            ChartKind::Seasonality => "seasonality",
            ChartKind::Forecast => "forecast",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::Trend => "trend",
            ChartKind::Seasonality => "seasonality",
            ChartKind::Forecast => "forecast",
        };
        f.write_str(name)
    }
}

/// File name for a chart: the same (kind, sheet) always maps to the same name, and
/// different sheets never share one. Characters outside `[alnum -_. ]` are written as
/// `%XX` per UTF-8 byte.
pub fn chart_file_name(kind: ChartKind, sheet: Option<&str>) -> String {
    match sheet {
        Some(sheet) => {
            let mut safe = String::with_capacity(sheet.len());
            for c in sheet.chars() {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                    safe.push(c);
                } else {
                    let mut buf = [0u8; 4];
                    for byte in c.encode_utf8(&mut buf).bytes() {
                        safe.push_str(&format!("%{:02X}", byte));
                    }
                }
            }
            format!("{}_{}.png", kind.file_stem(), safe)
        }
        None => format!("{}.png", kind.file_stem()),
    }
}

#[derive(Clone)]
pub struct ChartRenderer {
    loader: DataLoader,
    plots_dir: PathBuf,
    seasonal_period: usize,
    horizon_days: u32,
    model_timeout: Option<Duration>,
    decomposer: Arc<dyn SeasonalDecomposer>,
    forecaster: Arc<dyn Forecaster>,
    font: Option<Arc<FontVec>>,
}

impl ChartRenderer {
    pub fn new(loader: DataLoader, config: &ReportConfig) -> Self {
        Self {
            plots_dir: config.plots_dir.clone(),
            seasonal_period: config.seasonal_period,
            horizon_days: config.forecast_horizon_days,
            model_timeout: config.model_timeout(),
            decomposer: Arc::new(ClassicalDecomposer),
            forecaster: Arc::new(TrendSeasonalForecaster::new(config.forecast_interval_width)),
            font: canvas::load_font(config.chart_font.as_deref()).map(Arc::new),
            loader,
        }
    }

    /// Swaps in different statistical models without touching the pipeline.
    pub fn with_models(
        mut self,
        decomposer: Arc<dyn SeasonalDecomposer>,
        forecaster: Arc<dyn Forecaster>,
    ) -> Self {
        self.decomposer = decomposer;
        self.forecaster = forecaster;
        self
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn render_trend(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<PathBuf> {
        self.render(ChartKind::Trend, file_name, sheet)
    }

    pub fn render_seasonality(
        &self,
        file_name: Option<&str>,
        sheet: Option<&str>,
    ) -> Result<PathBuf> {
        self.render(ChartKind::Seasonality, file_name, sheet)
    }

    pub fn render_forecast(&self, file_name: Option<&str>, sheet: Option<&str>) -> Result<PathBuf> {
        self.render(ChartKind::Forecast, file_name, sheet)
    }

    /// Renders into the shared plots directory, overwriting any earlier image for the same key.
    pub fn render(
        &self,
        kind: ChartKind,
        file_name: Option<&str>,
        sheet: Option<&str>,
    ) -> Result<PathBuf> {
        let _guard = self.loader.storage().shared_access();
        self.render_into(&self.plots_dir, kind, file_name, sheet)
    }

    /// Renders into `dir`. The caller is responsible for holding the storage fence.
    pub(crate) fn render_into(
        &self,
        dir: &Path,
        kind: ChartKind,
        file_name: Option<&str>,
        sheet: Option<&str>,
    ) -> Result<PathBuf> {
        let series = self.loader.load(file_name, sheet)?;
        let sheet_label = sheet.unwrap_or("<first sheet>");
        let font = self.font.as_deref();

        let image: RgbImage = match kind {
            ChartKind::Trend => plots::draw_trend(&series, font),
            ChartKind::Seasonality => {
                let decomposer = Arc::clone(&self.decomposer);
                let values = series.values();
                let period = self.seasonal_period;
                let decomposition = run_with_deadline(
                    "seasonal decomposition",
                    self.model_timeout,
                    move || decomposer.decompose(&values, period),
                )
                .map_err(|e| GgrReportError::chart(kind, sheet_label, e))?;
                plots::draw_decomposition(&series.dates(), &decomposition, font)
            }
            ChartKind::Forecast => {
                let forecaster = Arc::clone(&self.forecaster);
                let history = series.clone();
                let horizon = self.horizon_days;
                let forecast = run_with_deadline("forecast", self.model_timeout, move || {
                    forecaster.fit(&history)?.predict(horizon)
                })
                .map_err(|e| GgrReportError::chart(kind, sheet_label, e))?;
                plots::draw_forecast(&series, &forecast, font)
            }
        };

        fs::create_dir_all(dir)?;
        let path = dir.join(chart_file_name(kind, sheet));
        image.save(&path).map_err(|e| {
            GgrReportError::chart(
                kind,
                sheet_label,
                GgrReportError::ImageError(format!("{}: {}", path.display(), e)),
            )
        })?;

        info!(
            "Rendered {} chart for sheet '{}' ({} points) -> {}",
            kind,
            sheet_label,
            series.len(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_file_names_are_stable() {
        assert_eq!(
            chart_file_name(ChartKind::Trend, Some("OpA")),
            "time_series_OpA.png"
        );
        assert_eq!(
            chart_file_name(ChartKind::Seasonality, Some("OpA")),
            "seasonality_OpA.png"
        );
        assert_eq!(chart_file_name(ChartKind::Forecast, None), "forecast.png");
    }

    #[test]
    fn test_chart_file_names_cannot_escape_directory() {
        let name = chart_file_name(ChartKind::Trend, Some("../etc/passwd"));
        assert!(!name.contains('/'));
        assert_eq!(name, "time_series_..%2Fetc%2Fpasswd.png");
    }

    #[test]
    fn test_distinct_sheets_get_distinct_chart_names() {
        let names: Vec<String> = ["Op&A", "Op_A", "Op%26A", "Op(A)", "Op#A"]
            .iter()
            .map(|sheet| chart_file_name(ChartKind::Forecast, Some(sheet)))
            .collect();
        assert_eq!(names[0], "forecast_Op%26A.png");
        assert_eq!(names[1], "forecast_Op_A.png");
        assert_eq!(names[2], "forecast_Op%2526A.png");

        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_kind_display() {
        let labels: Vec<String> = ChartKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(labels, vec!["trend", "seasonality", "forecast"]);
    }
}
