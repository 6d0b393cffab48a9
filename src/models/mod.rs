//! Statistical models behind narrow traits, so the pipeline never depends on a concrete
//! decomposition or forecasting implementation.

pub mod decompose;
pub mod forecast;

pub use decompose::ClassicalDecomposer;
pub use forecast::TrendSeasonalForecaster;

use crate::error::{GgrReportError, Result};
use crate::loader::CleanedSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Additive split of a series. `trend` and `residual` are `None` where the moving
/// average window does not fit (the edges of the series).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub observed: Vec<f64>,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

pub trait SeasonalDecomposer: Send + Sync {
    fn decompose(&self, values: &[f64], period: usize) -> Result<Decomposition>;
}

pub trait FittedForecast: Send {
    /// Predictions for every fitted date followed by `horizon_days` future days.
    fn predict(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>>;
}

pub trait Forecaster: Send + Sync {
    fn fit(&self, series: &CleanedSeries) -> Result<Box<dyn FittedForecast>>;
}

/// Runs `job` on a worker thread and gives up after `timeout`.
///
/// With no timeout the job runs inline. An expired job keeps running detached;
/// its result is discarded.
pub fn run_with_deadline<T, F>(operation: &str, timeout: Option<Duration>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return job();
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("model-{}", operation))
        .spawn(move || {
            let _ = tx.send(job());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(GgrReportError::Timeout {
            operation: operation.to_string(),
            seconds: timeout.as_secs(),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(GgrReportError::ModelError(format!(
            "{} worker stopped without a result",
            operation
        ))),
    }
}
