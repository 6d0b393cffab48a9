use super::{FittedForecast, ForecastPoint, Forecaster};
use crate::error::{GgrReportError, Result};
use crate::loader::CleanedSeries;
use chrono::{Datelike, Days, NaiveDate};
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};

const DAYS_PER_WEEK: usize = 7;
const BACKFIT_ROUNDS: usize = 25;

/// Linear trend plus additive day-of-week seasonality, fitted by backfitting.
///
/// Weekly seasonality is only estimated once two full weeks are available; below that
/// the model is trend-only. Intervals are normal bands around the prediction whose
/// width grows with the distance past the last observation.
#[derive(Debug, Clone, Copy)]
pub struct TrendSeasonalForecaster {
    pub interval_width: f64,
}

impl Default for TrendSeasonalForecaster {
    fn default() -> Self {
        Self {
            interval_width: 0.8,
        }
    }
}

impl TrendSeasonalForecaster {
    pub fn new(interval_width: f64) -> Self {
        Self { interval_width }
    }
}

#[derive(Debug, Clone)]
struct TrendSeasonalModel {
    origin: NaiveDate,
    fitted_dates: Vec<NaiveDate>,
    intercept: f64,
    slope: f64,
    weekly: [f64; DAYS_PER_WEEK],
    sigma: f64,
    z: f64,
}

fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_monday() as usize
}

fn day_offset(origin: NaiveDate, date: NaiveDate) -> f64 {
    (date - origin).num_days() as f64
}

/// Least-squares line through `(x, y)` as `(intercept, slope)`.
/// Requires at least two distinct `x`.
fn fit_line(xs: &[f64], ys: &[f64]) -> Result<(f64, f64)> {
    let first = xs.first().copied();
    if xs.iter().all(|x| Some(*x) == first) {
        return Err(GgrReportError::ModelError(
            "all observations fall on one date".to_string(),
        ));
    }

    let records = Array2::from_shape_vec((xs.len(), 1), xs.to_vec())
        .map_err(|e| GgrReportError::ModelError(format!("trend design matrix: {}", e)))?;
    let targets = Array1::from(ys.to_vec());
    let dataset = DatasetBase::from(records).with_targets(targets);

    let model: FittedLinearRegression<f64> = LinearRegression::default()
        .fit(&dataset)
        .map_err(|e| GgrReportError::ModelError(format!("trend fit: {}", e)))?;
    let slope = model.params().first().copied().unwrap_or(0.0);
    Ok((model.intercept(), slope))
}

impl Forecaster for TrendSeasonalForecaster {
    fn fit(&self, series: &CleanedSeries) -> Result<Box<dyn FittedForecast>> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(GgrReportError::ModelError(format!(
                "interval width must be between 0 and 1, got {}",
                self.interval_width
            )));
        }

        let points = series.points();
        if points.len() < 2 {
            return Err(GgrReportError::InsufficientData {
                required: 2,
                actual: points.len(),
                details: "forecast needs at least two observations".to_string(),
            });
        }
        if points.iter().any(|p| !p.value.is_finite()) {
            return Err(GgrReportError::ModelError(
                "series contains non-finite values".to_string(),
            ));
        }

        let origin = points[0].date;
        let xs: Vec<f64> = points.iter().map(|p| day_offset(origin, p.date)).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.value).collect();
        let days: Vec<usize> = points.iter().map(|p| weekday_index(p.date)).collect();
        let seasonal = points.len() >= 2 * DAYS_PER_WEEK;

        let mut weekly = [0.0; DAYS_PER_WEEK];
        let mut intercept = 0.0;
        let mut slope = 0.0;
        for _ in 0..BACKFIT_ROUNDS {
            let adjusted: Vec<f64> = ys
                .iter()
                .zip(&days)
                .map(|(y, day)| y - weekly[*day])
                .collect();
            (intercept, slope) = fit_line(&xs, &adjusted)?;

            if !seasonal {
                break;
            }

            let mut sums = [0.0; DAYS_PER_WEEK];
            let mut counts = [0usize; DAYS_PER_WEEK];
            for ((x, y), day) in xs.iter().zip(&ys).zip(&days) {
                sums[*day] += y - (intercept + slope * x);
                counts[*day] += 1;
            }
            let present = counts.iter().filter(|c| **c > 0).count() as f64;
            let mut next = [0.0; DAYS_PER_WEEK];
            for day in 0..DAYS_PER_WEEK {
                if counts[day] > 0 {
                    next[day] = sums[day] / counts[day] as f64;
                }
            }
            let offset = next.iter().sum::<f64>() / present;
            for day in 0..DAYS_PER_WEEK {
                if counts[day] > 0 {
                    next[day] -= offset;
                }
            }
            weekly = next;
        }

        let dof = if seasonal { 2 + DAYS_PER_WEEK - 1 } else { 2 };
        let squared: f64 = xs
            .iter()
            .zip(&ys)
            .zip(&days)
            .map(|((x, y), day)| {
                let fitted = intercept + slope * x + weekly[*day];
                (y - fitted).powi(2)
            })
            .sum();
        let sigma = (squared / (points.len().saturating_sub(dof).max(1)) as f64).sqrt();

        Ok(Box::new(TrendSeasonalModel {
            origin,
            fitted_dates: series.dates(),
            intercept,
            slope,
            weekly,
            sigma,
            z: normal_quantile(0.5 + self.interval_width / 2.0),
        }))
    }
}

impl TrendSeasonalModel {
    fn point(&self, date: NaiveDate, steps_ahead: f64) -> ForecastPoint {
        let x = day_offset(self.origin, date);
        let predicted = self.intercept + self.slope * x + self.weekly[weekday_index(date)];
        let spread = self.z * self.sigma * (1.0 + steps_ahead / self.fitted_dates.len() as f64).sqrt();
        ForecastPoint {
            date,
            predicted,
            lower: predicted - spread,
            upper: predicted + spread,
        }
    }
}

impl FittedForecast for TrendSeasonalModel {
    fn predict(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        let last = *self
            .fitted_dates
            .last()
            .ok_or_else(|| GgrReportError::ModelError("model has no fitted dates".to_string()))?;

        let mut out: Vec<ForecastPoint> = self
            .fitted_dates
            .iter()
            .map(|date| self.point(*date, 0.0))
            .collect();

        for step in 1..=u64::from(horizon_days) {
            let date = last.checked_add_days(Days::new(step)).ok_or_else(|| {
                GgrReportError::ModelError("forecast horizon overflows the calendar".to_string())
            })?;
            out.push(self.point(date, step as f64));
        }

        Ok(out)
    }
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const LOW: f64 = 0.02425;

    if p <= LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p < 1.0 - LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_quantile(1.0 - p)
    }
}
