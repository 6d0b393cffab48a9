use super::{Decomposition, SeasonalDecomposer};
use crate::error::{GgrReportError, Result};

/// Classical additive decomposition: centred moving-average trend, seasonal component
/// from per-position averages of the detrended series, and what is left as residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicalDecomposer;

impl SeasonalDecomposer for ClassicalDecomposer {
    fn decompose(&self, values: &[f64], period: usize) -> Result<Decomposition> {
        if period < 2 {
            return Err(GgrReportError::ModelError(format!(
                "seasonal period must be at least 2, got {}",
                period
            )));
        }

        if values.len() < 2 * period {
            return Err(GgrReportError::InsufficientData {
                required: 2 * period,
                actual: values.len(),
                details: format!("seasonal decomposition needs two full cycles of {}", period),
            });
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(GgrReportError::ModelError(
                "series contains non-finite values".to_string(),
            ));
        }

        let trend = centered_moving_average(values, period);

        let mut sums = vec![0.0; period];
        let mut counts = vec![0usize; period];
        for (idx, (value, level)) in values.iter().zip(&trend).enumerate() {
            if let Some(level) = level {
                sums[idx % period] += value - level;
                counts[idx % period] += 1;
            }
        }

        let mut pattern: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { 0.0 })
            .collect();
        let offset = pattern.iter().sum::<f64>() / period as f64;
        for weight in pattern.iter_mut() {
            *weight -= offset;
        }

        let seasonal: Vec<f64> = (0..values.len()).map(|idx| pattern[idx % period]).collect();
        let residual = values
            .iter()
            .zip(&trend)
            .zip(&seasonal)
            .map(|((value, level), season)| level.map(|level| value - level - season))
            .collect();

        Ok(Decomposition {
            observed: values.to_vec(),
            trend,
            seasonal,
            residual,
        })
    }
}

/// Centred moving average over one period. Even periods use the 2×m filter
/// (half weight on both ends) so the window stays centred.
fn centered_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let half = period / 2;
    let even = period % 2 == 0;

    (0..values.len())
        .map(|idx| {
            if idx < half || idx + half >= values.len() {
                return None;
            }
            let window = &values[idx - half..=idx + half];
            let total: f64 = if even {
                let inner: f64 = window[1..window.len() - 1].iter().sum();
                inner + 0.5 * (window[0] + window[window.len() - 1])
            } else {
                window.iter().sum()
            };
            Some(total / period as f64)
        })
        .collect()
}
