//! Drawing of the three chart kinds onto in-memory images.

use super::canvas::{
    ChartCanvas, PlotArea, Scale, AXIS, BAND_BLUE, BLACK, FORECAST_BLUE, STEEL_BLUE,
};
use crate::loader::CleanedSeries;
use crate::models::{Decomposition, ForecastPoint};
use crate::utils::format_amount;
use ab_glyph::FontVec;
use chrono::{Days, NaiveDate};
use image::RgbImage;

const X_TICKS: usize = 6;
const Y_TICKS: usize = 6;

fn day_offset(origin: NaiveDate, date: NaiveDate) -> f64 {
    (date - origin).num_days() as f64
}

fn date_label(origin: NaiveDate) -> impl Fn(f64) -> String {
    move |offset: f64| {
        origin
            .checked_add_days(Days::new(offset.max(0.0).round() as u64))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

fn amount_label(value: f64) -> String {
    if value.abs() >= 100.0 {
        format_amount(value, 0)
    } else {
        format_amount(value, 2)
    }
}

fn x_scale_for(origin: NaiveDate, last: NaiveDate) -> Scale {
    let span = day_offset(origin, last);
    if span <= 0.0 {
        Scale {
            min: -1.0,
            max: 1.0,
        }
    } else {
        Scale { min: 0.0, max: span }
    }
}

/// Daily GGR line chart, 1200×600.
pub fn draw_trend(series: &CleanedSeries, font: Option<&FontVec>) -> RgbImage {
    let mut canvas = ChartCanvas::new(1200, 600, font);
    let area = PlotArea {
        left: 120.0,
        top: 60.0,
        right: 1170.0,
        bottom: 530.0,
    };

    let origin = series.first_date().unwrap_or_default();
    let last = series.last_date().unwrap_or(origin);
    let x_scale = x_scale_for(origin, last);
    let values = series.values();
    let y_scale = Scale::covering(&values);

    canvas.centered_text(600.0, 16.0, 24.0, BLACK, "Daily GGR Over Time");
    canvas.y_grid(&area, &y_scale, Y_TICKS, amount_label);
    canvas.x_grid(&area, &x_scale, X_TICKS, date_label(origin));
    canvas.frame(&area);

    let points: Vec<(f64, Option<f64>)> = series
        .points()
        .iter()
        .map(|p| (day_offset(origin, p.date), Some(p.value)))
        .collect();
    canvas.series(&area, &x_scale, &y_scale, &points, STEEL_BLUE);

    canvas.centered_text(area.left + area.width() / 2.0, 565.0, 16.0, BLACK, "Date");
    canvas.text(12.0, 30.0, 16.0, BLACK, "GGR");
    canvas.legend(&area, &[("GGR", STEEL_BLUE)]);
    canvas.into_image()
}

/// Four stacked panels: observed, trend, seasonal and residual, 1000×900.
pub fn draw_decomposition(
    dates: &[NaiveDate],
    decomposition: &Decomposition,
    font: Option<&FontVec>,
) -> RgbImage {
    let mut canvas = ChartCanvas::new(1000, 900, font);
    let origin = dates.first().copied().unwrap_or_default();
    let last = dates.last().copied().unwrap_or(origin);
    let x_scale = x_scale_for(origin, last);
    let xs: Vec<f64> = dates.iter().map(|d| day_offset(origin, *d)).collect();

    let panels: [(&str, Vec<Option<f64>>, bool); 4] = [
        (
            "Observed",
            decomposition.observed.iter().copied().map(Some).collect(),
            false,
        ),
        ("Trend", decomposition.trend.clone(), false),
        (
            "Seasonal",
            decomposition.seasonal.iter().copied().map(Some).collect(),
            false,
        ),
        ("Resid", decomposition.residual.clone(), true),
    ];

    canvas.centered_text(500.0, 10.0, 22.0, BLACK, "Seasonal Decomposition (additive)");

    let panel_height = 180.0;
    let gap = 30.0;
    for (idx, (label, values, scatter)) in panels.iter().enumerate() {
        let top = 50.0 + idx as f32 * (panel_height + gap);
        let area = PlotArea {
            left: 120.0,
            top,
            right: 970.0,
            bottom: top + panel_height,
        };
        let defined: Vec<f64> = values.iter().flatten().copied().collect();
        let y_scale = Scale::covering(&defined);

        canvas.y_grid(&area, &y_scale, 4, amount_label);
        if idx == panels.len() - 1 {
            canvas.x_grid(&area, &x_scale, X_TICKS, date_label(origin));
        }
        canvas.frame(&area);
        canvas.text(12.0, top + panel_height / 2.0 - 8.0, 15.0, BLACK, label);

        let points: Vec<(f64, Option<f64>)> =
            xs.iter().copied().zip(values.iter().copied()).collect();
        if *scatter {
            let zero = area.y(&y_scale, 0.0);
            if zero >= area.top && zero <= area.bottom {
                canvas.line((area.left, zero), (area.right, zero), AXIS);
            }
            for (x, y) in points.iter().filter_map(|(x, y)| y.map(|y| (*x, y))) {
                canvas.dot((area.x(&x_scale, x), area.y(&y_scale, y)), 3, STEEL_BLUE);
            }
        } else {
            canvas.series(&area, &x_scale, &y_scale, &points, STEEL_BLUE);
        }
    }

    canvas.into_image()
}

/// Observed points, fitted/predicted line and confidence band, 1000×600.
pub fn draw_forecast(
    series: &CleanedSeries,
    forecast: &[ForecastPoint],
    font: Option<&FontVec>,
) -> RgbImage {
    let mut canvas = ChartCanvas::new(1000, 600, font);
    let area = PlotArea {
        left: 120.0,
        top: 60.0,
        right: 970.0,
        bottom: 530.0,
    };

    let origin = forecast
        .first()
        .map(|p| p.date)
        .or(series.first_date())
        .unwrap_or_default();
    let last = forecast
        .last()
        .map(|p| p.date)
        .or(series.last_date())
        .unwrap_or(origin);
    let x_scale = x_scale_for(origin, last);

    let mut bounds: Vec<f64> = series.values();
    for point in forecast {
        bounds.push(point.lower);
        bounds.push(point.upper);
    }
    let y_scale = Scale::covering(&bounds);

    canvas.centered_text(500.0, 16.0, 24.0, BLACK, "GGR Forecast");
    canvas.y_grid(&area, &y_scale, Y_TICKS, amount_label);
    canvas.x_grid(&area, &x_scale, X_TICKS, date_label(origin));

    let band: Vec<(f64, f64, f64)> = forecast
        .iter()
        .map(|p| (day_offset(origin, p.date), p.lower, p.upper))
        .collect();
    canvas.band(&area, &x_scale, &y_scale, &band, BAND_BLUE);

    let predicted: Vec<(f64, Option<f64>)> = forecast
        .iter()
        .map(|p| (day_offset(origin, p.date), Some(p.predicted)))
        .collect();
    canvas.series(&area, &x_scale, &y_scale, &predicted, FORECAST_BLUE);

    for point in series.points() {
        let center = (
            area.x(&x_scale, day_offset(origin, point.date)),
            area.y(&y_scale, point.value),
        );
        canvas.dot(center, 3, BLACK);
    }

    if let Some(last_observed) = series.last_date() {
        let x = area.x(&x_scale, day_offset(origin, last_observed));
        canvas.line((x, area.top), (x, area.bottom), AXIS);
    }

    canvas.frame(&area);
    canvas.centered_text(area.left + area.width() / 2.0, 565.0, 16.0, BLACK, "Date");
    canvas.text(12.0, 30.0, 16.0, BLACK, "GGR");
    canvas.legend(
        &area,
        &[
            ("Observed", BLACK),
            ("Forecast", FORECAST_BLUE),
            ("Uncertainty interval", BAND_BLUE),
        ],
    );
    canvas.into_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SeriesPoint;
    use crate::models::{ClassicalDecomposer, SeasonalDecomposer};

    fn series(n: usize) -> CleanedSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        CleanedSeries::from_points(
            (0..n)
                .map(|i| SeriesPoint {
                    date: start + chrono::Duration::days(i as i64),
                    value: 1000.0 + 25.0 * i as f64 + if i % 7 == 5 { 300.0 } else { 0.0 },
                })
                .collect(),
        )
    }

    #[test]
    fn test_trend_has_fixed_canvas_and_line() {
        let image = draw_trend(&series(20), None);
        assert_eq!(image.dimensions(), (1200, 600));
        assert!(image.pixels().any(|p| *p == STEEL_BLUE));
    }

    #[test]
    fn test_trend_tolerates_single_point() {
        let image = draw_trend(&series(1), None);
        assert_eq!(image.dimensions(), (1200, 600));
    }

    #[test]
    fn test_decomposition_draws_four_panels() {
        let data = series(28);
        let decomposition = ClassicalDecomposer.decompose(&data.values(), 7).unwrap();
        let image = draw_decomposition(&data.dates(), &decomposition, None);
        assert_eq!(image.dimensions(), (1000, 900));

        // Each panel has its own frame on the left edge of the plot area.
        let framed_rows = (0..900)
            .filter(|y| *image.get_pixel(120, *y) == AXIS)
            .count();
        assert!(framed_rows >= 4 * 150);
    }

    #[test]
    fn test_forecast_draws_band_and_points() {
        let data = series(21);
        let start = data.first_date().unwrap();
        let forecast: Vec<ForecastPoint> = (0..51)
            .map(|i| {
                let predicted = 1000.0 + 25.0 * i as f64;
                ForecastPoint {
                    date: start + chrono::Duration::days(i),
                    predicted,
                    lower: predicted - 200.0,
                    upper: predicted + 200.0,
                }
            })
            .collect();

        let image = draw_forecast(&data, &forecast, None);
        assert_eq!(image.dimensions(), (1000, 600));
        assert!(image.pixels().any(|p| *p == BAND_BLUE));
        assert!(image.pixels().any(|p| *p == FORECAST_BLUE));
        assert!(image.pixels().any(|p| *p == BLACK));
    }
}
