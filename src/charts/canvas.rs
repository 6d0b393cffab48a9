use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use log::{debug, warn};
use std::path::Path;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const GRID: Rgb<u8> = Rgb([225, 225, 225]);
pub const AXIS: Rgb<u8> = Rgb([90, 90, 90]);
pub const STEEL_BLUE: Rgb<u8> = Rgb([70, 130, 180]);
pub const FORECAST_BLUE: Rgb<u8> = Rgb([0, 114, 178]);
pub const BAND_BLUE: Rgb<u8> = Rgb([190, 215, 235]);

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn read_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Ignoring unusable font {}: {}", path.display(), e);
            None
        }
    }
}

/// Loads the configured label font, falling back to common system fonts.
/// Charts are still drawn without text when nothing usable is found.
pub fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        if let Some(font) = read_font(path) {
            return Some(font);
        }
        warn!("Configured chart font {} could not be loaded", path.display());
    }

    for candidate in FONT_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_file() {
            if let Some(font) = read_font(path) {
                debug!("Using chart font {}", path.display());
                return Some(font);
            }
        }
    }

    warn!("No chart font found; chart titles and labels will be omitted");
    None
}

/// Linear mapping from data values onto a pixel span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    /// Range covering all finite values with 5% padding; flat or empty input gets a unit span.
    pub fn covering<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(*value);
            max = max.max(*value);
        }

        if !min.is_finite() {
            return Self { min: 0.0, max: 1.0 };
        }
        if (max - min).abs() < f64::EPSILON {
            return Self {
                min: min - 1.0,
                max: max + 1.0,
            };
        }

        let pad = (max - min) * 0.05;
        Self {
            min: min - pad,
            max: max + pad,
        }
    }

    fn fraction(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    pub fn ticks(&self, count: usize) -> Vec<f64> {
        if count < 2 {
            return vec![self.min];
        }
        let step = (self.max - self.min) / (count - 1) as f64;
        (0..count).map(|i| self.min + step * i as f64).collect()
    }
}

/// Pixel rectangle that data is plotted into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PlotArea {
    pub fn x(&self, scale: &Scale, value: f64) -> f32 {
        self.left + (self.right - self.left) * scale.fraction(value) as f32
    }

    pub fn y(&self, scale: &Scale, value: f64) -> f32 {
        self.bottom - (self.bottom - self.top) * scale.fraction(value) as f32
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }
}

pub struct ChartCanvas<'f> {
    image: RgbImage,
    font: Option<&'f FontVec>,
}

impl<'f> ChartCanvas<'f> {
    pub fn new(width: u32, height: u32, font: Option<&'f FontVec>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, WHITE),
            font,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
        draw_line_segment_mut(&mut self.image, from, to, color);
    }

    /// A line drawn twice, one pixel apart, for a heavier stroke.
    pub fn thick_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
        self.line(from, to, color);
        self.line((from.0, from.1 + 1.0), (to.0, to.1 + 1.0), color);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
        if width == 0 || height == 0 {
            return;
        }
        draw_filled_rect_mut(&mut self.image, Rect::at(x, y).of_size(width, height), color);
    }

    pub fn dot(&mut self, center: (f32, f32), radius: i32, color: Rgb<u8>) {
        draw_filled_circle_mut(
            &mut self.image,
            (center.0.round() as i32, center.1.round() as i32),
            radius,
            color,
        );
    }

    pub fn text(&mut self, x: f32, y: f32, size: f32, color: Rgb<u8>, text: &str) {
        if let Some(font) = self.font {
            draw_text_mut(
                &mut self.image,
                color,
                x.round() as i32,
                y.round() as i32,
                PxScale::from(size),
                font,
                text,
            );
        }
    }

    pub fn text_width(&self, size: f32, text: &str) -> f32 {
        match self.font {
            Some(font) => text_size(PxScale::from(size), font, text).0 as f32,
            None => 0.0,
        }
    }

    pub fn centered_text(&mut self, center_x: f32, y: f32, size: f32, color: Rgb<u8>, text: &str) {
        let width = self.text_width(size, text);
        self.text(center_x - width / 2.0, y, size, color, text);
    }

    pub fn frame(&mut self, area: &PlotArea) {
        let PlotArea {
            left,
            top,
            right,
            bottom,
        } = *area;
        self.line((left, top), (right, top), AXIS);
        self.line((left, bottom), (right, bottom), AXIS);
        self.line((left, top), (left, bottom), AXIS);
        self.line((right, top), (right, bottom), AXIS);
    }

    /// Horizontal grid lines with value labels left of the plot area.
    pub fn y_grid(&mut self, area: &PlotArea, scale: &Scale, ticks: usize, label: impl Fn(f64) -> String) {
        for value in scale.ticks(ticks) {
            let y = area.y(scale, value);
            self.line((area.left, y), (area.right, y), GRID);
            let text = label(value);
            let width = self.text_width(12.0, &text);
            self.text(area.left - width - 6.0, y - 7.0, 12.0, AXIS, &text);
        }
    }

    /// Vertical grid lines with labels under the plot area.
    pub fn x_grid(&mut self, area: &PlotArea, scale: &Scale, ticks: usize, label: impl Fn(f64) -> String) {
        for value in scale.ticks(ticks) {
            let x = area.x(scale, value);
            self.line((x, area.top), (x, area.bottom), GRID);
            let text = label(value);
            self.centered_text(x, area.bottom + 6.0, 12.0, AXIS, &text);
        }
    }

    /// Connects consecutive defined points; a `None` breaks the line.
    pub fn series(
        &mut self,
        area: &PlotArea,
        x_scale: &Scale,
        y_scale: &Scale,
        points: &[(f64, Option<f64>)],
        color: Rgb<u8>,
    ) {
        let mut previous: Option<(f32, f32)> = None;
        for (x, y) in points {
            let current = y.map(|y| (area.x(x_scale, *x), area.y(y_scale, y)));
            match (previous, current) {
                (Some(from), Some(to)) => self.thick_line(from, to, color),
                (None, Some(to)) => self.dot(to, 1, color),
                _ => {}
            }
            previous = current;
        }
    }

    /// Shades the region between `lower` and `upper`, one pixel column at a time.
    pub fn band(
        &mut self,
        area: &PlotArea,
        x_scale: &Scale,
        y_scale: &Scale,
        points: &[(f64, f64, f64)],
        color: Rgb<u8>,
    ) {
        for pair in points.windows(2) {
            let (x0, lo0, hi0) = pair[0];
            let (x1, lo1, hi1) = pair[1];
            let px0 = area.x(x_scale, x0);
            let px1 = area.x(x_scale, x1);
            let span = (px1 - px0).max(1.0);

            let mut px = px0.floor();
            while px <= px1.ceil() {
                let t = ((px - px0) / span).clamp(0.0, 1.0) as f64;
                let lo = area.y(y_scale, lo0 + (lo1 - lo0) * t);
                let hi = area.y(y_scale, hi0 + (hi1 - hi0) * t);
                self.line((px, hi), (px, lo), color);
                px += 1.0;
            }
        }
    }

    /// Legend box in the top-left corner of `area`.
    pub fn legend(&mut self, area: &PlotArea, entries: &[(&str, Rgb<u8>)]) {
        let row_height = 20.0;
        let width = entries
            .iter()
            .map(|(label, _)| self.text_width(13.0, label))
            .fold(0.0_f32, f32::max)
            + 44.0;
        let height = row_height * entries.len() as f32 + 8.0;
        let x = area.left + 10.0;
        let y = area.top + 10.0;

        self.fill_rect(x as i32, y as i32, width as u32, height as u32, WHITE);
        self.frame(&PlotArea {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        });
        for (idx, (label, color)) in entries.iter().enumerate() {
            let row_y = y + 4.0 + row_height * idx as f32 + row_height / 2.0;
            self.thick_line((x + 8.0, row_y), (x + 30.0, row_y), *color);
            self.text(x + 36.0, row_y - 8.0, 13.0, BLACK, label);
        }
    }
}
