use chrono::{Days, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Excel's day zero for the 1900 date system (accounts for the phantom 1900-02-29).
fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Converts an Excel serial day number into a calendar date.
/// Returns `None` for values outside the range Excel itself can display.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    excel_epoch()?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Parses the textual date spellings commonly found in exported revenue sheets.
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Removes digit grouping from pre-formatted numeric text: thousands commas and
/// non-breaking spaces always, ordinary spaces only when `strip_spaces` is set.
pub fn clean_numeric_text(raw: &str, strip_spaces: bool) -> String {
    raw.chars()
        .filter(|c| *c != ',' && *c != '\u{a0}' && !(strip_spaces && *c == ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses a cleaned amount. Non-finite results ("inf", "NaN") count as unparseable.
pub fn parse_amount(cleaned: &str) -> Option<f64> {
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Formats a number with `,` thousands separators, e.g. `1234567.891 -> "1,234,567.89"`.
pub fn format_amount(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (idx, digit) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    let mut out = String::new();
    if value.is_sign_negative() && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => "n/a".to_string(),
    }
}
