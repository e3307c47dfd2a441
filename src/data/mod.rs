pub mod loader;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Header of the cleaned price file, in output column order.
pub const CLEANED_HEADERS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// Columns a raw minute-bar file must carry.
pub const RAW_HEADERS: [&str; 6] = ["Timestamp", "Open", "High", "Low", "Close", "Volume"];

/// Field values treated as missing when cleaning raw rows.
pub const NA_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// One minute bar after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceRecord {
    pub fn to_fields(&self) -> [String; 6] {
        [
            self.date.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            format_float(self.open),
            format_float(self.high),
            format_float(self.low),
            format_float(self.close),
            format_float(self.volume),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessSummary {
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub rows_written: usize,
    /// First cleaned rows, kept for the preview log.
    pub preview: Vec<PriceRecord>,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid number in row {row}, column {column}: {value:?}")]
    InvalidNumber {
        row: u64,
        column: String,
        value: String,
    },
    #[error("Invalid timestamp in row {row}: {value:?}")]
    InvalidTimestamp { row: u64, value: String },
    #[error("Malformed date/close pair on line {line}: {content:?}")]
    MalformedPair { line: usize, content: String },
}

pub type Result<T> = std::result::Result<T, DataError>;

/// Shortest round-trip rendering with a `.0` suffix on integral values and a
/// signed two-digit exponent, e.g. `105.0`, `4.58`, `1e+16`, `1.5e-07`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let rendered = format!("{:?}", value);
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => rendered,
    }
}

pub fn is_missing(field: &str) -> bool {
    NA_TOKENS.contains(&field.trim())
}
