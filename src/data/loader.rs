use super::{
    is_missing, DataError, PreprocessSummary, PriceRecord, Result, CLEANED_HEADERS, RAW_HEADERS,
};
use chrono::DateTime;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Positions of the required raw columns, in `RAW_HEADERS` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex([usize; 6]);

pub struct Preprocessor {
    preview_rows: usize,
}

impl Preprocessor {
    pub fn new(preview_rows: usize) -> Self {
        Self { preview_rows }
    }

    /// Locates each required column by case-insensitive header name.
    pub fn verify_required_columns(headers: &StringRecord) -> Result<ColumnIndex> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

        let mut positions = [0usize; 6];
        for (slot, column) in positions.iter_mut().zip(RAW_HEADERS) {
            *slot = lowered
                .iter()
                .position(|h| *h == column.to_lowercase())
                .ok_or_else(|| DataError::MissingColumn(column.to_string()))?;
        }
        Ok(ColumnIndex(positions))
    }

    /// Returns `None` when any required field is missing, so the row is dropped.
    /// Columns outside the six required ones are never checked.
    pub fn clean_row(
        row: u64,
        columns: &ColumnIndex,
        record: &StringRecord,
    ) -> Result<Option<PriceRecord>> {
        let mut fields = [""; 6];
        for (field, &idx) in fields.iter_mut().zip(columns.0.iter()) {
            match record.get(idx) {
                Some(value) if !is_missing(value) => *field = value.trim(),
                _ => return Ok(None),
            }
        }

        let mut numbers = [0.0f64; 6];
        for ((number, field), column) in numbers.iter_mut().zip(fields).zip(RAW_HEADERS) {
            *number = field.parse().map_err(|_| DataError::InvalidNumber {
                row,
                column: column.to_string(),
                value: field.to_string(),
            })?;
        }

        let [timestamp, open, high, low, close, volume] = numbers;
        let date = Self::timestamp_to_datetime(timestamp).ok_or_else(|| {
            DataError::InvalidTimestamp {
                row,
                value: fields[0].to_string(),
            }
        })?;

        Ok(Some(PriceRecord {
            date,
            open,
            high,
            low,
            close,
            volume,
        }))
    }

    /// Converts seconds since the Unix epoch (fractional allowed) to a UTC date-time.
    pub fn timestamp_to_datetime(seconds: f64) -> Option<chrono::NaiveDateTime> {
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        // Rounding can carry a full second into the nanosecond part.
        let mut secs = whole as i64;
        let mut nanos = ((seconds - whole) * 1e9).round() as u32;
        if nanos >= 1_000_000_000 {
            secs += 1;
            nanos -= 1_000_000_000;
        }
        DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
    }

    /// Streams a raw minute-bar CSV into the cleaned `Date,Open,High,Low,Close,Volume` layout.
    pub fn preprocess<R: Read, W: Write>(&self, reader: R, writer: W) -> Result<PreprocessSummary> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = Self::verify_required_columns(rdr.headers()?)?;
        debug!(?columns, "resolved raw columns");

        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(CLEANED_HEADERS)?;

        let mut summary = PreprocessSummary::default();
        for result in rdr.records() {
            let record = result?;
            summary.rows_read += 1;
            let row = record
                .position()
                .map(|p| p.line())
                .unwrap_or(summary.rows_read as u64 + 1);

            match Self::clean_row(row, &columns, &record)? {
                Some(cleaned) => {
                    wtr.write_record(cleaned.to_fields())?;
                    summary.rows_written += 1;
                    if summary.preview.len() < self.preview_rows {
                        summary.preview.push(cleaned);
                    }
                }
                None => {
                    summary.rows_dropped += 1;
                    debug!(row, "dropping row with missing values");
                }
            }
        }
        wtr.flush()?;

        for record in &summary.preview {
            info!("{}", record.to_fields().join(","));
        }
        info!(
            rows_read = summary.rows_read,
            rows_dropped = summary.rows_dropped,
            rows_written = summary.rows_written,
            "preprocessing finished"
        );

        Ok(summary)
    }

    pub fn preprocess_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<PreprocessSummary> {
        info!(
            input = %input.as_ref().display(),
            output = %output.as_ref().display(),
            "loading raw price data"
        );
        let source = File::open(&input)?;
        let target = File::create(&output)?;
        self.preprocess(source, target)
    }
}
