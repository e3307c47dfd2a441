use super::DateClosePair;
use crate::config::MapperSettings;
use crate::data::Result;
use csv::{ReaderBuilder, StringRecord};
use std::io::{Read, Write};
use tracing::{debug, info, trace};

/// Why a row produced no pair.
#[derive(Debug, Clone, PartialEq)]
pub enum MalformedRow {
    TooFewColumns { found: usize },
    InvalidClose { value: String },
}

/// Result of mapping one CSV row.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Emit(DateClosePair),
    Header,
    Malformed(MalformedRow),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub emitted: usize,
    pub headers: usize,
    pub malformed: usize,
}

pub struct Mapper {
    header_token: String,
    date_column: usize,
    close_column: usize,
}

impl Mapper {
    pub fn new(settings: &MapperSettings) -> Self {
        Self {
            header_token: settings.header_token.clone(),
            date_column: settings.date_column,
            close_column: settings.close_column,
        }
    }

    pub fn map_record(&self, record: &StringRecord) -> MapOutcome {
        if record.get(0) == Some(self.header_token.as_str()) {
            return MapOutcome::Header;
        }

        let (Some(date_time), Some(close)) =
            (record.get(self.date_column), record.get(self.close_column))
        else {
            return MapOutcome::Malformed(MalformedRow::TooFewColumns {
                found: record.len(),
            });
        };

        let Ok(close) = close.trim().parse::<f64>() else {
            return MapOutcome::Malformed(MalformedRow::InvalidClose {
                value: close.to_string(),
            });
        };

        // Date portion is everything before the first space.
        let date = date_time.split(' ').next().unwrap_or(date_time);
        MapOutcome::Emit(DateClosePair::new(date, close))
    }

    /// Maps every row of `reader`, handing each emitted pair to `emit` in input order.
    pub fn for_each_pair<R, F>(&self, reader: R, mut emit: F) -> Result<MapStats>
    where
        R: Read,
        F: FnMut(DateClosePair) -> Result<()>,
    {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut stats = MapStats::default();
        let mut record = StringRecord::new();
        while rdr.read_record(&mut record)? {
            match self.map_record(&record) {
                MapOutcome::Emit(pair) => {
                    stats.emitted += 1;
                    emit(pair)?;
                }
                MapOutcome::Header => {
                    stats.headers += 1;
                    trace!("skipping header row");
                }
                MapOutcome::Malformed(reason) => {
                    stats.malformed += 1;
                    debug!(?reason, line = record.position().map(|p| p.line()), "dropping row");
                }
            }
        }

        info!(
            emitted = stats.emitted,
            headers = stats.headers,
            malformed = stats.malformed,
            "mapper finished"
        );
        Ok(stats)
    }

    /// Writes one `date<TAB>close` line per valid row.
    pub fn run<R: Read, W: Write>(&self, reader: R, mut writer: W) -> Result<MapStats> {
        let stats = self.for_each_pair(reader, |pair| {
            writeln!(writer, "{}", pair)?;
            Ok(())
        })?;
        writer.flush()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> Mapper {
        Mapper::new(&MapperSettings::default())
    }

    fn map_str(input: &str) -> (String, MapStats) {
        let mut out = Vec::new();
        let stats = mapper().run(input.as_bytes(), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    #[test]
    fn test_emits_date_and_close() {
        let (out, stats) = map_str("2023-01-01 00:00,100,110,90,105,10\n");
        assert_eq!(out, "2023-01-01\t105.0\n");
        assert_eq!(stats.emitted, 1);
    }

    #[test]
    fn test_header_row_produces_nothing() {
        let (out, stats) = map_str("Date,Open,High,Low,Close,Volume\n");
        assert!(out.is_empty());
        assert_eq!(stats.headers, 1);
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn test_malformed_rows_are_tagged() {
        let m = mapper();
        assert_eq!(
            m.map_record(&StringRecord::from(vec!["2023-01-01 00:00", "1", "2"])),
            MapOutcome::Malformed(MalformedRow::TooFewColumns { found: 3 })
        );
        assert_eq!(
            m.map_record(&StringRecord::from(vec!["2023-01-01", "1", "2", "3", "abc"])),
            MapOutcome::Malformed(MalformedRow::InvalidClose {
                value: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_silently_drops_bad_rows_and_keeps_order() {
        let input = "Date,Open,High,Low,Close,Volume\n\
                     2023-01-02 09:30:00,1,1,1,7.25,1\n\
                     short,row\n\
                     2023-01-01 09:31:00,1,1,1,n/a,1\n\
                     2023-01-01 09:32:00,1,1,1, 8 ,1\n";
        let (out, stats) = map_str(input);
        assert_eq!(out, "2023-01-02\t7.25\n2023-01-01\t8.0\n");
        assert_eq!(
            stats,
            MapStats {
                emitted: 2,
                headers: 1,
                malformed: 2
            }
        );
    }

    #[test]
    fn test_date_without_time_is_kept_whole() {
        let (out, _) = map_str("2023-03-04,1,1,1,2.5\n");
        assert_eq!(out, "2023-03-04\t2.5\n");
    }

    #[test]
    fn test_custom_columns() {
        let settings = MapperSettings {
            header_token: "ts".to_string(),
            date_column: 1,
            close_column: 2,
        };
        let m = Mapper::new(&settings);
        assert_eq!(
            m.map_record(&StringRecord::from(vec!["x", "2024-05-06 10:00", "3"])),
            MapOutcome::Emit(DateClosePair::new("2024-05-06", 3.0))
        );
        assert_eq!(
            m.map_record(&StringRecord::from(vec!["ts", "date", "close"])),
            MapOutcome::Header
        );
    }
}
