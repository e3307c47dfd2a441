pub mod mapper;
pub mod reducer;

use crate::config::Config;
use crate::data::{format_float, Result};
use mapper::{MapStats, Mapper};
use reducer::{GroupOrder, ReduceStats, Reducer};
use std::fmt;
use std::io::{Read, Write};
use tracing::info;

/// Key/value record passed from the mapper to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct DateClosePair {
    pub date: String,
    pub close: f64,
}

impl DateClosePair {
    pub fn new(date: impl Into<String>, close: f64) -> Self {
        Self {
            date: date.into(),
            close,
        }
    }
}

impl fmt::Display for DateClosePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.date, format_float(self.close))
    }
}

/// Mean close for one date group.
///
/// Displays as `date<TAB>average`; the formatter precision selects the
/// number of decimals and defaults to 2.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAverage {
    pub date: String,
    pub average: f64,
}

impl fmt::Display for DailyAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = f.precision().unwrap_or(2);
        write!(f, "{}\t{:.*}", self.date, decimals, self.average)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub map: MapStats,
    pub reduce: ReduceStats,
}

/// Runs map, sort and reduce in one process over a cleaned price CSV.
///
/// The sort is always applied, so every distinct date yields one line
/// regardless of the configured reducer order.
pub fn run_pipeline<R: Read, W: Write>(
    reader: R,
    writer: W,
    config: &Config,
) -> Result<PipelineSummary> {
    let mapper = Mapper::new(&config.mapper);
    let reducer = Reducer::new(config.reducer.decimals, GroupOrder::SortByDate);

    let mut pairs = Vec::new();
    let map = mapper.for_each_pair(reader, |pair| {
        pairs.push(pair);
        Ok(())
    })?;
    let reduce = reducer.reduce_pairs(pairs, writer)?;

    info!(
        emitted = map.emitted,
        groups = reduce.groups,
        "pipeline finished"
    );
    Ok(PipelineSummary { map, reduce })
}
