use super::{DailyAverage, DateClosePair};
use crate::data::{DataError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tracing::{debug, info};

/// How the reducer relates input order to date groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// Input is already grouped by date; only contiguous runs are merged.
    #[default]
    Contiguous,
    /// Buffer the whole input and stable-sort it by date first.
    SortByDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceStats {
    pub pairs: usize,
    pub skipped: usize,
    pub groups: usize,
}

#[derive(Debug)]
struct Group {
    date: String,
    sum: f64,
    count: usize,
}

impl Group {
    fn start(date: &str, close: f64) -> Self {
        Self {
            date: date.to_string(),
            sum: close,
            count: 1,
        }
    }

    fn into_average(self) -> DailyAverage {
        DailyAverage {
            date: self.date,
            average: self.sum / self.count as f64,
        }
    }
}

/// Running mean over contiguous runs of equal dates.
#[derive(Debug, Default)]
pub struct GroupAverager {
    current: Option<Group>,
}

impl GroupAverager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a close to the open group, returning the previous group when the date changes.
    pub fn push(&mut self, date: &str, close: f64) -> Option<DailyAverage> {
        if let Some(group) = self.current.as_mut() {
            if group.date == date {
                group.sum += close;
                group.count += 1;
                return None;
            }
        }
        self.current
            .replace(Group::start(date, close))
            .map(Group::into_average)
    }

    /// Flushes the final open group, if any.
    pub fn finish(&mut self) -> Option<DailyAverage> {
        self.current.take().map(Group::into_average)
    }

    pub fn average_runs<I>(pairs: I) -> Vec<DailyAverage>
    where
        I: IntoIterator<Item = DateClosePair>,
    {
        let mut averager = Self::new();
        let mut averages: Vec<DailyAverage> = pairs
            .into_iter()
            .filter_map(|pair| averager.push(&pair.date, pair.close))
            .collect();
        averages.extend(averager.finish());
        averages
    }
}

/// Parses a `date<TAB>close` line.
///
/// Returns `Ok(None)` when the close is not a number. Anything other than
/// exactly two tab-separated fields is fatal.
pub fn parse_pair(line_no: usize, line: &str) -> Result<Option<DateClosePair>> {
    let trimmed = line.trim();
    let mut fields = trimmed.split('\t');
    let (Some(date), Some(close), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(DataError::MalformedPair {
            line: line_no,
            content: line.to_string(),
        });
    };

    Ok(close
        .trim()
        .parse::<f64>()
        .ok()
        .map(|close| DateClosePair::new(date, close)))
}

/// Feeds every parsable pair to `f`, returning how many lines had a non-numeric close.
fn read_pairs<R, F>(reader: R, mut f: F) -> Result<usize>
where
    R: BufRead,
    F: FnMut(DateClosePair) -> Result<()>,
{
    let mut skipped = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_pair(idx + 1, &line)? {
            Some(pair) => f(pair)?,
            None => {
                skipped += 1;
                debug!(line = idx + 1, "skipping non-numeric close");
            }
        }
    }
    Ok(skipped)
}

pub struct Reducer {
    decimals: usize,
    order: GroupOrder,
}

impl Reducer {
    pub fn new(decimals: usize, order: GroupOrder) -> Self {
        Self { decimals, order }
    }

    /// Reads `date<TAB>close` lines and writes one `date<TAB>average` line per group.
    pub fn run<R: BufRead, W: Write>(&self, reader: R, writer: W) -> Result<ReduceStats> {
        let (mut stats, skipped) = match self.order {
            GroupOrder::Contiguous => {
                let mut averager = GroupAverager::new();
                let mut out = GroupWriter::new(writer, self.decimals);
                let skipped = read_pairs(reader, |pair| {
                    out.pairs += 1;
                    if let Some(avg) = averager.push(&pair.date, pair.close) {
                        out.write(&avg)?;
                    }
                    Ok(())
                })?;
                if let Some(avg) = averager.finish() {
                    out.write(&avg)?;
                }
                (out.finish()?, skipped)
            }
            GroupOrder::SortByDate => {
                let mut pairs = Vec::new();
                let skipped = read_pairs(reader, |pair| {
                    pairs.push(pair);
                    Ok(())
                })?;
                (self.reduce_pairs(pairs, writer)?, skipped)
            }
        };
        stats.skipped = skipped;

        info!(
            pairs = stats.pairs,
            skipped = stats.skipped,
            groups = stats.groups,
            "reducer finished"
        );
        Ok(stats)
    }

    /// Aggregates already-parsed pairs, sorting them first under `SortByDate`.
    pub fn reduce_pairs<W: Write>(
        &self,
        mut pairs: Vec<DateClosePair>,
        writer: W,
    ) -> Result<ReduceStats> {
        if self.order == GroupOrder::SortByDate {
            pairs.sort_by(|a, b| a.date.cmp(&b.date));
        }

        let mut out = GroupWriter::new(writer, self.decimals);
        out.pairs = pairs.len();
        for avg in GroupAverager::average_runs(pairs) {
            out.write(&avg)?;
        }
        out.finish()
    }
}

struct GroupWriter<W: Write> {
    writer: W,
    decimals: usize,
    pairs: usize,
    groups: usize,
}

impl<W: Write> GroupWriter<W> {
    fn new(writer: W, decimals: usize) -> Self {
        Self {
            writer,
            decimals,
            pairs: 0,
            groups: 0,
        }
    }

    fn write(&mut self, avg: &DailyAverage) -> Result<()> {
        writeln!(self.writer, "{:.*}", self.decimals, avg)?;
        self.groups += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<ReduceStats> {
        self.writer.flush()?;
        Ok(ReduceStats {
            pairs: self.pairs,
            skipped: 0,
            groups: self.groups,
        })
    }
}
