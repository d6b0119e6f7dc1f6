//! Stats aggregator turning raw counter records into normalized vectors
//!
//! The aggregator starts the counter source, primes the results channel with
//! an all-zero vector, then converts each raw record into a [`StatVector`]
//! until the source closes its stream.

use crate::collectors::CounterSource;
use crate::config::Config;
use crate::error::CollectorError;
use crate::samples::{Counter, RawRecord, StatVector};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Capacity of the record channel between the counter source and the aggregator
pub const RECORD_BUFFER: usize = 5;

/// How an aggregation loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The counter source closed its record stream
    SourceClosed,
    /// The receiving end of the results channel was dropped
    ConsumerGone,
}

/// Converts counter records into [`StatVector`]s and watches for stalls
///
/// Stall handling is best-effort: when no record arrives within the stall
/// timeout a quit signal is sent toward the counter source, but a source
/// blocked on a hung utility will not see it until its read returns, so a
/// hung utility may never be reaped.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    /// Counters in output order
    counters: Vec<Counter>,
    /// Longest wait for a record before the session counts as stalled
    stall_timeout: Duration,
    /// Log each raw percentage as it is parsed
    debug: bool,
}

impl StatsAggregator {
    /// Create an aggregator for the four fixed counters
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sysstats::aggregator::StatsAggregator;
    ///
    /// let aggregator = StatsAggregator::new(Duration::from_secs(10), false);
    /// assert_eq!(aggregator.width(), 4);
    /// ```
    pub fn new(stall_timeout: Duration, debug: bool) -> Self {
        Self {
            counters: Counter::ALL.to_vec(),
            stall_timeout,
            debug,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stall_timeout(), config.debug)
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    /// Number of values in every emitted vector
    pub fn width(&self) -> usize {
        self.counters.len()
    }

    /// Counter identifiers to request from the sampling utility, in output order
    pub fn counter_paths(&self) -> Vec<String> {
        self.counters.iter().map(|c| c.path().to_string()).collect()
    }

    /// Start `source` and aggregate its records into `results`
    ///
    /// `quit_rx` is handed to the source; `quit_tx` is kept for stall
    /// handling. Returns once the results channel has been closed.
    pub fn sample(
        &self,
        source: CounterSource,
        quit_tx: Sender<()>,
        quit_rx: Receiver<()>,
        results: Sender<StatVector>,
    ) -> SessionEnd {
        let (records_tx, records_rx) = mpsc::sync_channel(RECORD_BUFFER);
        let source_handle = source.spawn(records_tx, quit_rx);

        let end = self.run(records_rx, quit_tx, results);

        // The source may still be stuck in a read if the consumer left early.
        if end == SessionEnd::SourceClosed && source_handle.join().is_err() {
            warn!("Counter source thread panicked");
        }
        end
    }

    /// Aggregation loop
    ///
    /// Sends one zero vector straight away, then one vector per record in
    /// arrival order. Each wait resolves on whichever comes first: a record,
    /// the record stream closing, or the stall timeout. `results` is dropped,
    /// and so closed, when this returns.
    pub fn run(
        &self,
        records: Receiver<RawRecord>,
        quit: Sender<()>,
        results: Sender<StatVector>,
    ) -> SessionEnd {
        // Samples take a full interval to arrive; give the consumer something now.
        if results.send(StatVector::zeroed(self.width())).is_err() {
            return Self::consumer_gone(&quit);
        }

        loop {
            match records.recv_timeout(self.stall_timeout) {
                Ok(record) => {
                    let stats = self.normalize(&record);
                    if results.send(stats).is_err() {
                        return Self::consumer_gone(&quit);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Counter source closed, stopping stats aggregator");
                    return SessionEnd::SourceClosed;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Counter read timed out after {:?}, asking the source to quit",
                        self.stall_timeout
                    );
                    if quit.send(()).is_err() {
                        debug!("Counter source already stopped listening for quit");
                    }
                }
            }
        }
    }

    fn consumer_gone(quit: &Sender<()>) -> SessionEnd {
        warn!("Results receiver dropped, stopping stats aggregator");
        let _ = quit.send(());
        SessionEnd::ConsumerGone
    }

    /// Convert one record into a vector of fractions
    ///
    /// Unparsable fields become 0.0 without affecting the rest of the record.
    pub fn normalize(&self, record: &RawRecord) -> StatVector {
        let percentages = parse_percentages(record, self.width());

        if self.debug {
            for (counter, value) in self.counters.iter().zip(&percentages) {
                info!("{}%: {}", counter.label(), value);
            }
        }

        StatVector::from_values(percentages.iter().map(|p| p / 100.0).collect())
    }
}

/// Parse one quoted percentage field
///
/// `index` is the field's position in the record and only appears in the
/// error message.
pub fn parse_field(index: usize, field: &str) -> Result<f64, CollectorError> {
    field.trim_matches('"').parse::<f64>().map_err(|_| {
        CollectorError::ParseError(format!("field {} in counter data: '{}'", index, field))
    })
}

/// Raw percentages for the `width` fields following the timestamp
///
/// Missing fields and fields that fail to parse read as 0.0; fields beyond
/// `width` are ignored. Both cases are logged as warnings.
pub fn parse_percentages(record: &RawRecord, width: usize) -> Vec<f64> {
    if record.len() != width + 1 {
        warn!(
            "Counter data has {} fields, expected {}",
            record.len(),
            width + 1
        );
    }

    let mut percentages = vec![0.0; width];
    for (index, field) in record.iter().enumerate().skip(1).take(width) {
        percentages[index - 1] = match parse_field(index, field) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}", e);
                0.0
            }
        };
    }
    percentages
}



// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn quoted_record(values: &[f64]) -> RawRecord {
        std::iter::once("\"20231001120000.000\"".to_string())
            .chain(values.iter().map(|v| format!("\"{}\"", v)))
            .collect()
    }

    #[quickcheck]
    fn prop_well_formed_fields_divide_by_hundred(raw: Vec<u32>) -> bool {
        let values: Vec<f64> = raw.iter().map(|v| f64::from(*v % 100_000) / 10.0).collect();
        let record = quoted_record(&values);

        let percentages = parse_percentages(&record, values.len());
        let fractions: Vec<f64> = percentages.iter().map(|p| p / 100.0).collect();

        percentages == values
            && fractions
                .iter()
                .zip(&values)
                .all(|(fraction, value)| *fraction == value / 100.0)
    }

    #[quickcheck]
    fn prop_bad_field_only_zeroes_its_own_slot(raw: Vec<u16>, bad: usize) -> bool {
        if raw.is_empty() {
            return true;
        }
        let values: Vec<f64> = raw.iter().map(|v| f64::from(*v)).collect();
        let bad = bad % values.len();

        let mut record = quoted_record(&values);
        record[bad + 1] = "\"n/a\"".to_string();

        let percentages = parse_percentages(&record, values.len());
        percentages.iter().enumerate().all(|(i, p)| {
            if i == bad {
                *p == 0.0
            } else {
                *p == values[i]
            }
        })
    }

    #[quickcheck]
    fn prop_output_width_is_fixed(fields: Vec<String>) -> bool {
        let record: RawRecord = fields;
        let aggregator = StatsAggregator::new(Duration::from_secs(10), false);
        aggregator.normalize(&record).len() == 4
    }
}
