//! Public entry point for sampling system stats
//!
//! A [`StatsSession`] runs one sampling utility and one aggregator thread.
//! The caller reads [`StatVector`]s from [`StatsSession::results`] and ends the
//! session through [`StatsSession::quit`] or a sender from
//! [`StatsSession::quit_signal`].

use crate::aggregator::StatsAggregator;
use crate::collectors::CounterSource;
use crate::config::Config;
use crate::error::CollectorError;
use crate::samples::StatVector;
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Whole seconds to pass to the sampling utility for `interval`
///
/// Fractions of a second are dropped; anything shorter than one second is
/// raised to one second.
pub fn interval_seconds(interval: Duration) -> u64 {
    let seconds = interval.as_secs();
    if seconds == 0 {
        warn!(
            "Sampling interval {:?} is below one second, using 1s",
            interval
        );
        return 1;
    }
    seconds
}

/// A running sampling session
///
/// The first value on the results channel is always an all-zero vector,
/// delivered before the utility reports anything. The channel closes once
/// the utility's output ends, which follows a quit signal, a failure to
/// start, or the utility exiting on its own.
///
/// Quitting is cooperative. The counter source only checks for the signal
/// between lines, so a hung utility keeps the session open.
pub struct StatsSession {
    results: Receiver<StatVector>,
    quit: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StatsSession {
    /// Start sampling the four fixed counters every `interval`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use sysstats::config::Config;
    /// use sysstats::session::StatsSession;
    ///
    /// let session = StatsSession::start(Duration::from_secs(1), &Config::default());
    /// for stats in session.results().iter().take(3) {
    ///     println!("{:?}", stats.values());
    /// }
    /// session.quit();
    /// ```
    pub fn start(interval: Duration, config: &Config) -> Self {
        let seconds = interval_seconds(interval);
        let aggregator = StatsAggregator::from_config(config);
        let source =
            CounterSource::new(config.program.clone(), aggregator.counter_paths(), seconds);

        let (results_tx, results_rx) = mpsc::channel();
        let (quit_tx, quit_rx) = mpsc::channel();
        let stall_quit = quit_tx.clone();

        info!("Starting stats session with {}s interval", seconds);
        let handle = thread::spawn(move || {
            let end = aggregator.sample(source, stall_quit, quit_rx, results_tx);
            debug!("Stats session ended: {:?}", end);
        });

        Self {
            results: results_rx,
            quit: quit_tx,
            handle: Some(handle),
        }
    }

    /// Channel delivering one [`StatVector`] per sample, closed when the session ends
    pub fn results(&self) -> &Receiver<StatVector> {
        &self.results
    }

    /// A sender that ends the session when signalled
    pub fn quit_signal(&self) -> Sender<()> {
        self.quit.clone()
    }

    /// Ask the session to stop
    pub fn quit(&self) {
        if self.quit.send(()).is_err() {
            debug!("Stats session already stopped");
        }
    }

    /// Wait for the session threads to finish
    ///
    /// Blocks until the results channel has closed, which needs the utility
    /// to produce a line, exit, or fail after a quit signal.
    pub fn join(mut self) -> Result<(), CollectorError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                CollectorError::SubprocessTerminated("stats aggregator thread panicked".to_string())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for StatsSession {
    fn drop(&mut self) {
        // Not joined: the source may be blocked on a read for a while yet.
        if self.handle.is_some() {
            let _ = self.quit.send(());
        }
    }
}
