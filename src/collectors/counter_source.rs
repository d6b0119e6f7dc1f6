use crate::error::CollectorError;
use crate::samples::RawRecord;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Flag that sets the sampling interval of the counter utility
pub const INTERVAL_FLAG: &str = "-si";

/// Lines printed by the counter utility before the first sample: a blank
/// line followed by the CSV column header
const PREAMBLE_LINES: usize = 2;

/// Counter source backed by a performance counter utility
///
/// Launches the utility (`TypePerf` by default) for a fixed set of counters
/// and forwards each line of its CSV output, split on commas, to a channel.
/// The source owns the subprocess for its whole life and kills it on every
/// exit path.
///
/// Cancellation is checked around every read. A read blocked on a hung
/// utility cannot be interrupted, so a quit signal only takes effect once the
/// next line (or end of stream) arrives.
#[derive(Debug, Clone)]
pub struct CounterSource {
    /// Sampling utility to launch
    program: String,
    /// Counter identifiers, in the order their values appear in each record
    counters: Vec<String>,
    /// Whole seconds between samples
    interval_seconds: u64,
}

impl CounterSource {
    /// Create a new CounterSource
    ///
    /// # Arguments
    ///
    /// * `program` - Utility to launch (e.g. "TypePerf")
    /// * `counters` - Counter identifiers passed to the utility, in order
    /// * `interval_seconds` - Whole seconds between samples
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::mpsc;
    /// use sysstats::collectors::CounterSource;
    ///
    /// let (records_tx, records_rx) = mpsc::sync_channel(5);
    /// let (quit_tx, quit_rx) = mpsc::channel();
    /// let source = CounterSource::new(
    ///     "TypePerf",
    ///     vec![r"\Processor(_Total)\% Processor Time".to_string()],
    ///     1,
    /// );
    /// let handle = source.spawn(records_tx, quit_rx);
    /// ```
    pub fn new(program: impl Into<String>, counters: Vec<String>, interval_seconds: u64) -> Self {
        Self {
            program: program.into(),
            counters,
            interval_seconds,
        }
    }

    /// Arguments passed to the utility: the counters, then the interval flag
    /// and the interval in whole seconds
    pub fn args(&self) -> Vec<String> {
        let mut args = self.counters.clone();
        args.push(INTERVAL_FLAG.to_string());
        args.push(self.interval_seconds.to_string());
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }

    /// Run the source on a background thread
    ///
    /// The thread exits, dropping `sink`, once the utility fails to start,
    /// its output ends, a quit signal is seen, or the receiving end of `sink`
    /// goes away.
    pub fn spawn(self, sink: SyncSender<RawRecord>, quit: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || self.run(sink, quit))
    }

    /// Run the source on the current thread until the session ends
    ///
    /// `sink` is closed when this returns, whatever the reason. Failures are
    /// logged here and not retried.
    pub fn run(&self, sink: SyncSender<RawRecord>, quit: Receiver<()>) {
        info!(
            "Starting {} for {} counters at {}s interval",
            self.program,
            self.counters.len(),
            self.interval_seconds
        );

        let (process, stdout) = match self.launch() {
            Ok(launched) => launched,
            Err(e) => {
                error!("Failed to start {}: {}", self.program, e);
                return;
            }
        };

        match Self::pump_records(BufReader::new(stdout), &sink, &quit) {
            Ok(forwarded) => {
                debug!("{} stopped after {} records", self.program, forwarded);
            }
            Err(e) => {
                error!("Read error from {}: {}", self.program, e);
            }
        }

        // Kill before `sink` closes so the consumer never sees a live child.
        drop(process);
        info!("Counter source for {} finished", self.program);
    }

    /// Spawn the utility and take its stdout
    fn launch(&self) -> Result<(SampleProcess, ChildStdout), CollectorError> {
        debug!("Spawning {} {:?}", self.program, self.args());

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| CollectorError::SubprocessSpawn(format!("{}: {}", self.program, e)))?;
        let stdout = child.stdout.take();
        let process = SampleProcess { child };

        let stdout = stdout.ok_or_else(|| {
            CollectorError::SubprocessTerminated("stdout was not captured".to_string())
        })?;

        Ok((process, stdout))
    }

    /// Forward records from `reader` to `sink` until told to stop
    ///
    /// Skips the preamble, then checks `quit` before and after each blocking
    /// read, so a line read after a quit signal is never forwarded.
    /// Returns the number of records forwarded when stopped by `quit` or by
    /// the record receiver going away; end of stream is an error.
    pub(crate) fn pump_records<R: BufRead>(
        mut reader: R,
        sink: &SyncSender<RawRecord>,
        quit: &Receiver<()>,
    ) -> Result<usize, CollectorError> {
        let mut buffer = Vec::new();

        for _ in 0..PREAMBLE_LINES {
            buffer.clear();
            reader.read_until(b'\n', &mut buffer)?;
        }

        let mut forwarded = 0;
        loop {
            if quit_requested(quit) {
                return Ok(forwarded);
            }

            buffer.clear();
            reader.read_until(b'\n', &mut buffer)?;
            // A line without its terminator means the stream ended mid-write.
            if buffer.last() != Some(&b'\n') {
                return Err(CollectorError::SubprocessTerminated(
                    "output stream closed".to_string(),
                ));
            }

            // The read may have blocked for a whole interval.
            if quit_requested(quit) {
                return Ok(forwarded);
            }

            let line = String::from_utf8_lossy(&buffer);
            if sink.send(split_record(&line)).is_err() {
                warn!("Record receiver dropped, stopping counter source");
                return Ok(forwarded);
            }
            forwarded += 1;
        }
    }
}

fn quit_requested(quit: &Receiver<()>) -> bool {
    match quit.try_recv() {
        Ok(()) => {
            debug!("Stopping counter source due to quit signal");
            true
        }
        Err(TryRecvError::Disconnected) => {
            debug!("Quit channel closed, stopping counter source");
            true
        }
        Err(TryRecvError::Empty) => false,
    }
}

/// Split one line of utility output into its raw fields
///
/// Strips the line terminator and splits on commas. Field contents are left
/// untouched, quotes included.
pub fn split_record(line: &str) -> RawRecord {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split(',').map(str::to_string).collect()
}

/// Running sampling utility, killed and reaped when dropped
struct SampleProcess {
    child: Child,
}

impl Drop for SampleProcess {
    fn drop(&mut self) {
        debug!("Killing sampling subprocess {}", self.child.id());
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill sampling subprocess: {}", e);
        }
        let _ = self.child.wait();
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_split_record_preserves_fields(fields: Vec<String>) -> bool {
        let fields: Vec<String> = fields
            .into_iter()
            .map(|f| f.replace([',', '\r', '\n'], ""))
            .collect();
        if fields.is_empty() {
            return true;
        }

        let line = format!("{}\r\n", fields.join(","));
        split_record(&line) == fields
    }

    #[quickcheck]
    fn prop_field_count_is_commas_plus_one(line: String) -> bool {
        let line = line.replace(['\r', '\n'], "");
        let commas = line.matches(',').count();
        split_record(&format!("{}\r\n", line)).len() == commas + 1
    }
}
