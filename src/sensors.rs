use crossbeam::atomic::AtomicCell;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::SerialConfig;
use crate::error::Result;
use crate::parser::parse_line;
use crate::types::Sample;

/// Simulated axes are drawn uniformly from `[-SIM_AMPLITUDE, SIM_AMPLITUDE)`.
pub const SIM_AMPLITUDE: f64 = 50.0;

/// Where the refresh loop pulls its next sample from.
pub trait SampleSource: Send {
    fn name(&self) -> &'static str;

    /// Sample for the current tick.
    fn next_sample(&mut self) -> Sample;

    /// Angle in radians for the compass needle.
    fn needle_angle(&self, sample: &Sample, heading: f64) -> f64;

    /// False once the source can no longer deliver fresh readings.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Most recent reading from the serial worker.
///
/// Stores and loads move whole samples, so the refresh loop never sees a
/// mix of two readings. There is no freshness guarantee: consecutive loads
/// may repeat a value or skip several.
#[derive(Clone)]
pub struct LatestReading {
    cell: Arc<AtomicCell<Sample>>,
    reader_alive: Arc<AtomicBool>,
}

impl LatestReading {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(AtomicCell::new(Sample::default())),
            reader_alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self, sample: Sample) {
        self.cell.store(sample);
    }

    pub fn load(&self) -> Sample {
        self.cell.load()
    }

    pub fn reader_alive(&self) -> bool {
        self.reader_alive.load(Ordering::Acquire)
    }

    fn set_reader_alive(&self, alive: bool) {
        self.reader_alive.store(alive, Ordering::Release);
    }
}

impl Default for LatestReading {
    fn default() -> Self {
        Self::new()
    }
}

/// Live device variant: every tick renders whatever the worker stored last.
pub struct LiveSource {
    latest: LatestReading,
}

impl LiveSource {
    pub fn new(latest: LatestReading) -> Self {
        Self { latest }
    }
}

impl SampleSource for LiveSource {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn next_sample(&mut self) -> Sample {
        self.latest.load()
    }

    fn needle_angle(&self, sample: &Sample, _heading: f64) -> f64 {
        sample.y.atan2(sample.x)
    }

    fn is_healthy(&self) -> bool {
        self.latest.reader_alive()
    }
}

/// Random field generator used when no device is attached.
pub struct Simulator {
    rng: StdRng,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn next_sample(&mut self) -> Sample {
        Sample::new(
            self.rng.gen_range(-SIM_AMPLITUDE..SIM_AMPLITUDE),
            self.rng.gen_range(-SIM_AMPLITUDE..SIM_AMPLITUDE),
            self.rng.gen_range(-SIM_AMPLITUDE..SIM_AMPLITUDE),
        )
    }

    fn needle_angle(&self, _sample: &Sample, heading: f64) -> f64 {
        heading.to_radians()
    }
}

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 256;

/// Feed every parsed line into `latest` until EOF or a transport error.
///
/// Read timeouts are not errors: a partially received line stays buffered
/// and reading resumes. A line that outgrows [`MAX_LINE_BYTES`] is dropped
/// up to its next newline, so a device that never terminates its output
/// cannot grow the buffer. Returns the number of accepted samples at EOF.
pub fn read_samples<R: BufRead>(mut reader: R, latest: &LatestReading) -> std::io::Result<u64> {
    let mut line = Vec::with_capacity(MAX_LINE_BYTES);
    let mut discarding = false;
    let mut accepted = 0u64;

    loop {
        let budget = (MAX_LINE_BYTES - line.len()) as u64;
        match reader.by_ref().take(budget).read_until(b'\n', &mut line) {
            Ok(0) => return Ok(accepted),
            Ok(_) => {
                if line.len() >= MAX_LINE_BYTES && !line.ends_with(b"\n") {
                    log::trace!("[serial] dropped {} bytes without a line ending", line.len());
                    discarding = true;
                    line.clear();
                    continue;
                }

                if discarding {
                    // Tail of an oversized line
                    discarding = false;
                } else {
                    let text = std::str::from_utf8(&line)
                        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
                    match parse_line(text) {
                        Some(sample) => {
                            latest.store(sample);
                            accepted += 1;
                            if accepted % 100 == 0 {
                                log::debug!("[serial] {} samples", accepted);
                            }
                        }
                        None => log::trace!("[serial] discarded line {:?}", text.trim_end()),
                    }
                }
                line.clear();
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Start the background serial worker.
///
/// The port is opened on the worker thread. Any transport failure (open,
/// I/O, invalid UTF-8) is logged and ends the worker; `latest` then keeps its
/// last value and reports the reader as dead. There is no retry.
pub fn spawn_serial_reader(config: SerialConfig, latest: LatestReading) -> Result<JoinHandle<()>> {
    latest.set_reader_alive(true);
    let worker_latest = latest.clone();
    let handle = thread::Builder::new()
        .name("serial-reader".to_string())
        .spawn(move || {
            log::info!(
                "[serial] Reading {} at {} baud",
                config.port,
                config.baud_rate
            );
            match run_serial_reader(&config, &worker_latest) {
                Ok(accepted) => {
                    log::warn!("[serial] Stream closed after {} samples", accepted)
                }
                Err(e) => log::error!("[serial] Serial read error: {}", e),
            }
            worker_latest.set_reader_alive(false);
        });

    match handle {
        Ok(handle) => Ok(handle),
        Err(e) => {
            latest.set_reader_alive(false);
            Err(e.into())
        }
    }
}

fn run_serial_reader(config: &SerialConfig, latest: &LatestReading) -> Result<u64> {
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout())
        .open()?;
    Ok(read_samples(BufReader::new(port), latest)?)
}
