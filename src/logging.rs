//! Tracing subscriber setup.
//!
//! Logs normally go to stderr. A front-end that owns the terminal can pass a
//! [`LogBuffer`] instead; formatted lines are then kept in memory for display.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default number of lines kept by [`LogBuffer::default`].
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Bounded, shared buffer of formatted log lines.
///
/// Cloning yields a handle to the same buffer. Once full, the oldest line is
/// dropped for every new one.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Buffer keeping at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    fn push_line(&self, line: &str) {
        let mut lines = self.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buffer: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// Writer for one formatted event; lines are committed on drop.
pub struct LineWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.pending);
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.buffer.push_line(line);
        }
    }
}

/// Filter for the given `-v` count.
///
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): info
/// - 2 (-vv): debug
/// - 3+ (-vvv): trace
pub fn filter_for(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global tracing subscriber.
///
/// With `capture`, output goes into the buffer without ANSI colors; otherwise
/// to stderr.
pub fn init_tracing(verbose: u8, capture: Option<LogBuffer>) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(filter_for(verbose));

    match capture {
        Some(buffer) => registry
            .with(fmt::layer().with_ansi(false).with_target(false).with_writer(buffer))
            .try_init(),
        None => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init(),
    }
}
