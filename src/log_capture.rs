//! Log capture for routing scheduler logs into the run report.
//!
//! [`TeeLogger`] forwards every record to the wrapped `env_logger` and keeps a copy of
//! the records emitted by the scheduler core (`moonblokz_channel_scheduler::chan`) in a
//! bounded buffer, stamped with the virtual time. The simulation drains the buffer when
//! it writes its report.

use embassy_time::Instant;
use log::{Level, Log, Metadata, Record};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Maximum number of log entries to buffer before they're consumed.
const LOG_BUFFER_CAPACITY: usize = 10000;

const CORE_MODULE: &str = "moonblokz_channel_scheduler::chan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A captured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedLogEntry {
    /// Virtual time in microseconds.
    pub at_us: u64,
    /// Scheduler submodule that emitted the record, e.g. `switch`.
    pub module: String,
    pub level: LogLevel,
    pub content: String,
}

/// Global buffer for captured log entries.
static CAPTURED_LOGS: Mutex<Option<VecDeque<CapturedLogEntry>>> = Mutex::new(None);

/// Initialize the log capture buffer.
pub fn init_log_capture() {
    if let Ok(mut guard) = CAPTURED_LOGS.lock() {
        *guard = Some(VecDeque::with_capacity(LOG_BUFFER_CAPACITY));
    }
}

/// Drain all captured log entries from the buffer.
pub fn drain_captured_logs() -> Vec<CapturedLogEntry> {
    match CAPTURED_LOGS.lock() {
        Ok(mut guard) => guard.as_mut().map(|buffer| buffer.drain(..).collect()).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn push_log_entry(entry: CapturedLogEntry) {
    let Ok(mut guard) = CAPTURED_LOGS.lock() else {
        return;
    };
    if let Some(buffer) = guard.as_mut() {
        if buffer.len() >= LOG_BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }
}

/// Submodule of the scheduler core a module path belongs to.
///
/// Returns `Some("")` for the core's root module and `None` outside the core.
fn core_submodule(module_path: &str) -> Option<&str> {
    let rest = module_path.strip_prefix(CORE_MODULE)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix("::")
}

fn convert_level(level: Level) -> LogLevel {
    match level {
        Level::Error => LogLevel::Error,
        Level::Warn => LogLevel::Warn,
        Level::Info => LogLevel::Info,
        Level::Debug => LogLevel::Debug,
        Level::Trace => LogLevel::Trace,
    }
}

/// A tee logger that forwards to the wrapped logger and captures scheduler logs.
pub struct TeeLogger {
    inner: env_logger::Logger,
}

impl TeeLogger {
    pub fn new(inner: env_logger::Logger) -> Self {
        Self { inner }
    }

    /// Get the maximum log level filter from the inner logger.
    pub fn filter(&self) -> log::LevelFilter {
        self.inner.filter()
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.inner.log(record);

        if !self.inner.matches(record) {
            return;
        }
        if let Some(module) = record.module_path().and_then(core_submodule) {
            push_log_entry(CapturedLogEntry {
                at_us: Instant::now().as_micros(),
                module: module.to_string(),
                level: convert_level(record.level()),
                content: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
