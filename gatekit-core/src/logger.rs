//! Routes `log` records from the engine to a host-provided sink.
//!
//! The core crate only emits through the `log` facade. A host (the CLI, a
//! daemon, a bot process) installs a [`Logger`] once with [`set_logger`] and
//! receives every record as a `(LogLevel, String)` pair. Debug and trace
//! records from dependencies are dropped so hosts are not flooded by
//! `rusqlite` internals.

use std::sync::{Arc, OnceLock};

/// A sink for engine log records.
///
/// ```rust
/// use gatekit_core::logger::{LogLevel, Logger};
///
/// struct Stderr;
///
/// impl Logger for Stderr {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Receives one formatted record.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging detail, such as skipped no-op writes.
    Debug,
    /// Normal progress: provisions, revokes, materialized documents.
    Info,
    /// Recoverable anomalies, such as orphaned access entries.
    Warn,
    /// Failures surfaced to the caller.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        is_forwarded(metadata.level(), metadata.target())
    }

    fn log(&self, record: &log::Record) {
        let module = record.module_path().unwrap_or_else(|| record.target());
        if !is_forwarded(record.level(), module) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("gatekit logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace records are only forwarded when they come from this
/// workspace.
fn is_forwarded(level: log::Level, module: &str) -> bool {
    level <= log::Level::Info || module.starts_with("gatekit")
}

static SINK: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the process-wide sink.
///
/// Only the first call takes effect; later calls log a warning through the
/// already installed sink and return.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if SINK.set(logger).is_err() {
        log::warn!("gatekit logger already set, ignoring replacement");
        return;
    }
    static FORWARDER: ForwardingLogger = ForwardingLogger;
    if let Err(err) = log::set_logger(&FORWARDER) {
        eprintln!("failed to install gatekit logger: {err}");
        return;
    }
    log::set_max_level(log::LevelFilter::Trace);
}
