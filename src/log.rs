//! Log records emitted by the pool
//!
//! Every record goes to `tracing`. When a [`LogSink`] is configured it
//! receives the same record as `(level, message)`.

use std::fmt;

/// Severity of a pool log record.
///
/// The numeric values follow the `(level, message...)` convention used by
/// log callbacks: 0 is the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Resource failures, close failures
    Error = 0,
    /// Lifecycle transitions worth noticing
    Info = 1,
    /// Bookkeeping detail
    Debug = 2,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => f.write_str("error"),
            LogLevel::Info => f.write_str("info"),
            LogLevel::Debug => f.write_str("debug"),
        }
    }
}

/// Receiver for pool log records.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{LogLevel, PoolConfiguration};
/// use std::sync::Arc;
///
/// let config = PoolConfiguration::new()
///     .with_log_sink(Arc::new(|level: LogLevel, message: &str| {
///         eprintln!("[{level}] {message}");
///     }));
/// assert!(config.log_sink.is_some());
/// ```
pub trait LogSink: Send + Sync + 'static {
    /// Receive one record
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync + 'static,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

pub(crate) fn emit(sink: Option<&dyn LogSink>, level: LogLevel, args: fmt::Arguments<'_>) {
    match level {
        LogLevel::Error => tracing::error!("{}", args),
        LogLevel::Info => tracing::info!("{}", args),
        LogLevel::Debug => tracing::debug!("{}", args),
    }

    if let Some(sink) = sink {
        sink.log(level, &args.to_string());
    }
}
