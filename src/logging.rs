//! Logging capability injected into the relay pipeline.
//!
//! Every soft failure (bad descriptor, unreadable database, rejected upload)
//! is reported through an [`EventLog`] rather than returned to the caller.
//! Hosts pick the sink: the CLI forwards to `tracing`, tests collect entries
//! in memory.

use anyhow::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Success,
    Info,
    Default,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Success => "SUCCESS",
            Level::Info => "INFO",
            Level::Default => "DEFAULT",
        };
        f.write_str(label)
    }
}

/// A sink for pipeline log lines.
pub trait EventLog: Send + Sync {
    fn log(&self, level: Level, message: &str);

    /// Flush and release the sink. Further `log` calls may be ignored.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Forwards entries to the global `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Error => tracing::error!("{message}"),
            Level::Warn => tracing::warn!("{message}"),
            Level::Success => tracing::info!(outcome = "success", "{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Default => tracing::debug!("{message}"),
        }
    }
}

/// Collects entries in memory; used by headless hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(Level, String)>>,
    closed: Mutex<bool>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(_, m)| m.contains(needle))
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl EventLog for MemoryLog {
    fn log(&self, level: Level, message: &str) {
        if self.is_closed() {
            return;
        }
        self.entries.lock().push((level, message.to_string()));
    }

    fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Install the fmt subscriber. Only the first call takes effect.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(level)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_collects_until_closed() {
        let log = MemoryLog::new();
        log.log(Level::Info, "watching /tmp");
        log.log(Level::Error, "upload failed: 500");
        assert_eq!(log.count(Level::Error), 1);
        assert!(log.contains("watching"));

        log.close().unwrap();
        log.log(Level::Info, "dropped");
        assert!(log.is_closed());
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_level_labels() {
        assert_eq!(Level::Success.to_string(), "SUCCESS");
        assert_eq!(Level::Warn.to_string(), "WARN");
    }
}
