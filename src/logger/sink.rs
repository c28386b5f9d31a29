//! Log sink trait and the in-process sink implementations.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of a log event, ordered from least to most verbose.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn tracing_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Whether an event at `level` passes a threshold of `self`.
    #[must_use]
    pub fn allows(self, level: Self) -> bool {
        level <= self
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Accepts the names (`warn` as an alias) or the numeric verbosity `0..=3`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "error" => Ok(Self::Error),
            "1" | "warning" | "warn" => Ok(Self::Warning),
            "2" | "info" => Ok(Self::Info),
            "3" | "debug" => Ok(Self::Debug),
            other => Err(format!(
                "unknown log level {other:?} (expected 0-3 or error|warning|info|debug)"
            )),
        }
    }
}

/// One leveled, human-readable log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Environment root the event is about, when there is one.
    pub environment: Option<PathBuf>,
    /// Raw package line the event is about, when there is one.
    pub package: Option<String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            environment: None,
            package: None,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, root: &Path) -> Self {
        self.environment = Some(root.to_path_buf());
        self
    }

    #[must_use]
    pub fn with_package(mut self, line: &str) -> Self {
        self.package = Some(line.to_string());
        self
    }
}

/// Destination for log events. Purely observational: sinks never influence
/// control flow and must not fail loudly.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &LogEvent);

    fn log(&self, level: LogLevel, message: &str) {
        self.emit(&LogEvent::new(level, message));
    }
}

impl<S: LogSink + ?Sized> LogSink for &S {
    fn emit(&self, event: &LogEvent) {
        (**self).emit(event);
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn emit(&self, event: &LogEvent) {
        (**self).emit(event);
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn emit(&self, event: &LogEvent) {
        (**self).emit(event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: &LogEvent) {}
}

/// Forwards events to `tracing` under the `envsweep` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let message = event.message.as_str();
        match event.level {
            LogLevel::Error => tracing::error!(target: "envsweep", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "envsweep", "{message}"),
            LogLevel::Info => tracing::info!(target: "envsweep", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "envsweep", "{message}"),
        }
    }
}

/// Drops events more verbose than `threshold` before passing them on.
pub struct LevelFilterSink<S> {
    threshold: LogLevel,
    inner: S,
}

impl<S: LogSink> LevelFilterSink<S> {
    pub fn new(threshold: LogLevel, inner: S) -> Self {
        Self { threshold, inner }
    }
}

impl<S: LogSink> LogSink for LevelFilterSink<S> {
    fn emit(&self, event: &LogEvent) {
        if self.threshold.allows(event.level) {
            self.inner.emit(event);
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: impl LogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for FanoutSink {
    fn emit(&self, event: &LogEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory. Used by tests and by embedders that want to
/// inspect what a sweep reported.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events at exactly `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Info.allows(LogLevel::Warning));
        assert!(!LogLevel::Warning.allows(LogLevel::Debug));
    }

    #[test]
    fn parses_numeric_and_named_levels() {
        assert_eq!("0".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("1".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("3".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("4".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn level_serializes_lowercase() {
        let json = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn recording_sink_counts_by_level() {
        let sink = RecordingSink::new();
        sink.log(LogLevel::Warning, "a");
        sink.log(LogLevel::Warning, "b");
        sink.log(LogLevel::Info, "c");
        assert_eq!(sink.count(LogLevel::Warning), 2);
        assert_eq!(sink.count(LogLevel::Info), 1);
        assert_eq!(sink.messages(LogLevel::Info), vec!["c".to_string()]);
    }

    #[test]
    fn level_filter_drops_verbose_events() {
        let recorder = Arc::new(RecordingSink::new());
        let filtered = LevelFilterSink::new(LogLevel::Warning, Arc::clone(&recorder));
        filtered.log(LogLevel::Debug, "noise");
        filtered.log(LogLevel::Info, "chatter");
        filtered.log(LogLevel::Error, "boom");
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(recorder.events()[0].message, "boom");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new().with(Arc::clone(&a)).with(Arc::clone(&b));
        assert_eq!(fanout.len(), 2);
        fanout.emit(&LogEvent::new(LogLevel::Info, "hello").with_package("x==1"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events()[0].package.as_deref(), Some("x==1"));
    }
}
