//! JSONL audit log: append-only line-delimited JSON, one object per event.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a partial record. Rotation happens when
//! the file would exceed `max_size_bytes`.
//!
//! Degradation chain:
//! 1. Configured file path
//! 2. stderr with `[ESW-JSONL]` prefix
//! 3. Silent discard (a sweep must never fail because of its audit log)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{EnvsweepError, Result};
use crate::logger::sink::{LogEvent, LogLevel, LogSink};

/// A single JSONL record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlRecord {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl JsonlRecord {
    /// Stamp an event with the current UTC time.
    pub fn from_event(event: &LogEvent) -> Self {
        Self {
            ts: format_utc_now(),
            level: event.level,
            message: event.message.clone(),
            environment: event
                .environment
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            package: event.package.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Maximum file size before rotation (bytes). Default: 16 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Append-only JSONL writer with rotation and stderr fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log file, falling back to stderr if it cannot be opened.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        match open_append(&w.config.path) {
            Ok((file, size)) => {
                w.writer = Some(BufWriter::new(file));
                w.state = WriterState::Normal;
                w.bytes_written = size;
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[ESW-JSONL] {e}; writing audit log to stderr");
                w.state = WriterState::Stderr;
            }
        }
        w
    }

    pub fn write_record(&mut self, record: &JsonlRecord) {
        let line = match serde_json::to_string(record) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[ESW-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                let Some(w) = self.writer.as_mut() else {
                    self.degrade();
                    self.write_line(line);
                    return;
                };
                if w.write_all(line.as_bytes()).is_err() {
                    self.degrade();
                    self.write_line(line);
                    return;
                }
                self.bytes_written += line.len() as u64;
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[ESW-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => WriterState::Stderr,
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;

        let base = self.config.path.clone();
        // .N-1 → .N, …, .1 → .2, current → .1
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// [`LogSink`] adapter over a shared [`JsonlWriter`].
pub struct JsonlSink {
    writer: Mutex<JsonlWriter>,
}

impl JsonlSink {
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            writer: Mutex::new(JsonlWriter::open(config)),
        }
    }

    pub fn flush(&self) {
        self.writer.lock().flush();
    }
}

impl LogSink for JsonlSink {
    fn emit(&self, event: &LogEvent) {
        self.writer.lock().write_record(&JsonlRecord::from_event(event));
    }
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| EnvsweepError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| EnvsweepError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `audit.jsonl` → `audit.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
