//! Leveled log events and the sinks that receive them.
//!
//! The scan pipeline only ever talks to a [`LogSink`]. The binary wires a
//! [`TracingSink`] (stderr via `tracing-subscriber`) and, optionally, a
//! [`JsonlSink`] audit trail behind a [`FanoutSink`].

pub mod jsonl;
pub mod sink;

pub use jsonl::{JsonlConfig, JsonlSink, JsonlWriter};
pub use sink::{
    FanoutSink, LevelFilterSink, LogEvent, LogLevel, LogSink, NullSink, RecordingSink, TracingSink,
};
