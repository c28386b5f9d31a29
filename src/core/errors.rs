//! ESW-prefixed error types with structured error codes.
//!
//! Only configuration-time failures are errors. Per-environment failures
//! (missing manager, failed invocation) are reported as
//! [`InventoryStatus`](crate::scanner::inventory::InventoryStatus) values and
//! never abort a sweep.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, EnvsweepError>;

/// Top-level error type for envsweep.
#[derive(Debug, Error)]
pub enum EnvsweepError {
    #[error("[ESW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ESW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ESW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ESW-1101] package list not readable: {path}: {details}")]
    RuleListUnreadable { path: PathBuf, details: String },

    #[error("[ESW-1201] invalid marker pattern {pattern:?}: {details}")]
    InvalidMarker { pattern: String, details: String },

    #[error("[ESW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ESW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EnvsweepError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ESW-1001",
            Self::MissingConfig { .. } => "ESW-1002",
            Self::ConfigParse { .. } => "ESW-1003",
            Self::RuleListUnreadable { .. } => "ESW-1101",
            Self::InvalidMarker { .. } => "ESW-1201",
            Self::Serialization { .. } => "ESW-2101",
            Self::Io { .. } => "ESW-3002",
        }
    }

    /// Whether the error happened while assembling configuration, before any
    /// scanning started.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::RuleListUnreadable { .. }
                | Self::InvalidMarker { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for EnvsweepError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for EnvsweepError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
