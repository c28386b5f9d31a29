//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use envsweep::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{EnvsweepError, Result};

// Logging
pub use crate::logger::{
    FanoutSink, JsonlConfig, JsonlSink, LevelFilterSink, LogEvent, LogLevel, LogSink,
    RecordingSink, TracingSink,
};

// Rules
pub use crate::rules::{RuleSet, RuleSetResolver};

// Scanner
pub use crate::scanner::aggregator::{ScanAggregator, ScanPlan, ScanReport};
pub use crate::scanner::inventory::{Inventory, InventoryExtractor, InventoryStatus};
pub use crate::scanner::locator::{EnvironmentCandidate, EnvironmentLocator, LocatorConfig};
pub use crate::scanner::marker::MarkerPattern;
pub use crate::scanner::matcher::{MatchResult, match_inventory};
