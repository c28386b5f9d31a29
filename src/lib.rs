#![forbid(unsafe_code)]

//! envsweep: find every virtual environment on a machine and check what is
//! installed in it against a list of disallowed packages.
//!
//! A sweep has four stages:
//! 1. **Rules**: resolve the disallowed names from the built-in list or a
//!    list file, then apply ordered `name` / `!name` adjustments
//! 2. **Locator**: walk the volume roots in parallel, reporting every
//!    directory that contains the environment marker (`bin/python`)
//! 3. **Inventory**: run the environment's package manager (`bin/pip freeze`)
//! 4. **Aggregation**: match each inventory and fold the outcomes into a
//!    [`ScanReport`](scanner::aggregator::ScanReport)
//!
//! # Library usage
//!
//! ```rust,no_run
//! use envsweep::prelude::*;
//!
//! let mut config = Config::load(None)?;
//! config.finalize()?;
//! let sink = TracingSink;
//! let rules = RuleSetResolver::new(&sink).resolve()?;
//! let report = ScanAggregator::new(config.scan_plan()?, &sink).run(&rules);
//! println!("matched={} unreachable={}", report.total_matched, report.total_unreachable);
//! # Ok::<(), EnvsweepError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod rules;
pub mod scanner;
