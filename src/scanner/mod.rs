//! Environment scanner: marker patterns, parallel locator, inventory
//! extraction, matching and aggregation.

pub mod aggregator;
pub mod inventory;
pub mod locator;
pub mod marker;
pub mod matcher;
