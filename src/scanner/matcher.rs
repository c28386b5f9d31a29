//! Match an inventory against the rule set.

use std::path::PathBuf;

use serde::Serialize;

use crate::rules::{RuleSet, canonical_name};
use crate::scanner::inventory::Inventory;

/// Inventory lines whose canonical name is in the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub environment: PathBuf,
    /// Raw lines, in inventory order.
    pub matched_entries: Vec<String>,
}

impl MatchResult {
    pub fn is_clean(&self) -> bool {
        self.matched_entries.is_empty()
    }
}

/// Exact, case-sensitive, version-agnostic. Entries of a failed inventory
/// are matched the same way as those of a successful one.
pub fn match_inventory(inventory: &Inventory, rules: &RuleSet) -> MatchResult {
    MatchResult {
        environment: inventory.environment.root.clone(),
        matched_entries: inventory
            .entries
            .iter()
            .filter(|line| rules.contains(canonical_name(line)))
            .cloned()
            .collect(),
    }
}
