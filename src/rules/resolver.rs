//! Rule set resolution: base list, optional list file, ordered adjustments.
//!
//! Adjustments are applied strictly in the order given. A leading `!` removes
//! a name, anything else adds one, so `["!x", "x"]` and `["x", "!x"]` have
//! opposite net effects.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{EnvsweepError, Result};
use crate::logger::{LogLevel, LogSink};
use crate::rules::{RuleSet, VERSION_SEPARATOR, canonical_name};

/// Prefix marking an adjustment as a removal.
pub const NEGATION_PREFIX: char = '!';

/// Names from a rule list file: one per line, trimmed; blank lines and lines
/// whose trimmed form starts with `#` are dropped. Order is preserved.
pub fn parse_rule_list(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Resolve the effective rule set.
///
/// Fails only when `override_file` is given and cannot be read as UTF-8 text.
/// Every other irregularity is a warning on `sink`.
pub fn resolve(
    default_list: &RuleSet,
    override_file: Option<&Path>,
    adjustments: &[String],
    sink: &dyn LogSink,
) -> Result<RuleSet> {
    let mut working: BTreeSet<String> = match override_file {
        Some(path) => {
            let contents = read_rule_list(path)?;
            parse_rule_list(&contents)
                .into_iter()
                .filter_map(|name| canonicalize(name, sink))
                .collect()
        }
        None => default_list.iter().map(str::to_string).collect(),
    };

    for adjustment in adjustments {
        apply_adjustment(&mut working, adjustment, sink);
    }

    let rules = RuleSet::from_names(working);
    sink.log(
        LogLevel::Debug,
        &format!(
            "check_packages : {:?}",
            rules.iter().collect::<Vec<_>>()
        ),
    );
    Ok(rules)
}

fn read_rule_list(path: &Path) -> Result<String> {
    let unreadable = |details: String| EnvsweepError::RuleListUnreadable {
        path: path.to_path_buf(),
        details,
    };
    if !path.is_file() {
        return Err(unreadable("not an existing regular file".to_string()));
    }
    fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))
}

fn apply_adjustment(working: &mut BTreeSet<String>, raw: &str, sink: &dyn LogSink) {
    if let Some(rest) = raw.strip_prefix(NEGATION_PREFIX) {
        let name = canonical_name(rest.trim());
        if !working.remove(name) {
            sink.log(
                LogLevel::Warning,
                &format!(
                    "Trying to remove package from checklist, which is not on the list: {raw}"
                ),
            );
        }
        return;
    }

    if let Some(name) = canonicalize(raw.trim(), sink) {
        working.insert(name);
    }
}

/// Strip any version suffix from a rule name, warning when one was present.
/// `None`, with a warning, when nothing of the name is left.
fn canonicalize(name: &str, sink: &dyn LogSink) -> Option<String> {
    let canonical = canonical_name(name).trim_end();
    if canonical.is_empty() {
        sink.log(
            LogLevel::Warning,
            &format!("Ignoring empty package name {name:?}"),
        );
        return None;
    }
    if canonical.len() != name.len() {
        sink.log(
            LogLevel::Warning,
            &format!(
                "Rule {name:?} carries a version ({VERSION_SEPARATOR}); \
                 matching on {canonical:?} for all versions"
            ),
        );
    }
    Some(canonical.to_string())
}

/// Builder over [`resolve`] that starts from the built-in default list.
pub struct RuleSetResolver<'a> {
    default_list: RuleSet,
    override_file: Option<PathBuf>,
    adjustments: Vec<String>,
    sink: &'a dyn LogSink,
}

impl<'a> RuleSetResolver<'a> {
    pub fn new(sink: &'a dyn LogSink) -> Self {
        Self {
            default_list: RuleSet::default_blocked(),
            override_file: None,
            adjustments: Vec::new(),
            sink,
        }
    }

    #[must_use]
    pub fn default_list(mut self, rules: RuleSet) -> Self {
        self.default_list = rules;
        self
    }

    #[must_use]
    pub fn override_file(mut self, path: Option<PathBuf>) -> Self {
        self.override_file = path;
        self
    }

    #[must_use]
    pub fn adjustments(mut self, adjustments: Vec<String>) -> Self {
        self.adjustments = adjustments;
        self
    }

    pub fn resolve(&self) -> Result<RuleSet> {
        resolve(
            &self.default_list,
            self.override_file.as_deref(),
            &self.adjustments,
            self.sink,
        )
    }
}
