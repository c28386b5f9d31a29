//! Compliance rule sets: which canonical package names are disallowed.

pub mod resolver;

use std::collections::BTreeSet;

use serde::Serialize;

pub use resolver::{RuleSetResolver, parse_rule_list, resolve};

/// Separator between a package name and its version in inventory lines.
pub const VERSION_SEPARATOR: &str = "==";

/// Names flagged when no package list file is given: typosquats of popular
/// packages published to PyPI in 2017 (SK-CSIRT advisory 20170909).
pub const DEFAULT_BLOCKED_PACKAGES: &[&str] = &[
    "acqusition",
    "apidev-coop",
    "bzip",
    "crypt",
    "django-server",
    "pwd",
    "setup-tools",
    "telnet",
    "urlib3",
    "urllib",
];

/// Text before the first version separator, or the whole line.
pub fn canonical_name(line: &str) -> &str {
    line.split_once(VERSION_SEPARATOR)
        .map_or(line, |(name, _)| name)
}

/// Resolved, immutable set of disallowed canonical package names.
///
/// Names are case-sensitive and never contain [`VERSION_SEPARATOR`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleSet {
    names: BTreeSet<String>,
}

impl RuleSet {
    /// The built-in default list.
    pub fn default_blocked() -> Self {
        DEFAULT_BLOCKED_PACKAGES.iter().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub(crate) fn from_names(names: BTreeSet<String>) -> Self {
        debug_assert!(names.iter().all(|n| !n.contains(VERSION_SEPARATOR)));
        Self { names }
    }
}

impl<'a> FromIterator<&'a str> for RuleSet {
    /// Collects canonical names; any version suffix is dropped.
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self::from_names(
            iter.into_iter()
                .map(|n| canonical_name(n).to_string())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_strips_version() {
        assert_eq!(canonical_name("foo==1.2.3"), "foo");
        assert_eq!(canonical_name("foo"), "foo");
        assert_eq!(canonical_name("foo==1==2"), "foo");
        assert_eq!(canonical_name("==1.0"), "");
    }

    #[test]
    fn default_list_has_ten_names() {
        let rules = RuleSet::default_blocked();
        assert_eq!(rules.len(), 10);
        assert!(rules.contains("urllib"));
        assert!(rules.contains("setup-tools"));
        assert!(!rules.contains("requests"));
    }

    #[test]
    fn collected_names_never_carry_versions() {
        let rules: RuleSet = ["bad==1.0", "worse"].into_iter().collect();
        assert!(rules.contains("bad"));
        assert!(rules.iter().all(|n| !n.contains(VERSION_SEPARATOR)));
    }

    #[test]
    fn serializes_as_sorted_array() {
        let rules: RuleSet = ["zeta", "alpha"].into_iter().collect();
        assert_eq!(serde_json::to_string(&rules).unwrap(), r#"["alpha","zeta"]"#);
    }
}
