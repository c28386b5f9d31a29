//! Marker patterns: the relative path whose presence identifies an environment.
//!
//! A marker such as `bin/python` matches any walked path ending in those
//! components. Shell-style globs are accepted within the marker:
//! - `**` matches any number of path components
//! - `*` matches anything except `/`
//! - `?` matches a single character except `/`

#![allow(missing_docs)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::errors::{EnvsweepError, Result};
use crate::core::paths::{normalize_syntactic, slash_path};

/// Compiled marker pattern.
#[derive(Debug, Clone)]
pub struct MarkerPattern {
    as_written: String,
    compiled: Regex,
    /// Final component when it contains no glob syntax, for a cheap
    /// per-entry prefilter.
    literal_name: Option<String>,
}

impl MarkerPattern {
    /// Compile a relative marker path. Backslashes are treated as separators.
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.trim().replace('\\', "/");
        let normalized = normalized.trim_start_matches("./").trim_end_matches('/');
        if normalized.is_empty() {
            return Err(invalid(pattern, "marker must not be empty"));
        }
        if normalized.starts_with('/') || normalized.contains(':') {
            return Err(invalid(pattern, "marker must be a relative path"));
        }
        if normalized.split('/').any(|c| c == "..") {
            return Err(invalid(pattern, "marker must not contain `..`"));
        }

        let regex_str = format!("(?s)^(?P<root>.*)/(?:{})$", glob_to_regex_body(normalized));
        let compiled = Regex::new(&regex_str).map_err(|err| invalid(pattern, &err.to_string()))?;
        let last = normalized.rsplit('/').next().unwrap_or(normalized);
        let literal_name = (!last.contains(['*', '?'])).then(|| last.to_string());
        Ok(Self {
            as_written: normalized.to_string(),
            compiled,
            literal_name,
        })
    }

    /// Quick reject on the entry's file name before the full path match.
    pub fn may_match_name(&self, name: &OsStr) -> bool {
        self.literal_name
            .as_deref()
            .is_none_or(|literal| name.to_string_lossy() == literal)
    }

    pub fn as_str(&self) -> &str {
        &self.as_written
    }

    /// If `path` ends with the marker, return the environment root: `path`
    /// with the marker components removed, syntactically normalized.
    pub fn environment_root(&self, path: &Path) -> Option<PathBuf> {
        let text = slash_path(path);
        let caps = self.compiled.captures(&text)?;
        let root_len = caps.name("root").map_or(0, |m| m.len());
        let suffix = &text[root_len + 1..];
        let depth = suffix.split('/').filter(|c| !c.is_empty()).count();
        let root = path.ancestors().nth(depth)?;
        if root.as_os_str().is_empty() {
            return Some(PathBuf::from("."));
        }
        Some(normalize_syntactic(root))
    }
}

fn invalid(pattern: &str, details: &str) -> EnvsweepError {
    EnvsweepError::InvalidMarker {
        pattern: pattern.to_string(),
        details: details.to_string(),
    }
}

/// Convert a shell-style glob to an unanchored regex body.
fn glob_to_regex_body(pattern: &str) -> String {
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            c => {
                regex_str.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    regex_str
}
