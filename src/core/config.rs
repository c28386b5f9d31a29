//! Configuration system: TOML file + env var overrides + platform defaults.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `ENVSWEEP_*` environment variables, command-line flags (applied by the
//! binary after [`Config::load`]). Nothing is validated until
//! [`Config::finalize`], so a higher layer can still replace a bad value
//! from a lower one.

#![allow(missing_docs)]

use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{EnvsweepError, Result};
use crate::core::paths::{default_volume_root, resolve_absolute_path};
use crate::logger::LogLevel;
use crate::scanner::aggregator::{ScanPlan, default_jobs};
use crate::scanner::inventory::{DEFAULT_MANAGER_ARGS, InventoryExtractor, default_manager_path};
use crate::scanner::locator::LocatorConfig;
use crate::scanner::marker::MarkerPattern;

/// Full envsweep configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Where to look and how to interrogate what is found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub volume_roots: Vec<PathBuf>,
    /// Relative path (globs allowed) whose presence marks an environment root.
    pub marker_pattern: String,
    /// Package manager location relative to an environment root.
    pub manager_path: PathBuf,
    pub manager_args: Vec<String>,
    pub excluded_paths: Vec<PathBuf>,
    pub follow_symlinks: bool,
    pub cross_devices: bool,
    /// Unset walks to unlimited depth.
    pub max_depth: Option<usize>,
    pub walk_parallelism: usize,
    pub jobs: usize,
    /// Unset waits for each manager indefinitely.
    pub invocation_timeout_secs: Option<u64>,
}

/// Which package names are disallowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// Applied in order after the base list; a leading `!` removes a name.
    pub additional_packages: Vec<String>,
    /// Replaces the built-in list when set.
    pub package_list_file: Option<PathBuf>,
}

/// Log verbosity and the optional JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub jsonl_log: Option<PathBuf>,
}

/// Marker identifying an environment on this platform.
pub fn default_marker_pattern() -> String {
    if cfg!(windows) {
        "Scripts/python.exe".to_string()
    } else {
        "bin/python".to_string()
    }
}

fn default_excluded_paths() -> Vec<PathBuf> {
    if cfg!(unix) {
        ["/proc", "/sys", "/dev"].iter().map(PathBuf::from).collect()
    } else {
        Vec::new()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            volume_roots: vec![default_volume_root()],
            marker_pattern: default_marker_pattern(),
            manager_path: default_manager_path(),
            manager_args: DEFAULT_MANAGER_ARGS.iter().map(|a| (*a).to_string()).collect(),
            excluded_paths: default_excluded_paths(),
            follow_symlinks: false,
            cross_devices: true,
            max_depth: None,
            walk_parallelism: 4,
            jobs: default_jobs(),
            invocation_timeout_secs: None,
        }
    }
}

impl Config {
    /// `$HOME/.config/envsweep/config.toml`, when `HOME` is set.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("envsweep")
                .join("config.toml")
        })
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    /// The result is unvalidated; call [`Config::finalize`] once every
    /// override is in.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    /// [`Config::load`] with a custom environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let candidate = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut cfg = match candidate {
            Some(path_buf) if path_buf.is_file() => {
                let raw = fs::read_to_string(&path_buf)
                    .map_err(|source| EnvsweepError::io(&path_buf, source))?;
                let mut parsed: Self = toml::from_str(&raw)?;
                parsed.source = Some(path_buf);
                parsed
            }
            Some(path_buf) if path.is_some() => {
                return Err(EnvsweepError::MissingConfig { path: path_buf });
            }
            _ => Self::default(),
        };

        cfg.apply_env_overrides_from(lookup)?;
        Ok(cfg)
    }

    /// Normalize paths and validate the merged settings.
    pub fn finalize(&mut self) -> Result<()> {
        self.normalize_paths();
        self.validate()
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Compile the marker and assemble locator, extractor and pool size.
    pub fn scan_plan(&self) -> Result<ScanPlan> {
        let scan = &self.scan;
        let marker = MarkerPattern::new(&scan.marker_pattern)?;

        let mut locator = LocatorConfig::new(scan.volume_roots.clone(), marker);
        locator.max_depth = scan.max_depth;
        locator.follow_symlinks = scan.follow_symlinks;
        locator.cross_devices = scan.cross_devices;
        locator.parallelism = scan.walk_parallelism;
        locator.excluded_paths = scan.excluded_paths.iter().cloned().collect();

        let extractor = InventoryExtractor::new(&scan.manager_path)
            .with_args(scan.manager_args.clone())
            .with_timeout(scan.invocation_timeout_secs.map(Duration::from_secs));

        Ok(ScanPlan {
            locator,
            extractor,
            jobs: scan.jobs,
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // scan
        if let Some(raw) = lookup("ENVSWEEP_VOLUME_ROOTS") {
            self.scan.volume_roots = env::split_paths(&raw).collect();
        }
        if let Some(raw) = lookup("ENVSWEEP_MARKER_PATTERN") {
            self.scan.marker_pattern = raw;
        }
        if let Some(raw) = lookup("ENVSWEEP_MANAGER_PATH") {
            self.scan.manager_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ENVSWEEP_MANAGER_ARGS") {
            self.scan.manager_args = raw.split_whitespace().map(str::to_string).collect();
        }
        if let Some(raw) = lookup("ENVSWEEP_EXCLUDED_PATHS") {
            self.scan.excluded_paths = env::split_paths(&raw).collect();
        }
        set_env(&mut lookup, "ENVSWEEP_FOLLOW_SYMLINKS", &mut self.scan.follow_symlinks)?;
        set_env(&mut lookup, "ENVSWEEP_CROSS_DEVICES", &mut self.scan.cross_devices)?;
        if let Some(raw) = lookup("ENVSWEEP_MAX_DEPTH") {
            self.scan.max_depth = Some(parse_env("ENVSWEEP_MAX_DEPTH", &raw)?);
        }
        set_env(&mut lookup, "ENVSWEEP_WALK_PARALLELISM", &mut self.scan.walk_parallelism)?;
        set_env(&mut lookup, "ENVSWEEP_JOBS", &mut self.scan.jobs)?;
        if let Some(raw) = lookup("ENVSWEEP_INVOCATION_TIMEOUT_SECS") {
            self.scan.invocation_timeout_secs =
                Some(parse_env("ENVSWEEP_INVOCATION_TIMEOUT_SECS", &raw)?);
        }

        // rules
        if let Some(raw) = lookup("ENVSWEEP_ADDITIONAL_PACKAGES") {
            self.rules.additional_packages = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("ENVSWEEP_PACKAGE_LIST_FILE") {
            self.rules.package_list_file = Some(PathBuf::from(raw));
        }

        // logging
        if let Some(raw) = lookup("ENVSWEEP_LOG_LEVEL") {
            self.logging.level = raw.parse().map_err(|details| EnvsweepError::ConfigParse {
                context: "env",
                details: format!("ENVSWEEP_LOG_LEVEL: {details}"),
            })?;
        }
        if let Some(raw) = lookup("ENVSWEEP_JSONL_LOG") {
            self.logging.jsonl_log = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    /// Make volume roots and exclusions absolute so the walker's paths compare
    /// equal to the exclusion list.
    pub fn normalize_paths(&mut self) {
        for path in self
            .scan
            .volume_roots
            .iter_mut()
            .chain(self.scan.excluded_paths.iter_mut())
        {
            *path = resolve_absolute_path(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let scan = &self.scan;
        if scan.volume_roots.is_empty() {
            return Err(invalid("scan.volume_roots must name at least one path"));
        }
        MarkerPattern::new(&scan.marker_pattern)?;
        if scan.manager_path.as_os_str().is_empty() {
            return Err(invalid("scan.manager_path must not be empty"));
        }
        if scan.manager_path.is_absolute()
            || scan
                .manager_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(invalid(format!(
                "scan.manager_path must stay inside the environment root, got {}",
                scan.manager_path.display()
            )));
        }
        if scan.walk_parallelism == 0 {
            return Err(invalid("scan.walk_parallelism must be >= 1"));
        }
        if scan.jobs == 0 {
            return Err(invalid("scan.jobs must be >= 1"));
        }
        if scan.max_depth == Some(0) {
            return Err(invalid("scan.max_depth must be >= 1 when set"));
        }
        if scan.invocation_timeout_secs == Some(0) {
            return Err(invalid("scan.invocation_timeout_secs must be >= 1 when set"));
        }
        Ok(())
    }
}

fn invalid(details: impl Into<String>) -> EnvsweepError {
    EnvsweepError::InvalidConfig {
        details: details.into(),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| EnvsweepError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
