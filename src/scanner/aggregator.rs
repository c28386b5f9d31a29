//! Scan aggregation: drive locator, extraction workers and matcher, and fold
//! every outcome into one [`ScanReport`].
//!
//! Pipeline:
//! ```text
//! walker threads ──Discovery──▶ extraction workers ──Outcome──▶ collector
//!   (locator)       bounded        (extract + match)   bounded    (this thread)
//! ```
//! The collector is the only writer of the report. Workers share nothing
//! mutable; each owns the inventory it produces until it is sent.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as channel;
use serde::Serialize;

use crate::logger::{LogEvent, LogLevel, LogSink};
use crate::rules::RuleSet;
use crate::scanner::inventory::{Inventory, InventoryExtractor, InventoryStatus};
use crate::scanner::locator::{Discovery, EnvironmentLocator, LocatorConfig, TraversalError};
use crate::scanner::marker::MarkerPattern;
use crate::scanner::matcher::{MatchResult, match_inventory};

/// Exit status of a scan with no findings.
pub const EXIT_CLEAN: i32 = 0;
/// Exit status when anything matched or any environment was unreachable.
pub const EXIT_FINDINGS: i32 = 2;

/// One matched inventory line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Finding {
    pub environment: PathBuf,
    pub package: String,
}

/// An environment whose inventory could not be obtained cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreachableEnvironment {
    pub environment: PathBuf,
    pub reason: InventoryStatus,
}

/// Totals of one sweep. Only `total_matched` and `total_unreachable` decide
/// the verdict; the rest is detail for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub total_matched: usize,
    pub total_unreachable: usize,
    pub environments_scanned: usize,
    pub skipped_subtrees: usize,
    pub cancelled: bool,
    pub findings: Vec<Finding>,
    pub unreachable: Vec<UnreachableEnvironment>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.total_matched + self.total_unreachable == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            EXIT_CLEAN
        } else {
            EXIT_FINDINGS
        }
    }

    fn sort_details(&mut self) {
        self.findings.sort();
        self.unreachable
            .sort_by(|a, b| a.environment.cmp(&b.environment));
    }
}

/// Everything a sweep needs besides the rule set.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub locator: LocatorConfig,
    pub extractor: InventoryExtractor,
    /// Number of extraction workers; `1` processes environments one at a time.
    pub jobs: usize,
}

impl ScanPlan {
    pub fn new(locator: LocatorConfig, extractor: InventoryExtractor) -> Self {
        Self {
            locator,
            extractor,
            jobs: default_jobs(),
        }
    }
}

/// Extraction workers when none are configured.
pub fn default_jobs() -> usize {
    thread::available_parallelism().map_or(4, |n| n.get().min(8))
}

enum Outcome {
    Scanned(Inventory, MatchResult),
    Skipped(TraversalError),
}

/// Runs one sweep and reports through a [`LogSink`].
pub struct ScanAggregator<'a> {
    plan: ScanPlan,
    sink: &'a dyn LogSink,
    cancel: Arc<AtomicBool>,
}

impl<'a> ScanAggregator<'a> {
    pub fn new(plan: ScanPlan, sink: &'a dyn LogSink) -> Self {
        Self {
            plan,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Once set, no new environment is started. Running managers finish.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    pub fn run(&self, rules: &RuleSet) -> ScanReport {
        let jobs = self.plan.jobs.max(1);
        let discoveries = EnvironmentLocator::new(self.plan.locator.clone())
            .with_cancel_flag(Arc::clone(&self.cancel))
            .stream();
        let (outcome_tx, outcome_rx) = channel::bounded::<Outcome>(jobs * 2);

        let mut report = ScanReport::default();
        thread::scope(|scope| {
            for _ in 0..jobs {
                let discoveries = discoveries.clone();
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || self.worker(&discoveries, &outcome_tx, rules));
            }
            // Workers hold the only senders now; the loop below ends when the
            // last of them exits.
            drop(outcome_tx);
            drop(discoveries);

            for outcome in &outcome_rx {
                self.collect(&mut report, outcome);
            }
        });

        report.cancelled = self.cancel.load(Ordering::Relaxed);
        report.sort_details();
        self.sink.log(
            LogLevel::Debug,
            &format!(
                "sweep finished: scanned={} matched={} unreachable={} skipped={}",
                report.environments_scanned,
                report.total_matched,
                report.total_unreachable,
                report.skipped_subtrees
            ),
        );
        report
    }

    fn worker(
        &self,
        discoveries: &channel::Receiver<Discovery>,
        outcomes: &channel::Sender<Outcome>,
        rules: &RuleSet,
    ) {
        let command = self.plan.extractor.command_line();
        for discovery in discoveries {
            if self.cancel.load(Ordering::Relaxed) {
                return;
            }
            let outcome = match discovery {
                Discovery::Candidate(candidate) => {
                    if self
                        .plan
                        .extractor
                        .manager_for(&candidate.root)
                        .is_some_and(|manager| manager.is_file())
                    {
                        self.sink.emit(
                            &LogEvent::new(
                                LogLevel::Info,
                                format!("Running \"{command}\" in {}", candidate.root.display()),
                            )
                            .with_environment(&candidate.root),
                        );
                    }
                    let inventory = self.plan.extractor.extract(&candidate);
                    log_inventory(self.sink, &inventory);
                    let matched = match_inventory(&inventory, rules);
                    Outcome::Scanned(inventory, matched)
                }
                Discovery::Skipped(err) => Outcome::Skipped(err),
            };
            if outcomes.send(outcome).is_err() {
                return;
            }
        }
    }

    fn collect(&self, report: &mut ScanReport, outcome: Outcome) {
        match outcome {
            Outcome::Skipped(err) => {
                report.skipped_subtrees += 1;
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Skipping {}: {}", err.path.display(), err.details),
                );
            }
            Outcome::Scanned(inventory, matched) => {
                report.environments_scanned += 1;
                let env = inventory.environment.root.as_path();

                if !inventory.status.is_reachable() {
                    report.total_unreachable += 1;
                    self.report_unreachable(env, &inventory.status);
                    report.unreachable.push(UnreachableEnvironment {
                        environment: env.to_path_buf(),
                        reason: inventory.status.clone(),
                    });
                }

                for package in &matched.matched_entries {
                    report.total_matched += 1;
                    self.sink.emit(
                        &LogEvent::new(
                            LogLevel::Warning,
                            format!("Found package {package} in {}", env.display()),
                        )
                        .with_environment(env)
                        .with_package(package),
                    );
                    report.findings.push(Finding {
                        environment: env.to_path_buf(),
                        package: package.clone(),
                    });
                }

                if matched.is_clean() && inventory.status != InventoryStatus::ManagerNotFound {
                    self.sink.emit(
                        &LogEvent::new(
                            LogLevel::Info,
                            format!("None of the checked packages found in {}", env.display()),
                        )
                        .with_environment(env),
                    );
                }
            }
        }
    }

    fn report_unreachable(&self, env: &Path, status: &InventoryStatus) {
        let command = self.plan.extractor.command_line();
        let (level, message) = match status {
            InventoryStatus::Ok => return,
            InventoryStatus::ManagerNotFound => (
                LogLevel::Warning,
                format!(
                    "Cannot find {} in {}, check manually!",
                    self.plan.extractor.manager_path().display(),
                    env.display()
                ),
            ),
            InventoryStatus::InvocationFailed { code: Some(code) } => (
                LogLevel::Error,
                format!("Error running \"{command}\" in {}, returned {code}", env.display()),
            ),
            InventoryStatus::InvocationFailed { code: None } => (
                LogLevel::Error,
                format!(
                    "Error running \"{command}\" in {}, terminated by a signal",
                    env.display()
                ),
            ),
            InventoryStatus::InvocationError { message } => (
                LogLevel::Error,
                format!("Exception running \"{command}\" in {}: {message}", env.display()),
            ),
        };
        self.sink
            .emit(&LogEvent::new(level, message).with_environment(env));
    }
}

fn log_inventory(sink: &dyn LogSink, inventory: &Inventory) {
    let env = inventory.environment.root.as_path();
    for entry in &inventory.entries {
        sink.emit(
            &LogEvent::new(
                LogLevel::Debug,
                format!("Package {entry} in {}", env.display()),
            )
            .with_environment(env)
            .with_package(entry),
        );
    }
    if !inventory.stderr.is_empty() {
        sink.emit(
            &LogEvent::new(
                LogLevel::Debug,
                format!("Manager stderr in {}: {}", env.display(), inventory.stderr),
            )
            .with_environment(env),
        );
    }
}

/// Sweep `volume_roots` with default traversal settings and the default
/// `freeze` invocation of `manager_relative_path`.
pub fn run(
    volume_roots: &[PathBuf],
    marker: &MarkerPattern,
    manager_relative_path: &Path,
    rules: &RuleSet,
    sink: &dyn LogSink,
) -> ScanReport {
    let plan = ScanPlan::new(
        LocatorConfig::new(volume_roots.to_vec(), marker.clone()),
        InventoryExtractor::new(manager_relative_path),
    );
    ScanAggregator::new(plan, sink).run(rules)
}
