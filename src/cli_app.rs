//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use envsweep::core::config::Config;
use envsweep::core::errors::EnvsweepError;
use envsweep::logger::{
    FanoutSink, JsonlConfig, JsonlSink, LevelFilterSink, LogLevel, LogSink, TracingSink,
};
use envsweep::rules::{RuleSet, RuleSetResolver};
use envsweep::scanner::aggregator::{ScanAggregator, ScanReport};

/// envsweep searches all virtual environments on the given volumes and
/// checks them for specific packages.
#[derive(Debug, Parser)]
#[command(
    name = "envsweep",
    author,
    version,
    about = "Searches all virtual environments on a machine and checks for specific packages",
    long_about = None
)]
pub struct Cli {
    /// Level of messages to log: 0/error, 1/warning (default), 2/info, 3/debug.
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// Volume or directory to sweep. Repeat to sweep several. Defaults to the
    /// filesystem root.
    #[arg(short = 'd', long = "volume", value_name = "PATH", value_parser = parse_volume)]
    volumes: Vec<PathBuf>,
    /// Additional package name to check. Repeat for several. Prefix `!` to
    /// remove a name from the list instead.
    #[arg(short = 'p', long = "package", value_name = "NAME")]
    packages: Vec<String>,
    /// File listing the package names to check, one per line. Blank lines
    /// and `#` comments are ignored. Replaces the built-in list.
    #[arg(long, value_name = "PATH")]
    package_list: Option<PathBuf>,
    /// Relative path whose presence identifies an environment root.
    #[arg(short = 'm', long, value_name = "PATTERN")]
    marker: Option<String>,
    /// Package manager location relative to an environment root.
    #[arg(long, value_name = "PATH")]
    manager: Option<PathBuf>,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of environments interrogated concurrently.
    #[arg(short = 'j', long, value_name = "N")]
    jobs: Option<usize>,
    /// Kill a package manager still running after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout_secs: Option<u64>,
    /// Descend into symlinked directories.
    #[arg(long)]
    follow_symlinks: bool,
    /// Append every log event as JSON to this file.
    #[arg(long, value_name = "PATH")]
    jsonl_log: Option<PathBuf>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Print the resolved package list and exit without sweeping.
    #[arg(long)]
    print_rules: bool,
    /// Generate shell completions and exit.
    #[arg(long, value_name = "SHELL")]
    completions: Option<CompletionShell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
///
/// Exit status `2` is reserved for a sweep that found something, so no
/// error maps to it.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration, flags or package list.
    #[error("{0}")]
    Config(#[from] EnvsweepError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Json(_) | Self::Io(_) => 3,
        }
    }
}

/// Run the CLI. Returns the process exit status.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        let binary_name = command.get_name().to_string();
        generate(shell, &mut command, binary_name, &mut io::stdout());
        return Ok(0);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, cli);
    config.finalize()?;

    init_tracing(config.logging.level);
    let sink = build_sink(&config);
    log_effective_config(&sink, &config);

    let rules = RuleSetResolver::new(&sink)
        .override_file(config.rules.package_list_file.clone())
        .adjustments(config.rules.additional_packages.clone())
        .resolve()?;

    if cli.print_rules {
        print_rules(cli, &rules)?;
        return Ok(0);
    }

    let plan = config.scan_plan()?;
    let command_line = plan.extractor.command_line();
    let cancel = register_cancel_flag();
    let report = ScanAggregator::new(plan, &sink)
        .with_cancel_flag(cancel)
        .run(&rules);

    match output_mode(cli) {
        OutputMode::Human => print_summary(&report, &command_line)?,
        OutputMode::Json => write_json_line(&report)?,
    }
    Ok(report.exit_code())
}

/// Command-line flags win over file and environment values. Package
/// adjustments from the command line are applied after configured ones.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if !cli.volumes.is_empty() {
        config.scan.volume_roots.clone_from(&cli.volumes);
    }
    config
        .rules
        .additional_packages
        .extend(cli.packages.iter().cloned());
    if let Some(path) = &cli.package_list {
        config.rules.package_list_file = Some(path.clone());
    }
    if let Some(marker) = &cli.marker {
        config.scan.marker_pattern.clone_from(marker);
    }
    if let Some(manager) = &cli.manager {
        config.scan.manager_path.clone_from(manager);
    }
    if let Some(jobs) = cli.jobs {
        config.scan.jobs = jobs;
    }
    if let Some(secs) = cli.timeout_secs {
        config.scan.invocation_timeout_secs = Some(secs);
    }
    if cli.follow_symlinks {
        config.scan.follow_symlinks = true;
    }
    if let Some(path) = &cli.jsonl_log {
        config.logging.jsonl_log = Some(path.clone());
    }
}

/// A bare drive letter (`C`) names that drive's root on Windows; anything
/// else is taken as a path.
fn parse_volume(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("volume must not be empty".to_string());
    }
    if cfg!(windows) && trimmed.len() == 1 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(PathBuf::from(format!("{}:\\", trimmed.to_ascii_uppercase())));
    }
    Ok(PathBuf::from(trimmed))
}

/// stderr subscriber. `ENVSWEEP_LOG` takes a full `EnvFilter` directive and
/// replaces the configured level.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_env("ENVSWEEP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("envsweep={}", level.tracing_directive())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .try_init();
}

fn build_sink(config: &Config) -> FanoutSink {
    let sink = FanoutSink::new().with(TracingSink);
    match &config.logging.jsonl_log {
        Some(path) => sink.with(LevelFilterSink::new(
            config.logging.level,
            JsonlSink::open(JsonlConfig::new(path)),
        )),
        None => sink,
    }
}

fn log_effective_config(sink: &dyn LogSink, config: &Config) {
    sink.log(
        LogLevel::Debug,
        &format!("log_level : {}", config.logging.level),
    );
    sink.log(
        LogLevel::Debug,
        &format!("volume_roots : {:?}", config.scan.volume_roots),
    );
    sink.log(
        LogLevel::Debug,
        &format!("marker_pattern : {}", config.scan.marker_pattern),
    );
    if let Ok(hash) = config.stable_hash() {
        sink.log(LogLevel::Debug, &format!("config_hash : {hash}"));
    }
}

fn register_cancel_flag() -> Arc<AtomicBool> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&cancel)) {
        tracing::warn!(target: "envsweep", "failed to register SIGTERM: {e}");
    }
    if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&cancel)) {
        tracing::warn!(target: "envsweep", "failed to register SIGINT: {e}");
    }
    cancel
}

fn print_rules(cli: &Cli, rules: &RuleSet) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Json => write_json_line(rules),
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            for name in rules.iter() {
                writeln!(stdout, "{name}")?;
            }
            Ok(())
        }
    }
}

fn print_summary(report: &ScanReport, command_line: &str) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for line in summary_lines(report, command_line) {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

fn summary_lines(report: &ScanReport, command_line: &str) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);
    if report.total_matched > 0 {
        lines.push(
            format!(
                "{} packages matching the criteria were found.",
                report.total_matched
            )
            .red()
            .bold()
            .to_string(),
        );
    } else {
        lines.push(
            "No packages matching the criteria found."
                .green()
                .to_string(),
        );
    }
    if report.total_unreachable > 0 {
        lines.push(
            format!(
                "In {} locations, \"{command_line}\" could not be successfully executed.",
                report.total_unreachable
            )
            .yellow()
            .to_string(),
        );
    } else {
        lines.push("All found virtual environments checked.".to_string());
    }
    if report.cancelled {
        lines.push("Sweep interrupted; results are partial.".yellow().to_string());
    }
    lines
}

fn write_json_line<T: serde::Serialize + ?Sized>(payload: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ENVSWEEP_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}
