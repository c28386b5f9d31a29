//! Integration tests: CLI smoke tests through the built binary.

mod common;

use std::fs;

use serde_json::Value;

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: envsweep [OPTIONS]"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
    assert!(result.stdout.contains("--package-list"));
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn empty_volume_is_clean_and_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case("empty_volume_is_clean", &["-d", volume]);
    assert_eq!(
        result.status.code(),
        Some(0),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stdout.contains("No packages matching the criteria found."));
    assert!(result.stdout.contains("All found virtual environments checked."));
}

#[test]
fn environment_without_manager_exits_two() {
    let tmp = tempfile::tempdir().unwrap();
    common::make_env(tmp.path(), "venv");
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case("environment_without_manager", &["-d", volume]);
    assert_eq!(
        result.status.code(),
        Some(2),
        "log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stdout
            .contains("In 1 locations, \"bin/pip freeze\" could not be successfully executed."),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stderr.contains("Cannot find bin/pip in"));
}

#[cfg(unix)]
#[test]
fn found_package_exits_two_and_reports_count() {
    let tmp = tempfile::tempdir().unwrap();
    let env = common::make_env(tmp.path(), "project/.venv");
    common::fake_pip(&env, "printf 'urllib==1.0\\nsafe-pkg==2.0\\n'");
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case("found_package", &["-d", volume, "-j", "1"]);
    assert_eq!(
        result.status.code(),
        Some(2),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stdout.contains("1 packages matching the criteria were found."));
    assert!(result.stdout.contains("All found virtual environments checked."));
    assert!(result.stderr.contains("Found package urllib==1.0 in"));
}

#[cfg(unix)]
#[test]
fn negated_package_turns_finding_clean() {
    let tmp = tempfile::tempdir().unwrap();
    let env = common::make_env(tmp.path(), "env");
    common::fake_pip(&env, "echo urllib==1.0");
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case("negated_package", &["-d", volume, "-p", "!urllib"]);
    assert_eq!(
        result.status.code(),
        Some(0),
        "log: {}",
        result.log_path.display()
    );
}

#[cfg(unix)]
#[test]
fn json_output_carries_report() {
    let tmp = tempfile::tempdir().unwrap();
    let env = common::make_env(tmp.path(), "env");
    common::fake_pip(&env, "printf 'crypt==1\\ntelnet==2\\nok==3\\n'");
    common::make_env(tmp.path(), "bare");
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case("json_output", &["-d", volume, "--json"]);
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());

    let report: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(report["total_matched"], 2);
    assert_eq!(report["total_unreachable"], 1);
    assert_eq!(report["environments_scanned"], 2);
    assert_eq!(report["findings"].as_array().unwrap().len(), 2);
    assert_eq!(report["unreachable"][0]["reason"]["kind"], "manager_not_found");
}

#[test]
fn missing_package_list_exits_one() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("no-such-list.txt");
    let result = common::run_cli_case(
        "missing_package_list",
        &[
            "-d",
            tmp.path().to_str().unwrap(),
            "--package-list",
            missing.to_str().unwrap(),
        ],
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stderr.contains("ESW-1101"));
}

#[test]
fn print_rules_lists_resolved_names() {
    let tmp = tempfile::tempdir().unwrap();
    let list = tmp.path().join("blocked.txt");
    fs::write(&list, "# comment\n\nbad-pkg\n").unwrap();
    let result = common::run_cli_case(
        "print_rules",
        &[
            "--package-list",
            list.to_str().unwrap(),
            "-p",
            "extra",
            "--print-rules",
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let names: Vec<&str> = result.stdout.lines().collect();
    assert_eq!(names, vec!["bad-pkg", "extra"]);
}

#[test]
fn negating_unknown_package_warns() {
    let result = common::run_cli_case(
        "negating_unknown_package",
        &["-p", "!not-listed", "--print-rules"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stderr.contains(
        "Trying to remove package from checklist, which is not on the list: !not-listed"
    ));
    assert_eq!(result.stdout.lines().count(), 10);
}

#[test]
fn invalid_marker_exits_one() {
    let result = common::run_cli_case("invalid_marker", &["-m", "../bin/python", "--print-rules"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("ESW-1201"));
}

#[test]
fn explicit_missing_config_exits_one() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("missing.toml");
    let result = common::run_cli_case(
        "explicit_missing_config",
        &["--config", missing.to_str().unwrap(), "--print-rules"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}

#[test]
fn config_file_and_env_feed_the_rule_set() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("envsweep.toml");
    fs::write(&config, "[rules]\nadditional_packages = [\"from-file\"]\n").unwrap();
    let result = common::run_cli_case_with_env(
        "config_file_and_env",
        &["--config", config.to_str().unwrap(), "--print-rules", "--json"],
        &[("ENVSWEEP_PACKAGE_LIST_FILE", "")],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let names: Vec<String> = serde_json::from_str(result.stdout.trim()).unwrap();
    assert!(names.contains(&"from-file".to_string()));
    assert!(names.contains(&"urllib".to_string()));
}

#[test]
fn debug_level_logs_effective_settings() {
    let tmp = tempfile::tempdir().unwrap();
    let result = common::run_cli_case(
        "debug_level_logs",
        &["-l", "3", "-d", tmp.path().to_str().unwrap()],
    );
    assert_eq!(result.status.code(), Some(0), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("log_level : debug"));
    assert!(result.stderr.contains("check_packages : "));
}

#[cfg(unix)]
#[test]
fn jsonl_log_records_findings() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().join("volume");
    let env = common::make_env(&volume, "env");
    common::fake_pip(&env, "echo pwd==0.1");
    let log = tmp.path().join("audit.jsonl");
    let result = common::run_cli_case(
        "jsonl_log",
        &[
            "-d",
            volume.to_str().unwrap(),
            "--jsonl-log",
            log.to_str().unwrap(),
        ],
    );
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    let contents = fs::read_to_string(&log).unwrap();
    let found: Vec<Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .filter(|v: &Value| v["package"] == "pwd==0.1")
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["level"], "warning");
}

#[test]
fn marker_flag_replaces_invalid_env_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().to_str().unwrap();
    let result = common::run_cli_case_with_env(
        "marker_flag_replaces_invalid_env_marker",
        &["-d", volume, "-m", "bin/python"],
        &[("ENVSWEEP_MARKER_PATTERN", "/abs/python")],
    );
    assert_eq!(result.status.code(), Some(0), "log: {}", result.log_path.display());

    let without_flag = common::run_cli_case_with_env(
        "invalid_env_marker_without_flag",
        &["-d", volume],
        &[("ENVSWEEP_MARKER_PATTERN", "/abs/python")],
    );
    assert_eq!(
        without_flag.status.code(),
        Some(1),
        "log: {}",
        without_flag.log_path.display()
    );
    assert!(without_flag.stderr.contains("ESW-1201"));
}

#[test]
fn manager_flag_escaping_the_environment_exits_one() {
    let result = common::run_cli_case(
        "manager_flag_escaping",
        &["--manager", "../../outside/tool", "--print-rules"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("ESW-1001"));
}
