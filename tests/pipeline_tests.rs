//! Library-level sweep scenarios: rules, locator, extractor, matcher and
//! aggregator wired together the way the binary wires them.

mod common;

use std::fs;
use std::path::Path;

use envsweep::prelude::*;
use envsweep::rules::resolve;
use envsweep::scanner::aggregator;

fn plan_for(volume: &Path, jobs: usize) -> ScanPlan {
    let mut config = Config::default();
    config.scan.volume_roots = vec![volume.to_path_buf()];
    config.scan.excluded_paths.clear();
    config.scan.jobs = jobs;
    config.finalize().unwrap();
    config.scan_plan().unwrap()
}

#[test]
fn zero_environments_is_success() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("a/b/c")).unwrap();
    let sink = RecordingSink::new();
    let report =
        ScanAggregator::new(plan_for(tmp.path(), 2), &sink).run(&RuleSet::default_blocked());
    assert_eq!((report.total_matched, report.total_unreachable), (0, 0));
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn environment_without_manager_is_failure() {
    let tmp = tempfile::tempdir().unwrap();
    common::make_env(tmp.path(), "venv");
    let sink = RecordingSink::new();
    let report = aggregator::run(
        &[tmp.path().to_path_buf()],
        &MarkerPattern::new("bin/python").unwrap(),
        Path::new("bin/pip"),
        &RuleSet::default_blocked(),
        &sink,
    );
    assert_eq!((report.total_matched, report.total_unreachable), (0, 1));
    assert_eq!(report.exit_code(), 2);
}

#[cfg(unix)]
#[test]
fn single_typosquat_with_default_rules() {
    let tmp = tempfile::tempdir().unwrap();
    let env = common::make_env(tmp.path(), "venv");
    common::fake_pip(&env, "printf 'urllib==1.0\\nsafe-pkg==2.0\\n'");
    let sink = RecordingSink::new();
    let report =
        ScanAggregator::new(plan_for(tmp.path(), 1), &sink).run(&RuleSet::default_blocked());
    assert_eq!((report.total_matched, report.total_unreachable), (1, 0));
    assert!(!report.is_clean());
}

#[cfg(unix)]
#[test]
fn rule_file_and_adjustments_drive_matching() {
    let tmp = tempfile::tempdir().unwrap();
    let volume = tmp.path().join("volume");
    let env = common::make_env(&volume, "svc/env");
    common::fake_pip(&env, "printf 'bad-pkg==0.1\\nurllib==1.0\\nmine==2\\n'");

    let list = tmp.path().join("blocked.txt");
    fs::write(&list, "# comment\n\nbad-pkg\n").unwrap();
    let sink = RecordingSink::new();
    let rules = resolve(
        &RuleSet::default_blocked(),
        Some(&list),
        &["mine".to_string(), "!absent".to_string()],
        &sink,
    )
    .unwrap();
    assert_eq!(rules.iter().collect::<Vec<_>>(), vec!["bad-pkg", "mine"]);
    assert_eq!(sink.count(LogLevel::Warning), 1);

    let report = ScanAggregator::new(plan_for(&volume, 2), &sink).run(&rules);
    assert_eq!(report.total_matched, 2);
    let packages: Vec<_> = report.findings.iter().map(|f| f.package.as_str()).collect();
    assert_eq!(packages, vec!["bad-pkg==0.1", "mine==2"]);
}

#[cfg(unix)]
#[test]
fn unreachable_counts_once_per_environment_regardless_of_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let failing = common::make_env(tmp.path(), "failing");
    common::fake_pip(&failing, "echo pwd==1\necho crypt==1\nexit 5");
    let crashing = common::make_env(tmp.path(), "crashing");
    common::fake_pip(&crashing, "kill -9 $$");
    common::make_env(tmp.path(), "missing");
    let clean = common::make_env(tmp.path(), "clean");
    common::fake_pip(&clean, "echo requests==2");

    let sink = RecordingSink::new();
    let report =
        ScanAggregator::new(plan_for(tmp.path(), 3), &sink).run(&RuleSet::default_blocked());
    assert_eq!(report.environments_scanned, 4);
    assert_eq!(report.total_unreachable, 3);
    assert_eq!(report.total_matched, 2);

    let crashed = report
        .unreachable
        .iter()
        .find(|u| u.environment == crashing)
        .unwrap();
    assert_eq!(crashed.reason, InventoryStatus::InvocationFailed { code: None });
}

#[cfg(unix)]
#[test]
fn hung_manager_times_out_and_sweep_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let hung = common::make_env(tmp.path(), "hung");
    common::fake_pip(&hung, "exec sleep 30");
    let ok = common::make_env(tmp.path(), "ok");
    common::fake_pip(&ok, "echo bzip==1");

    let mut config = Config::default();
    config.scan.volume_roots = vec![tmp.path().to_path_buf()];
    config.scan.invocation_timeout_secs = Some(1);
    config.scan.jobs = 2;
    let plan = config.scan_plan().unwrap();

    let sink = RecordingSink::new();
    let report = ScanAggregator::new(plan, &sink).run(&RuleSet::default_blocked());
    assert_eq!(report.total_unreachable, 1);
    assert_eq!(report.total_matched, 1);
    match &report.unreachable[0].reason {
        InventoryStatus::InvocationError { message } => assert!(message.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn glob_marker_finds_versioned_interpreters() {
    let tmp = tempfile::tempdir().unwrap();
    let env = tmp.path().join("py312");
    fs::create_dir_all(env.join("bin")).unwrap();
    fs::write(env.join("bin/python3.12"), "").unwrap();
    common::fake_pip(&env, "echo setup-tools==1");

    let mut config = Config::default();
    config.scan.volume_roots = vec![tmp.path().to_path_buf()];
    config.scan.marker_pattern = "bin/python3.*".to_string();
    let sink = RecordingSink::new();
    let report = ScanAggregator::new(config.scan_plan().unwrap(), &sink)
        .run(&RuleSet::default_blocked());
    assert_eq!(report.total_matched, 1);
    assert_eq!(report.findings[0].environment, env);
}

#[cfg(unix)]
#[test]
fn unreadable_subtree_is_skipped_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let locked = tmp.path().join("locked");
    fs::create_dir_all(&locked).unwrap();
    common::make_env(&locked, "hidden");
    let visible = common::make_env(tmp.path(), "visible");
    common::fake_pip(&visible, "echo telnet==1");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permission bits are not enforced for this user (root).
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        eprintln!("skipping: {} is still readable", locked.display());
        return;
    }

    let sink = RecordingSink::new();
    let report =
        ScanAggregator::new(plan_for(tmp.path(), 2), &sink).run(&RuleSet::default_blocked());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(report.total_matched, 1);
    assert_eq!(report.skipped_subtrees, 1);
    assert_eq!(report.total_unreachable, 0);
    assert_eq!(report.environments_scanned, 1);
    assert!(
        sink.messages(LogLevel::Debug)
            .iter()
            .any(|m| m.starts_with(&format!("Skipping {}", locked.display())))
    );
}

#[cfg(unix)]
#[test]
fn manager_leaving_stdout_open_counts_as_unreachable() {
    let tmp = tempfile::tempdir().unwrap();
    let env = common::make_env(tmp.path(), "env");
    common::fake_pip(&env, "echo urllib==1.0\n(sleep 6) &\nexit 0");

    let mut config = Config::default();
    config.scan.volume_roots = vec![tmp.path().to_path_buf()];
    config.scan.invocation_timeout_secs = Some(30);
    config.finalize().unwrap();

    let sink = RecordingSink::new();
    let report =
        ScanAggregator::new(config.scan_plan().unwrap(), &sink).run(&RuleSet::default_blocked());
    assert_eq!(report.total_matched, 1);
    assert_eq!(report.total_unreachable, 1);
    assert_eq!(report.exit_code(), 2);
}
