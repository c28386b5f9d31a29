#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_envsweep") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "envsweep.exe"
    } else {
        "envsweep"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve envsweep binary path for integration test"),
    }
}

/// Run the binary with `HOME` pointed at an empty directory so no user
/// config file leaks into the case.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("envsweep-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let home = tempfile::tempdir().expect("create isolated HOME");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home.path())
        .env("RUST_BACKTRACE", "1")
        .env("NO_COLOR", "1")
        .env_remove("ENVSWEEP_LOG")
        .env_remove("ENVSWEEP_OUTPUT_FORMAT");
    for (key, value) in envs {
        command.env(key, value);
    }
    let output = command.output().expect("execute envsweep command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Create `<base>/<rel>` with a `bin/python` marker and return its root.
pub fn make_env(base: &Path, rel: &str) -> PathBuf {
    let root = base.join(rel);
    fs::create_dir_all(root.join("bin")).expect("create env bin dir");
    fs::write(root.join("bin").join("python"), "").expect("write marker");
    root
}

/// Install an executable `bin/pip` shell script running `body`.
#[cfg(unix)]
pub fn fake_pip(env_root: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let pip = env_root.join("bin").join("pip");
    fs::write(&pip, format!("#!/bin/sh\n{body}\n")).expect("write fake pip");
    fs::set_permissions(&pip, fs::Permissions::from_mode(0o755)).expect("chmod fake pip");
}
