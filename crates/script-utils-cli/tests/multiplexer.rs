//! End-to-end tests against the built `script-utils` binary.
//!
//! Every test runs the binary with a scrubbed environment and a temporary
//! install root so nothing on the host influences the result.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Returns the path to the `script-utils` binary built by Cargo.
fn script_utils_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_script-utils"))
}

/// Command running `program` with only `PATH` and `VESPA_HOME` set.
fn hermetic(program: &Path, home: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_clear()
        .env("PATH", "/usr/bin:/bin")
        .env("VESPA_HOME", home);
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    hermetic(&script_utils_bin(), home)
        .args(args)
        .output()
        .expect("run script-utils")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn install_script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn mode(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[test]
fn unknown_action_prints_usage_and_exits_zero() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["foo"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("unknown action 'foo'"), "{err}");
    assert!(err.contains("export-env"), "{err}");
}

#[test]
fn invocation_name_selects_the_action() {
    let home = TempDir::new().expect("create temp dir");
    let link = home.path().join("foo");
    symlink(script_utils_bin(), &link).unwrap();

    let output = hermetic(&link, home.path()).output().expect("run via link");
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("unknown action 'foo'"));
}

#[test]
fn wrapped_binary_status_passes_through() {
    let home = TempDir::new().expect("create temp dir");
    let link = home.path().join("tool");
    symlink(script_utils_bin(), &link).unwrap();
    install_script(&home.path().join("tool-bin"), "test \"$1\" = go && exit 6; exit 2");

    let output = hermetic(&link, home.path())
        .arg("go")
        .output()
        .expect("run via link");
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn start_c_binary_runs_home_bin() {
    let home = TempDir::new().expect("create temp dir");
    install_script(&home.path().join("bin/vespa-proton-bin"), "echo \"proton $1\"");

    let output = run(home.path(), &["start-c-binary", "vespa-proton", "--ok"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output).trim(), "proton --ok");
}

#[test]
fn start_c_binary_without_program_fails_with_one_line() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["start-c-binary"]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output), "start-c-binary: missing program name\n");
}

#[test]
fn export_env_renders_defaults_file() {
    let home = TempDir::new().expect("create temp dir");
    let defaults = home.path().join("conf/vespa/default-env.txt");
    std::fs::create_dir_all(defaults.parent().unwrap()).unwrap();
    let content = "# defaults\noverride VESPA_CONFIGSERVERS cfg1 cfg2\nunset VESPA_LOG_TARGET\n";
    std::fs::write(&defaults, content).unwrap();

    let output = run(home.path(), &["export-env"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(
        text.contains("VESPA_CONFIGSERVERS='cfg1 cfg2'\nexport VESPA_CONFIGSERVERS\n"),
        "{text}"
    );
    assert!(text.contains("unset VESPA_LOG_TARGET\n"), "{text}");
}

#[test]
fn security_env_without_config_is_empty() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["security-env"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).is_empty());
}

#[test]
fn security_env_with_unreadable_config_fails() {
    let home = TempDir::new().expect("create temp dir");
    let output = hermetic(&script_utils_bin(), home.path())
        .env("VESPA_TLS_CONFIG_FILE", home.path().join("missing.json"))
        .arg("security-env")
        .output()
        .expect("run script-utils");

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert_eq!(stderr(&output).lines().count(), 1, "{}", stderr(&output));
}

#[test]
fn ipv6_only_reports_zero_or_one() {
    let home = TempDir::new().expect("create temp dir");
    let output = hermetic(&script_utils_bin(), home.path())
        .env("VESPA_HOSTNAME", "localhost")
        .arg("ipv6-only")
        .output()
        .expect("run script-utils");

    assert!(matches!(output.status.code(), Some(0 | 1)), "{output:?}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn delegated_tool_status_passes_through() {
    let home = TempDir::new().expect("create temp dir");
    let tools = home.path().join("tools");
    install_script(&tools.join("vespa-logfmt"), "exit 4");

    let output = hermetic(&script_utils_bin(), home.path())
        .env("SCRIPT_UTILS_SUBSYSTEM_DIR", &tools)
        .args(["vespa-logfmt", "-f"])
        .output()
        .expect("run script-utils");
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn missing_delegated_tool_is_a_classified_error() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["vespa-deploy", "prepare"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("vespa-deploy is not installed"));
}

#[test]
fn relative_home_does_not_fail_the_run() {
    let output = hermetic(&script_utils_bin(), Path::new("relative/home"))
        .arg("foo")
        .output()
        .expect("run script-utils");

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("unknown action 'foo'"), "{err}");
    assert!(err.contains("ignoring VESPA_HOME"), "{err}");
}

#[test]
fn non_utf8_arguments_are_forwarded_byte_for_byte() {
    let home = TempDir::new().expect("create temp dir");
    let marker = home.path().join("arg.bin");
    install_script(
        &home.path().join("bin/echoer-bin"),
        &format!("printf '%s' \"$1\" > '{}'", marker.display()),
    );

    let raw = OsStr::from_bytes(b"caf\xe9");
    let output = hermetic(&script_utils_bin(), home.path())
        .args([OsStr::new("start-c-binary"), OsStr::new("echoer"), raw])
        .output()
        .expect("run script-utils");

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(std::fs::read(&marker).unwrap(), b"caf\xe9");
}

#[test]
fn fix_configserver_dirs_help_goes_to_stdout() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["fix-configserver-dirs", "--help"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("--home"));
    assert!(stderr(&output).is_empty());
}

#[test]
fn fix_configserver_dirs_rejects_unknown_flags() {
    let home = TempDir::new().expect("create temp dir");
    let output = run(home.path(), &["fix-configserver-dirs", "--bogus"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("fix-configserver-dirs: "), "{err}");
    assert_eq!(err.lines().count(), 1, "{err}");
}

#[test]
fn fix_configserver_dirs_enforces_modes() {
    let home = TempDir::new().expect("create temp dir");
    let zk = home.path().join("var/zookeeper");
    std::fs::create_dir_all(zk.join("version-2")).unwrap();
    std::fs::write(zk.join("myid"), b"1\n").unwrap();
    std::fs::write(zk.join("version-2/snapshot.0"), b"").unwrap();
    std::fs::set_permissions(&zk, std::fs::Permissions::from_mode(0o700)).unwrap();
    std::fs::set_permissions(zk.join("myid"), std::fs::Permissions::from_mode(0o600)).unwrap();
    let snapshot = zk.join("version-2/snapshot.0");
    std::fs::set_permissions(&snapshot, std::fs::Permissions::from_mode(0o666)).unwrap();

    // A user without a passwd entry leaves ownership alone.
    let output = run(
        home.path(),
        &["fix-configserver-dirs", "--user", "no_such_user_script_utils"],
    );

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(mode(&zk), 0o755);
    assert_eq!(mode(&zk.join("version-2")), 0o755);
    assert_eq!(mode(&zk.join("myid")), 0o644);
    assert_eq!(mode(&zk.join("version-2/snapshot.0")), 0o644);
}

#[test]
fn fix_configserver_dirs_wrong_kind_fails() {
    let home = TempDir::new().expect("create temp dir");
    std::fs::create_dir_all(home.path().join("var")).unwrap();
    std::fs::write(home.path().join("var/zookeeper"), b"not a dir").unwrap();

    let output = run(
        home.path(),
        &["fix-configserver-dirs", "--user", "no_such_user_script_utils"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).lines().any(|line| line.contains("var/zookeeper")));
}
