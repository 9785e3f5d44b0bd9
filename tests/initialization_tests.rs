//! Startup behaviour of the binary: configuration bootstrap and argument
//! checks that run before any browser is launched.
//!
//! Config loading and parameter prompts must finish before the progress bar
//! starts, otherwise a prompt is hidden behind the bar and the binary looks
//! stuck. Every test here pipes stdin so the binary sees a non-interactive
//! session and has to exit instead of waiting for input.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn cnpjfinder() -> assert_cmd::Command {
    cargo_bin_cmd!("cnpjfinder")
}

/// Copy the real config directory into a temp dir so the binary
/// can find `./config/cnpjfinder.toml` relative to its working directory.
fn setup_config_dir(tmp: &TempDir) {
    let src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let dst = tmp.path().join("config");
    fs::create_dir_all(&dst).unwrap();
    fs::copy(src.join("cnpjfinder.toml"), dst.join("cnpjfinder.toml")).unwrap();
}

#[test]
fn test_missing_config_exits_fast_not_hangs() {
    let tmp = TempDir::new().expect("create temp dir");

    cnpjfinder()
        .current_dir(tmp.path())
        .args(["--city", "Alfenas", "--state", "MG", "--category", "padaria"])
        .write_stdin("")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"))
        .stderr(predicate::str::contains("--init"));
}

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("cnpjfinder.toml");

    assert!(!config_path.exists(), "config should not exist yet");

    cnpjfinder()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    assert!(config_path.exists(), "config file should have been created");

    let content = fs::read_to_string(&config_path).unwrap();
    for section in ["[http]", "[browser]", "[maps]", "[scroll]", "[search]", "[registry]"] {
        assert!(content.contains(section), "config should have {} section", section);
    }
}

#[test]
fn test_help_works_without_config() {
    let tmp = TempDir::new().expect("create temp dir");

    cnpjfinder()
        .current_dir(tmp.path())
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("--regime"))
        .stdout(predicate::str::contains("--output-format"))
        .stdout(predicate::str::contains("--quiet"))
        .stdout(predicate::str::contains("second Ctrl-C exits at once"));
}

#[test]
fn test_unknown_regime_is_rejected_by_parser() {
    cnpjfinder()
        .args(["--regime", "mei"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_missing_location_without_terminal_is_an_argument_error() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    cnpjfinder()
        .current_dir(tmp.path())
        .args(["--city", "Alfenas", "--state", "MG"])
        .write_stdin("")
        .timeout(Duration::from_secs(10))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--category is required"));
}

#[test]
fn test_invalid_arguments_fail_before_browser_launch() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    cnpjfinder()
        .current_dir(tmp.path())
        .args(["--city", "Alfenas", "--state", "MG", "--category", "padaria", "--count", "0"])
        .write_stdin("")
        .timeout(Duration::from_secs(10))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Count must be greater than 0"));

    cnpjfinder()
        .current_dir(tmp.path())
        .args(["--city", "Alfenas", "--state", "MG", "--category", "padaria", "-f", "html"])
        .write_stdin("")
        .timeout(Duration::from_secs(10))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Output format must be"));
}

#[test]
fn test_broken_config_is_reported() {
    let tmp = TempDir::new().expect("create temp dir");
    let dst = tmp.path().join("config");
    fs::create_dir_all(&dst).unwrap();
    fs::write(dst.join("cnpjfinder.toml"), "[http]\nuser_agent = 3\n").unwrap();

    cnpjfinder()
        .current_dir(tmp.path())
        .args(["--city", "Alfenas", "--state", "MG", "--category", "padaria"])
        .write_stdin("")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
