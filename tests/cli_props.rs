//! CLI integration tests for the `props` binary (one-off mode).
//!
//! Watch mode never exits on its own, so it is covered by the library tests.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run props in `root` with the given arguments and return (stderr, exit code).
fn run_props(root: &Path, args: &[&str]) -> (String, Option<i32>) {
    let output = Command::new(env!("CARGO_BIN_EXE_props"))
        .current_dir(root)
        .env("RUST_LOG", "info")
        .args(args)
        .output()
        .expect("Failed to execute props");
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stderr, output.status.code())
}

fn write_config(root: &Path, content: &str) {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("config/properties.toml"), content).unwrap();
}

#[test]
fn test_one_off_writes_and_exits() {
    let temp = TempDir::new().unwrap();
    write_config(
        temp.path(),
        "[[module]]\ndist = \"dist/styles/_properties.css\"\n[module.properties]\na = \"1\"\nb = \"2\"\n",
    );

    let (stderr, code) = run_props(temp.path(), &[]);
    assert_eq!(code, Some(0), "stderr: {}", stderr);
    assert!(stderr.contains("Properties written to"), "stderr: {}", stderr);
    assert_eq!(
        fs::read_to_string(temp.path().join("dist/styles/_properties.css")).unwrap(),
        ":root { --a: 1; --b: 2; }\n"
    );
}

#[test]
fn test_root_flag() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[[module]]\ndist = \"out.css\"\n[module.properties]\nx = \"y\"\n");
    let elsewhere = TempDir::new().unwrap();

    let root = temp.path().to_string_lossy().into_owned();
    let (stderr, code) = run_props(elsewhere.path(), &["--root", &root]);
    assert_eq!(code, Some(0), "stderr: {}", stderr);
    assert!(temp.path().join("out.css").exists());
}

#[test]
fn test_missing_config_logs_and_exits_zero() {
    let temp = TempDir::new().unwrap();

    let (stderr, code) = run_props(temp.path(), &[]);
    assert_eq!(code, Some(0));
    assert!(stderr.contains("Failed (run)"), "stderr: {}", stderr);
}

#[test]
fn test_strict_exits_nonzero_on_failure() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[[module]]\ndist = \"out.css\"\nimport = [\"nope.toml\"]\n");

    let (stderr, code) = run_props(temp.path(), &["--strict"]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed (main)"), "stderr: {}", stderr);
}

#[test]
fn test_custom_config_path() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("props.toml"),
        "[[module]]\ndist = \"themes/dark.css\"\nruleset = \".theme-dark\"\n[module.properties]\nbg = \"black\"\n",
    )
    .unwrap();

    let (stderr, code) = run_props(temp.path(), &["-c", "props.toml"]);
    assert_eq!(code, Some(0), "stderr: {}", stderr);
    assert_eq!(
        fs::read_to_string(temp.path().join("themes/dark.css")).unwrap(),
        ".theme-dark { --bg: black; }\n"
    );
}

#[test]
fn test_invalid_args() {
    let temp = TempDir::new().unwrap();
    let (_, code) = run_props(temp.path(), &["--stability", "0"]);
    assert_eq!(code, Some(2));
}
