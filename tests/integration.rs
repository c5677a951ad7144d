//! Integration tests for the decap binary.
//!
//! Note: full end-to-end tests require Chrome to be running; these focus on
//! the CLI surface.

use std::process::Command;

/// Test that the binary can show help
#[test]
fn test_help_command() {
    let output = Command::new("cargo")
        .args(["run", "--", "--help"])
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("decap") || stdout.contains("scraping daemon"),
        "Help should mention decap"
    );
}

/// Test that version command works
#[test]
fn test_version_command() {
    let output = Command::new("cargo")
        .args(["run", "--", "--version"])
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("0.") || stdout.contains("decap"),
        "Version should be shown"
    );
}
