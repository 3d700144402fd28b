//! CLI integration tests for the offline subcommands.
//!
//! Uses `assert_cmd` to spawn the `wastetrack` binary and verify
//! exit codes, stdout content, and stderr content.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper: create a Command for the `wastetrack` binary with a clean
/// environment for the variables it reads.
fn wastetrack() -> Command {
    let mut cmd = cargo_bin_cmd!("wastetrack");
    cmd.env_remove("WASTETRACK_CONFIG");
    cmd.env_remove("WASTETRACK_LOG");
    cmd
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    wastetrack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Waste item lifecycle and tracking service",
        ));
}

#[test]
fn help_lists_subcommands() {
    wastetrack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn version_flag() {
    wastetrack()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wastetrack"));
}

#[test]
fn unknown_subcommand_fails() {
    wastetrack().arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. normalize
// ──────────────────────────────────────────────

#[test]
fn normalize_valid_pair() {
    wastetrack()
        .args(["normalize", "13.35", "123.30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 13.35, 123.3"));
}

#[test]
fn normalize_swapped_pair_json() {
    let output = wastetrack()
        .args(["--output", "json", "normalize", "123.30", "13.35"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["result"], "swapped");
    assert_eq!(json["latitude"], 13.35);
    assert_eq!(json["longitude"], 123.3);
    assert_eq!(
        json["warning"],
        "Device coordinates looked swapped and were corrected"
    );
}

#[test]
fn normalize_prefers_device_pair() {
    let output = wastetrack()
        .args([
            "--output",
            "json",
            "normalize",
            "13.20",
            "123.20",
            "--device-latitude",
            "13.40",
            "--device-longitude",
            "123.40",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["latitude"], 13.4);
    assert_eq!(json["longitude"], 123.4);
}

#[test]
fn normalize_out_of_region_is_kept_with_note() {
    wastetrack()
        .args(["normalize", "14.60", "121.00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 14.6, 121"))
        .stdout(predicate::str::contains("outside the coverage area"));
}

#[test]
fn normalize_dropped_exits_1() {
    wastetrack()
        .args(["normalize", "abc", "123.30"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("dropped"))
        .stderr(predicate::str::contains(
            "Device coordinates were invalid and were not stored",
        ));
}

#[test]
fn normalize_negative_out_of_range_is_dropped() {
    wastetrack()
        .args(["normalize", "-200", "500"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("dropped"));
}

#[test]
fn normalize_absent_exits_1() {
    wastetrack()
        .arg("normalize")
        .assert()
        .failure()
        .stdout(predicate::str::contains("absent"));
}

#[test]
fn normalize_uses_configured_box() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wastetrack.toml");
    fs::write(
        &path,
        "[coverage.bbox]\nmin_lat = 14.0\nmax_lat = 15.0\nmin_lon = 120.0\nmax_lon = 122.0\n",
    )
    .unwrap();

    wastetrack()
        .args(["normalize", "14.60", "121.00", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("outside the coverage area").not());
}

// ──────────────────────────────────────────────
// 3. check-config
// ──────────────────────────────────────────────

#[test]
fn check_config_defaults() {
    wastetrack()
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Configuration OK: Nabua, Camarines Sur (UTC+8), 0 barangay(s), 0 collector(s)",
        ));
}

#[test]
fn check_config_json_prints_effective_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wastetrack.toml");
    fs::write(
        &path,
        r#"
item_id_prefix = "NB"

[[barangays]]
id = 1
name = "San Roque"
code = "SR"
municipality = "Nabua"
province = "Camarines Sur"
"#,
    )
    .unwrap();

    let output = wastetrack()
        .args(["--output", "json", "check-config", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["item_id_prefix"], "NB");
    assert_eq!(json["timezone_offset_hours"], 8);
    assert_eq!(json["barangays"][0]["name"], "San Roque");
    assert_eq!(json["presence"]["live_secs"], 120);
}

#[test]
fn check_config_rejects_invalid_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wastetrack.toml");
    fs::write(&path, "[presence]\nlive_secs = 900\nrecent_secs = 120\n").unwrap();

    wastetrack()
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn check_config_reports_unreadable_file() {
    wastetrack()
        .args(["check-config", "--config", "/nonexistent/wastetrack.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/wastetrack.toml"));
}

#[test]
fn check_config_reads_env_var() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wastetrack.toml");
    fs::write(&path, "timezone_offset_hours = 7\n").unwrap();

    wastetrack()
        .env("WASTETRACK_CONFIG", &path)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("(UTC+7)"));
}

#[test]
fn serve_rejects_lone_tls_flag() {
    wastetrack()
        .args(["serve", "--tls-cert", "cert.pem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tls-cert and --tls-key"));
}
