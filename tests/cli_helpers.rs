#![allow(dead_code)]

use anyhow::{bail, Result};
use assert_cmd::cargo;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::str::FromStr;
use tempfile::TempDir;

pub fn db_path(home: &TempDir) -> PathBuf {
    home.path().join(".holdings").join("data.db")
}

pub fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("holdings"));
    cmd.env("HOME", home.path());
    cmd.env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd.env("HOLDINGS_CONFIG", home.path().join("config.toml"));
    cmd.env_remove("RUST_LOG");
    cmd.arg("--no-color");
    cmd
}

pub fn run_cmd(home: &TempDir, args: &[&str]) -> Result<Output> {
    let mut cmd = base_cmd(home);
    cmd.args(args);
    let output = cmd.output()?;
    if !output.status.success() {
        bail!(
            "command failed: {:?}\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(output)
}

pub fn run_cmd_json(home: &TempDir, args: &[&str]) -> Result<Value> {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let output = run_cmd(home, &full)?;
    let stdout = String::from_utf8(output.stdout)?;
    Ok(serde_json::from_str(&stdout)?)
}

pub fn record_balance(
    home: &TempDir,
    custodian: &str,
    instrument: &str,
    date: &str,
    value: &str,
) -> Result<()> {
    run_cmd(
        home,
        &[
            "record",
            "balance",
            "--custodian",
            custodian,
            "--instrument",
            instrument,
            "--date",
            date,
            "--value",
            value,
        ],
    )?;
    Ok(())
}

pub fn summary_json(home: &TempDir) -> Result<Value> {
    run_cmd_json(home, &["summary"])
}

/// Decimals are serialized as strings
pub fn decimal(value: &Value) -> Decimal {
    let text = value.as_str().expect("decimal serialized as string");
    Decimal::from_str(text).expect("valid decimal")
}
