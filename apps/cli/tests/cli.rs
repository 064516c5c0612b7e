//! CLI 二进制测试（配置文件放在临时目录，动作命令走仿真机械臂）

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sortbot-cli").unwrap();
    cmd.arg("--config").arg(config).env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("sortbot-cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("pick"))
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("--simulate"));
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    cli(&path)
        .args(["config", "set", "--port", "/dev/ttyUSB3", "--zone", "can=135,180"])
        .assert()
        .success();
    assert!(path.exists());

    cli(&path)
        .args(["config", "get", "port"])
        .assert()
        .success()
        .stdout("/dev/ttyUSB3\n");

    cli(&path)
        .args(["config", "get", "zones"])
        .assert()
        .success()
        .stdout(predicate::str::contains("can"))
        .stdout(predicate::str::contains("135°"));
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    cli(&path)
        .args(["config", "set", "--zone", "can=400,180"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));

    cli(&path)
        .args(["config", "set", "--scan-speed", "0"])
        .assert()
        .failure();
    assert!(!path.exists());
}

#[test]
fn test_config_check_without_file() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("使用默认值"));
}

#[test]
fn test_simulated_check() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["--simulate", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("自检通过"));
}

#[test]
fn test_simulated_angles_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = cli(&dir.path().join("config.toml"))
        .args(["--simulate", "angles", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let json_start = stdout.find('{').unwrap();
    let angles: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(angles["base"], 0.0);
    assert_eq!(angles["shoulder"], 300.0);
}

#[test]
fn test_simulated_run() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["--simulate", "run", "--yes", "--index", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("自检通过"))
        .stdout(predicate::str::contains("objects scanned"))
        .stdout(predicate::str::contains("已放到 270°/200mm"));
}

#[test]
fn test_pick_unknown_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir.path().join("config.toml"))
        .args(["--simulate", "pick", "--yes", "--index", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("object 9 not found"));
}
