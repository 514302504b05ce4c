use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("lurk")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("lurk")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lurk"))
        .stdout(predicate::str::contains("--login"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn logout_without_a_session_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("lurk")
        .unwrap()
        .arg("--logout")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env("XDG_CACHE_HOME", dir.path().join("cache"))
        .env("XDG_DATA_HOME", dir.path().join("data"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out."));
}

#[test]
fn client_id_flag_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_home = dir.path().join("config");
    Command::cargo_bin("lurk")
        .unwrap()
        .args(["--client-id", "abc123"])
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", &config_home)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved Reddit app credentials"));
    let written = std::fs::read_to_string(config_home.join("lurk").join("config.yaml")).unwrap();
    assert!(written.contains("abc123"));
}
