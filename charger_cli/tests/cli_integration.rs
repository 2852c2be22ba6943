use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn charger() -> Command {
    Command::cargo_bin("charger_cli").expect("binary builds")
}

#[test]
fn self_check_passes_on_simulated_backend() {
    charger()
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok"));
}

#[test]
fn multi_fails_without_config_file() {
    charger()
        .args(["--config", "/nonexistent/charger.toml", "multi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn multi_rejects_duplicate_controller_names() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        file,
        r#"
[[controller]]
name = "cell"
sensor_channel = 0
pwm_channel = 0

[[controller]]
name = "cell"
sensor_channel = 1
pwm_channel = 1
"#
    )
    .expect("write config");

    charger()
        .args(["--config"])
        .arg(file.path())
        .arg("multi")
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate controller name"));
}

#[test]
fn run_rejects_unknown_profile() {
    charger()
        .args([
            "--config",
            "/nonexistent/charger.toml",
            "run",
            "--profile",
            "unobtainium",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown battery profile"));
}

#[test]
fn hybrid_flags_must_come_in_pairs() {
    charger()
        .args(["run", "--sensor-interval-ms", "10"])
        .assert()
        .failure();
}
