// ============================================================================
// File: packages/adles/tests/cli_tests.rs
// ----------------------------------------------------------------------------
// Command line behaviour and exit codes
// ============================================================================

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn adles() -> Command {
    let mut cmd = Command::cargo_bin("adles").expect("binary builds");
    cmd.env_remove("RUST_LOG")
        .env_remove("ADLES_MAX_IN_FLIGHT")
        .arg("--no-color");
    cmd
}

#[test]
fn validate_accepts_the_demo() {
    adles()
        .arg("validate")
        .arg(demo("team-lab.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("valid exercise specification"));
}

#[test]
fn validate_reports_every_unresolved_label() {
    let temp = assert_fs::TempDir::new().expect("tempdir");
    let text = std::fs::read_to_string(demo("team-lab.yaml"))
        .expect("demo readable")
        .replace("service: kali", "service: parrot")
        .replace("networks: [Team-LAN, Internet]", "networks: [Team-WAN, Internet]");
    let spec = temp.child("broken.yaml");
    spec.write_str(&text).expect("write spec");

    adles()
        .arg("validate")
        .arg(spec.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unresolved references (2 errors)"))
        .stderr(predicate::str::contains("service \"parrot\" is not defined"))
        .stderr(predicate::str::contains("network \"Team-WAN\" is not defined"));
}

#[test]
fn validate_infra_and_package() {
    adles()
        .args(["validate", "-t", "infra"])
        .arg(demo("infra-docker.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("for the docker platform"));

    adles()
        .args(["validate", "--type", "package"])
        .arg(demo("package.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("valid package specification"))
        .stdout(predicate::str::contains("warning: contents.scoring: not specified"));
}

#[test]
fn validate_applies_the_infrastructure_thresholds() {
    let temp = assert_fs::TempDir::new().expect("tempdir");
    let infra = temp.child("strict.yaml");
    infra
        .write_str("simulation: {}\nthresholds:\n  folder: {warn: 1, error: 1}\n")
        .expect("write infra");

    adles()
        .arg("validate")
        .arg("--infra")
        .arg(infra.path())
        .arg(demo("team-lab.yaml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("instancing failed"))
        .stderr(predicate::str::contains("folders.teams.instances"));
}

#[test]
fn plan_prints_the_operation_tree() {
    adles()
        .arg("plan")
        .arg(demo("team-lab.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[both] create folder /Team Lab\n"))
        .stdout(predicate::str::contains("[master] create folder /Team Lab/MASTER-FOLDERS"))
        .stdout(predicate::str::contains("[deploy] create network Team-LAN-2"));
}

#[test]
fn deploy_and_cleanup_on_the_simulation() {
    adles()
        .args(["deploy", "--max-in-flight", "2"])
        .arg(demo("team-lab.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy of team-lab"))
        .stdout(predicate::str::contains(" 0 failed"));

    adles()
        .args(["cleanup", "-t", "environment", "--cleanup-nets"])
        .arg(demo("team-lab.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("cleanup-environment of team-lab"));
}

#[test]
fn package_resolves_its_environment() {
    adles()
        .arg("package")
        .arg(demo("package.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "package team-lab-package: environment team-lab",
        ))
        .stdout(predicate::str::contains("on the simulation platform"));
}

#[test]
fn unsupported_platform_is_a_configuration_failure() {
    let temp = assert_fs::TempDir::new().expect("tempdir");
    let infra = temp.child("vsphere.yaml");
    infra
        .write_str("vmware-vsphere:\n  hostname: vcenter.lab\n")
        .expect("write infra");

    adles()
        .arg("deploy")
        .arg("--infra")
        .arg(infra.path())
        .arg(demo("team-lab.yaml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no driver is available"));
}

#[test]
fn missing_file_fails_cleanly() {
    adles()
        .args(["plan", "does-not-exist.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not read does-not-exist.yaml"));
}
