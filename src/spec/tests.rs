use std::path::Path;

use super::*;

const EXERCISE: &str = r#"
metadata:
  name: intro-lab
  description: Introductory networking lab
  version: "1.0"
  folder-name: Intro Lab
groups:
  Students:
    instances: 2
    ad-group: Lab Students
  Instructors:
    user-list: [prof]
services:
  kali:
    template: Kali 2024
    network-interfaces: [eth0]
networks:
  unique-networks:
    Internet:
      subnet: 172.16.0.0/24
      vlan: 100
  generic-networks:
    Team-LAN:
      subnet: 10.0.0.0/24
      increment: true
folders:
  teams:
    group: Students
    master-group: Instructors
    instances: {number: 2, prefix: team}
    services:
      attacker:
        service: kali
        networks: [Team-LAN]
"#;

#[test]
fn parses_complete_exercise() {
    let spec = Specification::from_yaml_str(EXERCISE, Path::new(".")).expect("valid spec");
    assert_eq!(spec.metadata.root_folder_name(), "Intro Lab");
    assert_eq!(spec.groups.len(), 2);
    assert!(spec.groups["Students"].is_template());
    assert_eq!(spec.services.len(), 1);
    assert!(spec.networks.get("Team-LAN").is_some());
    assert_eq!(spec.folders.len(), 1);
    assert!(spec.folders[0].is_base());
    assert!(spec.warnings.is_empty());
}

#[test]
fn collects_every_schema_problem() {
    let text = r#"
metadata:
  name: broken
groups:
  Bad: {}
services:
  nothing: {note: empty}
networks:
  unique-networks:
    LAN: {subnet: 10.0.0.1/24}
"#;
    let err = Specification::from_yaml_str(text, Path::new(".")).expect_err("invalid spec");
    let lines = err.problem_lines();
    assert!(lines.iter().any(|l| l.starts_with("folders:")), "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("groups.Bad:")), "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("services.nothing:")), "{lines:?}");
    assert!(lines.iter().any(|l| l.starts_with("networks:")), "{lines:?}");
}

#[test]
fn unknown_section_is_a_warning() {
    let text = format!("{EXERCISE}\nextras:\n  anything: 1\n");
    let spec = Specification::from_yaml_str(&text, Path::new(".")).expect("valid spec");
    assert_eq!(spec.warnings.len(), 1);
    assert_eq!(spec.warnings[0].path, "extras");
}

#[test]
fn name_defaults_to_file_stem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("range-day.yaml");
    let text = EXERCISE.replace("  name: intro-lab\n", "");
    std::fs::write(&path, text).expect("write spec");

    let spec = Specification::from_path(&path).expect("valid spec");
    assert_eq!(spec.metadata.name.as_deref(), Some("range-day"));
    assert_eq!(spec.base_dir(), Some(dir.path()));
}

#[test]
fn missing_file_is_io_error() {
    let err = Specification::from_path(Path::new("/nonexistent/exercise.yaml"))
        .expect_err("missing file");
    assert!(matches!(err, AdlesError::Io { .. }));
}
