// ============================================================================
// File: packages/adles/src/fixtures.rs
// ----------------------------------------------------------------------------
// Specification fixtures shared by unit tests
// ============================================================================

use std::path::Path;

use crate::spec::Specification;

/// Template group x2, base folder x2, one service, one incrementing network
pub const TEAM_LAB: &str = r#"
metadata:
  name: team-lab
  description: Two-team lab
  version: "1.0"
  folder-name: Team Lab
groups:
  Teams:
    instances: 2
    ad-group: Lab Team
  Staff:
    user-list: [instructor]
services:
  kali:
    template: Kali 2024
    network-interfaces: [eth0, eth1]
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
    group: Teams
    master-group: Staff
    instances: {number: 2, prefix: team}
    services:
      attacker:
        service: kali
        networks: [Team-LAN, Internet]
"#;

/// Parse a fixture, panicking on schema problems
pub fn spec(text: &str) -> Specification {
    match Specification::from_yaml_str(text, Path::new(".")) {
        Ok(spec) => spec,
        Err(e) => panic!("fixture does not parse: {:?}", e.problem_lines()),
    }
}
