use pretty_assertions::assert_eq;

use super::*;
use crate::config::{Threshold, Thresholds};
use crate::driver::{FolderRef, Role};
use crate::error::AdlesError;
use crate::fixtures::{TEAM_LAB, spec};
use crate::resolver::resolve;

const NESTED: &str = r#"
metadata:
  name: nested
  prefix: "x-"
groups:
  Staff:
    user-list: [instructor]
  Crew:
    user-list: [ann, bob, cid]
services:
  web:
    image: nginx:1.27
    network-interfaces: [eth0]
networks:
  unique-networks: {}
  generic-networks:
    LAN:
      subnet: 10.1.0.0/24
      increment: true
    Shared:
      subnet: 10.9.0.0/24
folders:
  region:
    instances: 2
    site:
      instances: {size-of: Crew}
      services:
        www:
          service: web
          networks: [LAN]
  ops:
    group: Staff
    services:
      monitor:
        service: web
        networks: {eth0: Shared}
"#;

fn plan(text: &str) -> OperationTree {
    try_plan(text).expect("plan builds")
}

fn try_plan(text: &str) -> Result<OperationTree, AdlesError> {
    let spec = spec(text);
    let symbols = resolve(&spec).into_result().expect("spec resolves");
    build(&spec, &symbols, Thresholds::default())
}

fn folders(tree: &OperationTree, applicability: Applicability) -> Vec<String> {
    tree.iter()
        .filter(|node| node.applicability == applicability)
        .filter_map(|node| node.operation.created_folder())
        .map(ToString::to_string)
        .collect()
}

fn networks(tree: &OperationTree) -> Vec<(String, Option<String>, u16)> {
    tree.iter()
        .filter_map(|node| match &node.operation {
            Operation::CreateNetwork { definition } => Some((
                definition.name.clone(),
                definition.subnet.map(|s| s.to_string()),
                definition.vlan,
            )),
            _ => None,
        })
        .collect()
}

fn services(tree: &OperationTree) -> Vec<&ServiceOperation> {
    tree.iter()
        .filter_map(|node| match &node.operation {
            Operation::CreateService(service) => Some(service),
            _ => None,
        })
        .collect()
}

#[test]
fn team_lab_layout() {
    let tree = plan(TEAM_LAB);

    assert_eq!(folders(&tree, Applicability::Both), vec!["/Team Lab"]);
    assert_eq!(
        folders(&tree, Applicability::MasterOnly),
        vec!["/Team Lab/MASTER-FOLDERS", "/Team Lab/MASTER-FOLDERS/(MASTER) teams"]
    );
    assert_eq!(
        folders(&tree, Applicability::DeployOnly),
        vec!["/Team Lab/team-1", "/Team Lab/team-2"]
    );

    assert_eq!(
        networks(&tree),
        vec![
            ("Internet".to_string(), Some("172.16.0.0/24".to_string()), 100),
            ("(MASTER) Team-LAN".to_string(), Some("10.0.0.0/24".to_string()), 2001),
            ("Team-LAN-1".to_string(), Some("10.0.0.0/24".to_string()), 2002),
            ("Team-LAN-2".to_string(), Some("10.0.1.0/24".to_string()), 2003),
        ]
    );

    let services = services(&tree);
    let names: Vec<String> = services.iter().map(|s| s.instance().to_string()).collect();
    assert_eq!(
        names,
        vec![
            "/Team Lab/MASTER-FOLDERS/(MASTER) teams/(MASTER) attacker",
            "/Team Lab/team-1/attacker",
            "/Team Lab/team-2/attacker",
        ]
    );
    assert!(services[0].master);
    assert!(services.iter().all(|s| s.master_key == services[0].master_key));
    assert_eq!(services[0].master_key.to_string(), "folders.teams.services.attacker");

    let nics: Vec<String> = services[2]
        .nics
        .iter()
        .map(|nic| format!("{}={}", nic.interface, nic.network))
        .collect();
    assert_eq!(nics, vec!["eth0=Team-LAN-2", "eth1=Internet"]);
    assert_eq!(services[0].nics[0].network.name, "(MASTER) Team-LAN");
}

#[test]
fn template_group_instances_pair_with_folder_instances() {
    let tree = plan(TEAM_LAB);
    let grants: Vec<(String, String, Role)> = tree
        .iter()
        .filter_map(|node| match &node.operation {
            Operation::ApplyPermission {
                target,
                group,
                role,
            } => Some((target.to_string(), group.name.clone(), *role)),
            _ => None,
        })
        .collect();
    assert_eq!(
        grants,
        vec![
            (
                "/Team Lab/MASTER-FOLDERS/(MASTER) teams".to_string(),
                "Staff".to_string(),
                Role::Master
            ),
            ("/Team Lab/team-1".to_string(), "Lab Team-1".to_string(), Role::Member),
            ("/Team Lab/team-2".to_string(), "Lab Team-2".to_string(), Role::Member),
        ]
    );
}

#[test]
fn unpaired_template_group_is_granted_everywhere() {
    let text = TEAM_LAB.replace("instances: {number: 2, prefix: team}", "instances: 3");
    let tree = plan(&text);
    let members = tree.count(|node| {
        matches!(
            node.operation,
            Operation::ApplyPermission {
                role: Role::Member,
                ..
            }
        )
    });
    assert_eq!(members, 6);
}

#[test]
fn ancestors_precede_descendants() {
    let tree = plan(NESTED);
    let order = tree.creation_order();
    assert_eq!(order.len(), tree.len());
    let position = |id: OperationId| order.iter().position(|o| *o == id).expect("in order");

    for node in tree.iter() {
        for ancestor in tree.ancestors(node.id) {
            assert!(position(ancestor) < position(node.id));
        }
        // permissions and networks come before other siblings
        let mut seen_other = false;
        for child in &node.children {
            let child = tree.get(*child).expect("child exists");
            if child.operation.is_prerequisite() {
                assert!(!seen_other, "prerequisite after content under {}", node.operation);
            } else {
                seen_other = true;
            }
        }
    }

    let cleanup = tree.cleanup_order();
    let cleanup_position =
        |id: OperationId| cleanup.iter().position(|o| *o == id).expect("in cleanup");
    for node in tree.iter() {
        if let Some(parent) = node.parent {
            assert!(cleanup_position(node.id) < cleanup_position(parent));
        }
    }
}

#[test]
fn generic_networks_bind_to_nearest_instanced_folder() {
    let tree = plan(NESTED);
    let networks = networks(&tree);
    let names: Vec<&str> = networks.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "x-Shared",
            "(MASTER) x-LAN",
            "(MASTER) x-Shared",
            "x-LAN-1-1",
            "x-LAN-1-2",
            "x-LAN-1-3",
            "x-LAN-2-1",
            "x-LAN-2-2",
            "x-LAN-2-3",
        ]
    );

    let lan_subnets: Vec<&str> = networks[3..]
        .iter()
        .filter_map(|(_, subnet, _)| subnet.as_deref())
        .collect();
    assert_eq!(
        lan_subnets,
        vec![
            "10.1.0.0/24",
            "10.1.1.0/24",
            "10.1.2.0/24",
            "10.1.3.0/24",
            "10.1.4.0/24",
            "10.1.5.0/24",
        ]
    );

    let mut vlans: Vec<u16> = networks.iter().map(|(_, _, vlan)| *vlan).collect();
    vlans.sort_unstable();
    vlans.dedup();
    assert_eq!(vlans.len(), networks.len());

    let shared = tree
        .iter()
        .find(|node| {
            matches!(&node.operation, Operation::CreateNetwork { definition } if definition.name == "x-Shared")
        })
        .expect("root-bound network");
    assert_eq!(shared.applicability, Applicability::DeployOnly);
    assert_eq!(shared.depth, 1);
}

#[test]
fn image_services_have_no_masters() {
    let tree = plan(NESTED);
    let services = services(&tree);
    assert!(services.iter().all(|s| !s.master));
    assert_eq!(services.len(), 7);

    let site = FolderRef::new(["nested", "region-2", "site-3"]);
    assert!(services.iter().any(|s| s.folder == site && s.name == "www"));
    assert_eq!(
        folders(&tree, Applicability::MasterOnly),
        vec![
            "/nested/MASTER-FOLDERS",
            "/nested/MASTER-FOLDERS/(MASTER) region",
            "/nested/MASTER-FOLDERS/(MASTER) region/(MASTER) site",
            "/nested/MASTER-FOLDERS/(MASTER) ops",
        ]
    );
}

#[test]
fn disabled_folder_contributes_nothing() {
    let text = TEAM_LAB.replace(
        "    instances: {number: 2, prefix: team}\n",
        "    instances: {number: 2, prefix: team}\n    enabled: false\n",
    );
    let tree = plan(&text);
    assert_eq!(tree.len(), 3);
    assert!(services(&tree).is_empty());
    assert_eq!(folders(&tree, Applicability::DeployOnly), Vec::<String>::new());
}

#[test]
fn root_path_folders_are_shared() {
    let text = TEAM_LAB.replace(
        "  folder-name: Team Lab\n",
        "  folder-name: Team Lab\n  root-path: Datacenter/labs\n",
    );
    let tree = plan(&text);
    assert_eq!(
        folders(&tree, Applicability::Both),
        vec!["/Datacenter", "/Datacenter/labs", "/Datacenter/labs/Team Lab"]
    );
    assert_eq!(tree.roots().len(), 1);
}

#[test]
fn instancing_problems_are_collected() {
    let text = TEAM_LAB.replace(
        "folders:\n",
        "folders:\n  lab:\n    services:\n      crowd:\n        service: kali\n        instances: 100\n",
    );
    let spec = spec(&text);
    let symbols = resolve(&spec).into_result().expect("spec resolves");
    let strict = Thresholds {
        folder: Threshold { warn: 1, error: 1 },
        ..Thresholds::default()
    };
    let err = build(&spec, &symbols, strict).expect_err("counts over thresholds");
    let AdlesError::Instancing { problems } = err else {
        panic!("expected an instancing error, got {err:?}");
    };
    let paths: Vec<&str> = problems.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "folders.lab.services.crowd.instances",
            "folders.teams.instances",
        ]
    );
}

const SHARED_LAN: &str = r#"
metadata:
  name: shared
services:
  web:
    image: nginx:1.27
networks:
  unique-networks: {}
  generic-networks:
    LAN:
      subnet: 10.0.0.0/24
      increment: true
folders:
  red:
    instances: 2
    services:
      web:
        service: web
        networks: [LAN]
  blue:
    instances: 2
    services:
      web:
        service: web
        networks: [LAN]
"#;

#[test]
fn shared_generic_network_names_stay_unique() {
    let tree = plan(SHARED_LAN);
    let deployed: Vec<(String, Option<String>)> = networks(&tree)
        .into_iter()
        .filter(|(name, _, _)| !name.starts_with(MASTER_PREFIX))
        .map(|(name, subnet, _)| (name, subnet))
        .collect();
    assert_eq!(
        deployed,
        vec![
            ("LAN-red-1".to_string(), Some("10.0.0.0/24".to_string())),
            ("LAN-red-2".to_string(), Some("10.0.1.0/24".to_string())),
            ("LAN-blue-1".to_string(), Some("10.0.2.0/24".to_string())),
            ("LAN-blue-2".to_string(), Some("10.0.3.0/24".to_string())),
        ]
    );

    let mut names: Vec<String> = networks(&tree).into_iter().map(|(name, _, _)| name).collect();
    let planned = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), planned);

    let blue = services(&tree)
        .into_iter()
        .find(|s| s.instance().to_string() == "/shared/blue-1/web")
        .expect("blue-1 web");
    let attached: Vec<String> = blue.nics.iter().map(|n| n.network.to_string()).collect();
    assert_eq!(attached, vec!["LAN-blue-1"]);
}

#[test]
fn colliding_network_names_are_problems() {
    let text = SHARED_LAN.replace(
        "  unique-networks: {}\n",
        "  unique-networks:\n    LAN-red-1:\n      subnet: 192.168.0.0/24\n",
    );
    let err = try_plan(&text).expect_err("LAN-red-1 is planned twice");
    let AdlesError::Instancing { problems } = err else {
        panic!("expected an instancing error, got {err:?}");
    };
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].path, "folders.red");
    assert!(problems[0].message.contains("networks.unique-networks.LAN-red-1"));
}

#[test]
fn warn_threshold_is_not_fatal() {
    let spec = spec(TEAM_LAB);
    let symbols = resolve(&spec).into_result().expect("resolves");
    let thresholds = Thresholds {
        folder: Threshold { warn: 1, error: 2 },
        ..Thresholds::default()
    };
    let tree = build(&spec, &symbols, thresholds).expect("two folders are allowed");
    assert_eq!(folders(&tree, Applicability::DeployOnly).len(), 2);

    let strict = Thresholds {
        folder: Threshold { warn: 1, error: 1 },
        ..Thresholds::default()
    };
    assert!(build(&spec, &symbols, strict).is_err());
}

#[test]
fn render_indents_by_depth() {
    let rendered = plan(TEAM_LAB).render();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "[both] create folder /Team Lab");
    assert_eq!(lines[1], "  [both] create network Internet (vlan 100, 172.16.0.0/24)");
    assert!(lines.contains(&"    [deploy] grant member on /Team Lab/team-1 to Lab Team-1"));
}
