use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::config::Thresholds;
use crate::driver::{CallKind, FolderRef, NetworkDefinition, PlatformDriver, SimulationDriver};
use crate::fixtures::{TEAM_LAB, spec};
use crate::plan::{Applicability, build};
use crate::spec::NetworkKind;
use crate::resolver::resolve;

fn tree(text: &str) -> OperationTree {
    let spec = spec(text);
    let symbols = resolve(&spec).into_result().expect("spec resolves");
    build(&spec, &symbols, Thresholds::default()).expect("plan builds")
}

fn executor(sim: &SimulationDriver, text: &str) -> PhaseExecutor {
    let driver: Arc<dyn PlatformDriver> = Arc::new(sim.clone());
    PhaseExecutor::new(driver, tree(text), "team-lab")
}

async fn run(executor: &PhaseExecutor, phase: Phase) -> RunReport {
    executor
        .run(phase)
        .await
        .expect("run task joins")
        .expect("run completes")
}

fn status_of(report: &RunReport, description: &str) -> OperationStatus {
    report
        .results
        .iter()
        .find(|r| r.description.starts_with(description))
        .map(|r| r.status.clone())
        .unwrap_or_else(|| panic!("no operation starting with {description}"))
}

#[tokio::test]
async fn masters_then_deploy_clones_from_master() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);

    let masters = run(&executor, Phase::Masters).await;
    assert!(masters.is_success(), "{}", masters.render());
    assert_eq!(masters.summary().failed, 0);
    let state = executor.state().expect("state");
    assert_eq!(state.masters().count(), 1);

    let deploy = run(&executor, Phase::Deploy).await;
    assert!(deploy.is_success(), "{}", deploy.render());

    let root_creations = sim
        .calls()
        .iter()
        .filter(|c| c.kind == CallKind::CreateFolder && c.target == "/Team Lab")
        .count();
    assert_eq!(root_creations, 1);

    let clones: Vec<_> = sim
        .instances()
        .into_iter()
        .filter(|(instance, _)| instance.name == "attacker")
        .collect();
    assert_eq!(clones.len(), 2);
    for (instance, clone) in clones {
        assert!(
            matches!(&clone.source, SourceRef::Master(m) if m.name == "(MASTER) attacker"),
            "{instance} cloned from {}",
            clone.source
        );
        assert_eq!(clone.power, PowerState::On);
    }
}

#[tokio::test]
async fn deploy_without_masters_uses_template() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB).with_power_on(false);
    let report = run(&executor, Phase::Deploy).await;
    assert!(report.is_success(), "{}", report.render());

    let instances = sim.instances();
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|(_, i)| {
        i.source == SourceRef::Template("Kali 2024".into()) && i.power == PowerState::Off
    }));
    assert!(!sim.has_folder(&FolderRef::new(["Team Lab", "MASTER-FOLDERS"])));
    assert_eq!(report.summary().not_applicable, 5);
}

#[tokio::test]
async fn failed_folder_skips_its_subtree_only() {
    let sim = SimulationDriver::new();
    sim.fail_on(CallKind::CreateFolder, "team-1");
    let report = run(&executor(&sim, TEAM_LAB), Phase::Deploy).await;

    assert!(status_of(&report, "create folder /Team Lab/team-1").is_failed());
    assert_eq!(
        status_of(&report, "create service /Team Lab/team-1/attacker"),
        OperationStatus::Skipped(SkipReason::ParentFailed)
    );
    assert_eq!(
        status_of(&report, "create network Team-LAN-1"),
        OperationStatus::Skipped(SkipReason::ParentFailed)
    );
    assert_eq!(
        status_of(&report, "create service /Team Lab/team-2/attacker"),
        OperationStatus::Succeeded
    );
    assert_eq!(report.failures().count(), 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn failed_network_skips_folder_contents() {
    let sim = SimulationDriver::new();
    sim.fail_on(CallKind::CreateNetwork, "Team-LAN-2");
    let report = run(&executor(&sim, TEAM_LAB), Phase::Deploy).await;

    assert!(status_of(&report, "create network Team-LAN-2").is_failed());
    assert_eq!(
        status_of(&report, "create service /Team Lab/team-2/attacker"),
        OperationStatus::Skipped(SkipReason::PrerequisiteFailed)
    );
    assert_eq!(
        status_of(&report, "grant member on /Team Lab/team-2"),
        OperationStatus::Succeeded
    );
    assert_eq!(report.skipped_for(SkipReason::PrerequisiteFailed), 1);
}

#[tokio::test]
async fn failed_unique_network_blocks_environment() {
    let sim = SimulationDriver::new();
    sim.fail_on(CallKind::CreateNetwork, "Internet");
    let report = run(&executor(&sim, TEAM_LAB), Phase::Deploy).await;

    assert_eq!(report.summary().failed, 1);
    assert_eq!(
        status_of(&report, "create folder /Team Lab/team-1"),
        OperationStatus::Skipped(SkipReason::PrerequisiteFailed)
    );
    assert!(sim.instances().is_empty());
}

#[tokio::test]
async fn cleanup_environment_is_idempotent() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);
    run(&executor, Phase::Masters).await;
    run(&executor, Phase::Deploy).await;

    let first = run(&executor, Phase::CleanupEnvironment).await;
    assert!(first.is_success(), "{}", first.render());
    assert_eq!(first.skipped_for(SkipReason::NetworksRetained), 2);
    assert_eq!(first.skipped_for(SkipReason::NothingToUndo), 2);
    assert!(!sim.has_folder(&FolderRef::new(["Team Lab", "team-1"])));
    assert!(sim.has_folder(&FolderRef::new(["Team Lab", "MASTER-FOLDERS"])));
    assert!(sim.has_folder(&FolderRef::new(["Team Lab"])));

    let second = run(&executor, Phase::CleanupEnvironment).await;
    assert_eq!(second.summary().failed, 0, "{}", second.render());
}

#[tokio::test]
async fn cleanup_from_a_fresh_executor() {
    let sim = SimulationDriver::new();
    run(&executor(&sim, TEAM_LAB), Phase::Deploy).await;

    let later = executor(&sim, TEAM_LAB).with_cleanup_networks(true);
    let report = run(&later, Phase::CleanupEnvironment).await;
    assert!(report.is_success(), "{}", report.render());

    let networks: Vec<String> = sim.networks().into_iter().map(|n| n.name).collect();
    assert_eq!(networks, vec!["Internet"]);
    assert!(sim.instances().is_empty());
}

#[tokio::test]
async fn cleanup_masters_keeps_environment() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);
    run(&executor, Phase::Masters).await;
    run(&executor, Phase::Deploy).await;

    let report = run(&executor, Phase::CleanupMasters).await;
    assert!(report.is_success(), "{}", report.render());
    assert!(!sim.has_folder(&FolderRef::new(["Team Lab", "MASTER-FOLDERS"])));
    assert!(sim.has_folder(&FolderRef::new(["Team Lab", "team-2"])));
    assert_eq!(executor.state().expect("state").masters().count(), 0);
}

#[tokio::test]
async fn failed_child_cleanup_keeps_folder() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);
    run(&executor, Phase::Deploy).await;

    sim.fail_on(CallKind::PowerState, "team-1/attacker");
    let report = run(&executor, Phase::CleanupEnvironment).await;
    assert!(status_of(&report, "create service /Team Lab/team-1/attacker").is_failed());
    assert_eq!(
        status_of(&report, "create folder /Team Lab/team-1"),
        OperationStatus::Skipped(SkipReason::DependentFailed)
    );
    assert!(sim.has_folder(&FolderRef::new(["Team Lab", "team-1"])));
    assert!(!sim.has_folder(&FolderRef::new(["Team Lab", "team-2"])));
}

#[tokio::test]
async fn cancelled_run_makes_no_calls() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);
    executor.cancel_token().cancel();

    let report = run(&executor, Phase::Deploy).await;
    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(sim.call_count(), 0);
    assert_eq!(report.summary().succeeded, 0);
    assert_eq!(
        status_of(&report, "create folder /Team Lab/team-2"),
        OperationStatus::Skipped(SkipReason::Cancelled)
    );
}

const WIDE: &str = r#"
metadata:
  name: wide
groups:
  Staff:
    user-list: [instructor]
services:
  web:
    image: nginx:1.27
networks:
  unique-networks: {}
  generic-networks: {}
folders:
  pods:
    instances: 12
    services:
      web:
        service: web
"#;

#[tokio::test]
async fn in_flight_calls_are_bounded() {
    let sequential = SimulationDriver::new().with_latency(Duration::from_millis(5));
    let report = run(&executor(&sequential, WIDE).with_max_in_flight(1), Phase::Deploy).await;
    assert!(report.is_success(), "{}", report.render());
    assert_eq!(sequential.peak_in_flight(), 1);

    let parallel = SimulationDriver::new().with_latency(Duration::from_millis(20));
    let report = run(&executor(&parallel, WIDE).with_max_in_flight(4), Phase::Deploy).await;
    assert!(report.is_success(), "{}", report.render());
    assert!(parallel.peak_in_flight() > 1);
    assert!(parallel.peak_in_flight() <= 4);
    assert_eq!(parallel.instances().len(), 12);
}

#[tokio::test]
async fn cancelling_mid_run_stops_queued_calls() {
    let sim = SimulationDriver::new().with_latency(Duration::from_millis(20));
    let executor = executor(&sim, WIDE).with_max_in_flight(1);
    let token = executor.cancel_token();

    let watcher = {
        let sim = sim.clone();
        tokio::spawn(async move {
            while sim.call_count() < 5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let calls = sim.call_count();
            token.cancel();
            calls
        })
    };

    let report = run(&executor, Phase::Deploy).await;
    let calls_at_cancel = watcher.await.expect("watcher joins");

    assert!(report.cancelled);
    assert!(report.skipped_for(SkipReason::Cancelled) > 0, "{}", report.render());
    assert!(
        sim.call_count() <= calls_at_cancel + 1,
        "{} calls after cancelling at {calls_at_cancel}",
        sim.call_count()
    );
    assert!(sim.instances().len() < 12);
    assert_eq!(report.summary().failed, 0);
}

#[tokio::test]
async fn failed_power_on_keeps_the_clone_in_state() {
    let sim = SimulationDriver::new();
    let executor = executor(&sim, TEAM_LAB);

    sim.fail_on(CallKind::PowerState, "team-1/attacker");
    let first = run(&executor, Phase::Deploy).await;
    assert!(status_of(&first, "create service /Team Lab/team-1/attacker").is_failed());
    let state = executor.state().expect("state");
    assert!(state.instance("/Team Lab/team-1/attacker").is_some());
    assert!(!state.is_powered("/Team Lab/team-1/attacker"));

    sim.clear_failures();
    let second = run(&executor, Phase::Deploy).await;
    assert!(second.is_success(), "{}", second.render());
    let clones = sim
        .calls()
        .iter()
        .filter(|c| c.kind == CallKind::CloneService && c.target.ends_with("team-1/attacker"))
        .count();
    assert_eq!(clones, 1);
    let (_, attacker) = sim
        .instances()
        .into_iter()
        .find(|(instance, _)| instance.to_string() == "/Team Lab/team-1/attacker")
        .expect("attacker exists");
    assert_eq!(attacker.power, PowerState::On);
}

fn lan(subnet: &str) -> NetworkDefinition {
    NetworkDefinition {
        name: "LAN-1".into(),
        kind: NetworkKind::Generic,
        subnet: Some(subnet.parse().expect("subnet")),
        vlan: 2001,
        vswitch: None,
    }
}

#[tokio::test]
async fn same_network_name_with_another_definition_fails() {
    let lab = FolderRef::new(["lab"]);
    let inner = lab.child("inner");
    let mut tree = OperationTree::new();
    let root = tree.push(
        None,
        Applicability::Both,
        "folders",
        Operation::CreateFolder {
            parent: None,
            name: "lab".into(),
            folder: lab.clone(),
        },
    );
    tree.push(
        Some(root),
        Applicability::DeployOnly,
        "folders.red",
        Operation::CreateNetwork {
            definition: lan("10.0.0.0/24"),
        },
    );
    let nested = tree.push(
        Some(root),
        Applicability::Both,
        "folders.inner",
        Operation::CreateFolder {
            parent: Some(lab),
            name: "inner".into(),
            folder: inner,
        },
    );
    tree.push(
        Some(nested),
        Applicability::DeployOnly,
        "folders.inner.blue",
        Operation::CreateNetwork {
            definition: lan("10.0.2.0/24"),
        },
    );

    let sim = SimulationDriver::new();
    let driver: Arc<dyn PlatformDriver> = Arc::new(sim.clone());
    let report = run(&PhaseExecutor::new(driver, tree, "lab"), Phase::Deploy).await;

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1, "{}", report.render());
    assert_eq!(failures[0].origin, "folders.inner.blue");
    let subnets: Vec<String> = sim
        .networks()
        .into_iter()
        .filter_map(|n| n.subnet.map(|s| s.to_string()))
        .collect();
    assert_eq!(subnets, vec!["10.0.0.0/24"]);
}
