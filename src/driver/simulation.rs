// ============================================================================
// File: packages/adles/src/driver/simulation.rs
// ----------------------------------------------------------------------------
// In-memory platform driver.
//
// Keeps folders, networks, instances and permissions in process memory and
// records every call. Used for dry runs and as the test double of the
// executor. Failures can be injected per call kind and target.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::config::SimulationConfig;

use super::errors::{DriverError, DriverResult};
use super::trait_def::PlatformDriver;
use super::types::{
    CloneOverrides, FolderRef, GroupRef, HealthStatus, InstanceRef, NetworkDefinition,
    NetworkRef, PowerState, Role, SourceRef,
};

/// Kind of driver call, for the call log and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateFolder,
    DeleteFolder,
    CloneService,
    CreateNetwork,
    DeleteNetwork,
    ApplyPermission,
    PowerState,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::CreateFolder => "create_folder",
            CallKind::DeleteFolder => "delete_folder",
            CallKind::CloneService => "clone_service",
            CallKind::CreateNetwork => "create_network",
            CallKind::DeleteNetwork => "delete_network",
            CallKind::ApplyPermission => "apply_permission",
            CallKind::PowerState => "power_state",
        };
        f.write_str(name)
    }
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCall {
    pub kind: CallKind,
    pub target: String,
}

/// A simulated service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimInstance {
    pub source: SourceRef,
    pub overrides: CloneOverrides,
    pub power: PowerState,
}

#[derive(Debug, Clone)]
struct FailureRule {
    kind: CallKind,
    target_contains: String,
}

#[derive(Debug, Default)]
struct SimState {
    folders: BTreeSet<FolderRef>,
    networks: BTreeMap<String, NetworkDefinition>,
    instances: BTreeMap<(FolderRef, String), SimInstance>,
    permissions: BTreeSet<(FolderRef, String, Role)>,
    calls: Vec<DriverCall>,
    failures: Vec<FailureRule>,
    released: bool,
}

impl SimState {
    /// Record a call and apply release and failure rules
    fn begin(&mut self, kind: CallKind, target: String) -> DriverResult<()> {
        if self.released {
            return Err(DriverError::Released);
        }
        let injected = self
            .failures
            .iter()
            .any(|rule| rule.kind == kind && target.contains(&rule.target_contains));
        self.calls.push(DriverCall {
            kind,
            target: target.clone(),
        });
        if injected {
            return Err(DriverError::rejected(target, "injected failure"));
        }
        Ok(())
    }

    fn require_folder(&self, folder: &FolderRef) -> DriverResult<()> {
        if self.folders.contains(folder) {
            Ok(())
        } else {
            Err(DriverError::not_found(format!("folder {folder}")))
        }
    }
}

/// In-memory platform
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    state: Arc<RwLock<SimState>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when a call finishes
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulationDriver {
    pub fn new() -> Self {
        Self::with_config(&SimulationConfig::default())
    }

    pub fn with_config(config: &SimulationConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(SimState::default())),
            latency: Duration::from_millis(config.latency_ms),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add artificial latency to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every call of `kind` whose target contains `target_contains`
    pub fn fail_on<S: Into<String>>(&self, kind: CallKind, target_contains: S) {
        if let Ok(mut state) = self.state.write() {
            state.failures.push(FailureRule {
                kind,
                target_contains: target_contains.into(),
            });
        }
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.write() {
            state.failures.clear();
        }
    }

    /// Recorded calls in completion order
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state
            .read()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().map(|s| s.calls.len()).unwrap_or(0)
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.write() {
            state.calls.clear();
        }
    }

    pub fn folders(&self) -> Vec<FolderRef> {
        self.state
            .read()
            .map(|s| s.folders.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_folder(&self, folder: &FolderRef) -> bool {
        self.state
            .read()
            .map(|s| s.folders.contains(folder))
            .unwrap_or(false)
    }

    pub fn networks(&self) -> Vec<NetworkDefinition> {
        self.state
            .read()
            .map(|s| s.networks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Instances with their location
    pub fn instances(&self) -> Vec<(InstanceRef, SimInstance)> {
        self.state
            .read()
            .map(|s| {
                s.instances
                    .iter()
                    .map(|((folder, name), instance)| {
                        (InstanceRef::at(folder.clone(), name.clone()), instance.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Granted permissions as (folder, group name, role)
    pub fn permissions(&self) -> Vec<(FolderRef, String, Role)> {
        self.state
            .read()
            .map(|s| s.permissions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Highest number of concurrently executing calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(Arc::clone(&self.in_flight))
    }

    /// Run `op` against the state after the configured latency
    fn call<T, F>(&self, kind: CallKind, target: String, op: F) -> AsyncTask<DriverResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut SimState) -> DriverResult<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let latency = self.latency;
        let guard = self.enter();

        AsyncTaskBuilder::new(async move {
            let _guard = guard;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let mut state = state
                .write()
                .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
            state.begin(kind, target)?;
            op(&mut state)
        })
        .with_label(kind.to_string())
        .spawn()
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformDriver for SimulationDriver {
    fn create_folder(
        &self,
        parent: Option<FolderRef>,
        name: String,
    ) -> AsyncTask<DriverResult<FolderRef>> {
        let folder = match &parent {
            Some(parent) => parent.child(name),
            None => FolderRef::new([name]),
        };
        self.call(CallKind::CreateFolder, folder.to_string(), move |state| {
            if let Some(parent) = &parent {
                state.require_folder(parent)?;
            }
            state.folders.insert(folder.clone());
            Ok(folder)
        })
    }

    fn delete_folder(&self, folder: FolderRef, recursive: bool) -> AsyncTask<DriverResult<()>> {
        self.call(CallKind::DeleteFolder, folder.to_string(), move |state| {
            state.require_folder(&folder)?;
            let has_contents = state
                .folders
                .iter()
                .any(|f| f != &folder && f.is_within(&folder))
                || state.instances.keys().any(|(f, _)| f.is_within(&folder));
            if has_contents && !recursive {
                return Err(DriverError::rejected(
                    format!("folder {folder}"),
                    "folder is not empty",
                ));
            }
            state.folders.retain(|f| !f.is_within(&folder));
            state.instances.retain(|(f, _), _| !f.is_within(&folder));
            state.permissions.retain(|(f, _, _)| !f.is_within(&folder));
            Ok(())
        })
    }

    fn clone_service(
        &self,
        source: SourceRef,
        dest: FolderRef,
        name: String,
        overrides: CloneOverrides,
    ) -> AsyncTask<DriverResult<InstanceRef>> {
        let instance = InstanceRef::at(dest, name);
        self.call(CallKind::CloneService, instance.to_string(), move |state| {
            state.require_folder(&instance.folder)?;
            if let SourceRef::Master(master) = &source {
                let key = (master.folder.clone(), master.name.clone());
                if !state.instances.contains_key(&key) {
                    return Err(DriverError::not_found(format!("master {master}")));
                }
            }
            for nic in &overrides.nics {
                if !state.networks.contains_key(&nic.network.name) {
                    return Err(DriverError::not_found(format!("network {}", nic.network)));
                }
            }
            let key = (instance.folder.clone(), instance.name.clone());
            if state.instances.contains_key(&key) {
                return Err(DriverError::rejected(
                    format!("instance {instance}"),
                    "an instance with this name already exists",
                ));
            }
            state.instances.insert(
                key,
                SimInstance {
                    source,
                    overrides,
                    power: PowerState::Off,
                },
            );
            let id = format!("sim-{}", state.instances.len());
            Ok(instance.with_id(id))
        })
    }

    fn create_network(&self, definition: NetworkDefinition) -> AsyncTask<DriverResult<NetworkRef>> {
        self.call(
            CallKind::CreateNetwork,
            format!("network {}", definition.name),
            move |state| {
                let network = definition.network_ref();
                state
                    .networks
                    .entry(definition.name.clone())
                    .or_insert(definition);
                Ok(network)
            },
        )
    }

    fn delete_network(&self, network: NetworkRef) -> AsyncTask<DriverResult<()>> {
        self.call(
            CallKind::DeleteNetwork,
            format!("network {network}"),
            move |state| match state.networks.remove(&network.name) {
                Some(_) => Ok(()),
                None => Err(DriverError::not_found(format!("network {network}"))),
            },
        )
    }

    fn apply_permission(
        &self,
        target: FolderRef,
        group: GroupRef,
        role: Role,
    ) -> AsyncTask<DriverResult<()>> {
        self.call(
            CallKind::ApplyPermission,
            format!("{target} {group}"),
            move |state| {
                state.require_folder(&target)?;
                state
                    .permissions
                    .insert((target, group.name, role));
                Ok(())
            },
        )
    }

    fn power_state(
        &self,
        instance: InstanceRef,
        desired: PowerState,
    ) -> AsyncTask<DriverResult<()>> {
        self.call(CallKind::PowerState, instance.to_string(), move |state| {
            let key = (instance.folder.clone(), instance.name.clone());
            match state.instances.get_mut(&key) {
                Some(sim) => {
                    sim.power = desired;
                    Ok(())
                }
                None => Err(DriverError::not_found(format!("instance {instance}"))),
            }
        })
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let state = Arc::clone(&self.state);
        AsyncTaskBuilder::new(async move {
            match state.read() {
                Ok(state) if state.released => HealthStatus::unhealthy("session released"),
                Ok(state) => HealthStatus::healthy("simulated platform ready")
                    .with_metric("folders", state.folders.len().to_string())
                    .with_metric("instances", state.instances.len().to_string()),
                Err(e) => HealthStatus::unhealthy(format!("state lock poisoned: {e}")),
            }
        })
        .spawn()
    }

    fn release(&self) -> AsyncTask<DriverResult<()>> {
        let state = Arc::clone(&self.state);
        AsyncTaskBuilder::new(async move {
            let mut state = state
                .write()
                .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
            state.released = true;
            Ok(())
        })
        .spawn()
    }

    fn driver_type(&self) -> &'static str {
        "simulation"
    }
}

impl SimulationDriver {
    /// Reopen a released session, keeping platform contents
    pub fn reconnect(&self) {
        if let Ok(mut state) = self.state.write() {
            state.released = false;
        }
    }
}
