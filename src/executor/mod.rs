// ============================================================================
// File: packages/adles/src/executor/mod.rs
// ----------------------------------------------------------------------------
// Phase executor: walks the operation tree against a platform driver.
//
// Provides phase-filtered execution of the operation tree with:
// - Parent-before-child creation and child-before-parent cleanup
// - Concurrent sibling subtrees bounded by a driver call semaphore
// - Failure containment (failed subtrees are skipped, not retried)
// - Cooperative cancellation
// ============================================================================

mod report;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use report::{OperationResult, RunReport, RunSummary};
pub use state::PhaseState;
pub use types::{CancelToken, OperationStatus, Phase, SkipReason};

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::config::DEFAULT_MAX_IN_FLIGHT;
use crate::driver::{DriverError, DriverResult, PlatformDriver, PowerState, SourceRef};
use crate::error::{AdlesError, AdlesResult};
use crate::plan::{Operation, OperationId, OperationTree, ServiceOperation};

/// Executes phases of one operation tree
///
/// The Phase State is shared by every phase run through the same executor,
/// so a deploy following a masters run clones from the registered masters.
#[derive(Debug, Clone)]
pub struct PhaseExecutor {
    driver: Arc<dyn PlatformDriver>,
    tree: Arc<OperationTree>,
    environment: String,
    state: Arc<RwLock<PhaseState>>,
    max_in_flight: usize,
    power_on: bool,
    cleanup_networks: bool,
    cancel: CancelToken,
}

impl PhaseExecutor {
    /// Create an executor
    ///
    /// # Arguments
    /// * `driver` - Platform driver, usually from a `DriverSession`
    /// * `tree` - Operation tree of the environment
    /// * `environment` - Environment name used in logs and reports
    pub fn new<S: Into<String>>(
        driver: Arc<dyn PlatformDriver>,
        tree: OperationTree,
        environment: S,
    ) -> Self {
        Self {
            driver,
            tree: Arc::new(tree),
            environment: environment.into(),
            state: Arc::new(RwLock::new(PhaseState::new())),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            power_on: true,
            cleanup_networks: false,
            cancel: CancelToken::new(),
        }
    }

    /// Cap concurrent driver calls, 1 runs everything sequentially
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Power on clones after the deploy phase creates them
    pub fn with_power_on(mut self, power_on: bool) -> Self {
        self.power_on = power_on;
        self
    }

    /// Delete networks during cleanup
    pub fn with_cleanup_networks(mut self, cleanup_networks: bool) -> Self {
        self.cleanup_networks = cleanup_networks;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn tree(&self) -> &OperationTree {
        &self.tree
    }

    /// Snapshot of the Phase State
    pub fn state(&self) -> AdlesResult<PhaseState> {
        self.state
            .read()
            .map(|state| state.clone())
            .map_err(|e| AdlesError::internal(format!("Failed to acquire read lock: {e}")))
    }

    /// Run one phase
    ///
    /// # Arguments
    /// * `phase` - Phase to execute
    ///
    /// # Returns
    /// AsyncTask resolving to the run report. Operation failures are part of
    /// the report; only internal faults are errors.
    pub fn run(&self, phase: Phase) -> AsyncTask<AdlesResult<RunReport>> {
        let context = Arc::new(RunContext {
            driver: Arc::clone(&self.driver),
            tree: Arc::clone(&self.tree),
            state: Arc::clone(&self.state),
            statuses: RwLock::new(vec![OperationStatus::Pending; self.tree.len()]),
            permits: Semaphore::new(self.max_in_flight),
            phase,
            power_on: self.power_on,
            cleanup_networks: self.cleanup_networks,
            cancel: self.cancel.clone(),
        });
        let environment = self.environment.clone();
        let max_in_flight = self.max_in_flight;

        AsyncTaskBuilder::new(async move {
            let run_id = Uuid::new_v4();
            let started_at = Utc::now();
            log::info!(
                "starting {phase} of {environment} on {} (run {run_id}, {} operations, max {max_in_flight} in flight) at {}",
                context.driver.driver_type(),
                context.tree.len(),
                started_at.to_rfc3339()
            );

            let roots: Vec<OperationId> = context.tree.roots().to_vec();
            let mut set = JoinSet::new();
            for root in roots {
                let context = Arc::clone(&context);
                set.spawn(async move {
                    if context.phase.is_cleanup() {
                        cleanup_node(context, root).await;
                    } else {
                        create_node(context, root).await;
                    }
                });
            }
            while let Some(joined) = set.join_next().await {
                joined.map_err(|e| AdlesError::internal(format!("executor task failed: {e}")))?;
            }

            let statuses = context
                .statuses
                .read()
                .map_err(|e| AdlesError::internal(format!("Failed to acquire read lock: {e}")))?
                .clone();
            let results = context
                .tree
                .iter()
                .map(|node| OperationResult {
                    id: node.id.0,
                    kind: node.operation.kind_name(),
                    description: node.operation.to_string(),
                    origin: node.origin.clone(),
                    status: statuses[node.id.0].clone(),
                })
                .collect();

            let report = RunReport {
                run_id,
                phase,
                environment,
                driver: context.driver.driver_type().to_string(),
                started_at,
                finished_at: Utc::now(),
                cancelled: context.cancel.is_cancelled(),
                results,
            };
            log::info!(
                "finished {phase} of {} (run {run_id}) at {}: {}",
                report.environment,
                report.finished_at.to_rfc3339(),
                report.summary()
            );
            Ok(report)
        })
        .with_label(format!("phase {phase}"))
        .spawn()
    }
}

/// Shared state of one phase run
#[derive(Debug)]
struct RunContext {
    driver: Arc<dyn PlatformDriver>,
    tree: Arc<OperationTree>,
    state: Arc<RwLock<PhaseState>>,
    statuses: RwLock<Vec<OperationStatus>>,
    permits: Semaphore,
    phase: Phase,
    power_on: bool,
    cleanup_networks: bool,
    cancel: CancelToken,
}

type NodeFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// How a creation operation ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Cancelled,
}

impl RunContext {
    fn status(&self, id: OperationId) -> OperationStatus {
        self.statuses
            .read()
            .ok()
            .and_then(|statuses| statuses.get(id.0).cloned())
            .unwrap_or(OperationStatus::Pending)
    }

    fn set_status(&self, id: OperationId, status: OperationStatus) {
        match self.statuses.write() {
            Ok(mut statuses) => {
                if let Some(slot) = statuses.get_mut(id.0) {
                    *slot = status;
                }
            }
            Err(e) => log::error!("Failed to acquire write lock: {e}"),
        }
    }

    fn applies(&self, id: OperationId) -> bool {
        self.tree
            .get(id)
            .is_some_and(|node| self.phase.applies(node.applicability))
    }

    /// Mark a node and its pending descendants skipped
    ///
    /// Operations of other phases keep `phase-mismatch`.
    fn skip_subtree(&self, id: OperationId, reason: SkipReason) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if self.status(id).is_pending() {
            let reason = if self.applies(id) {
                reason
            } else {
                SkipReason::PhaseMismatch
            };
            self.set_status(id, OperationStatus::Skipped(reason));
        }
        for child in &node.children {
            self.skip_subtree(*child, reason);
        }
    }

    fn read_state<T>(&self, read: impl FnOnce(&PhaseState) -> T) -> DriverResult<T> {
        let state = self
            .state
            .read()
            .map_err(|e| DriverError::internal(format!("Failed to acquire read lock: {e}")))?;
        Ok(read(&state))
    }

    fn write_state(&self, write: impl FnOnce(&mut PhaseState)) -> DriverResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
        write(&mut state);
        Ok(())
    }

    /// Await a driver task while holding an in-flight permit
    async fn call<T>(&self, task: AsyncTask<DriverResult<T>>) -> DriverResult<T> {
        task.await
            .map_err(|e| DriverError::internal(format!("driver task failed: {e}")))?
    }

    /// Wait for an in-flight permit
    ///
    /// Resolves to `None` when the run was cancelled during the wait.
    async fn permit(&self) -> DriverResult<Option<tokio::sync::SemaphorePermit<'_>>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DriverError::internal(format!("in-flight limiter closed: {e}")))?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(permit))
    }

    /// Perform a creation operation
    async fn create(&self, operation: &Operation) -> DriverResult<Outcome> {
        match operation {
            Operation::CreateFolder {
                parent,
                name,
                folder,
            } => {
                if self.read_state(|s| s.has_folder(folder))? {
                    log::debug!("folder {folder} already created in this run");
                    return Ok(Outcome::Done);
                }
                let Some(_permit) = self.permit().await? else {
                    return Ok(Outcome::Cancelled);
                };
                let created = self
                    .call(self.driver.create_folder(parent.clone(), name.clone()))
                    .await?;
                self.write_state(|s| s.record_folder(created))?;
                Ok(Outcome::Done)
            }
            Operation::ApplyPermission {
                target,
                group,
                role,
            } => {
                if group.directory {
                    log::debug!("granting {role} on {target} to directory group {group}");
                }
                let Some(_permit) = self.permit().await? else {
                    return Ok(Outcome::Cancelled);
                };
                self.call(
                    self.driver
                        .apply_permission(target.clone(), group.clone(), *role),
                )
                .await?;
                Ok(Outcome::Done)
            }
            Operation::CreateNetwork { definition } => {
                match self.read_state(|s| s.network(&definition.name).cloned())? {
                    Some(existing) if existing == *definition => {
                        log::debug!("network {} already created in this run", definition.name);
                        return Ok(Outcome::Done);
                    }
                    Some(_) => {
                        return Err(DriverError::rejected(
                            format!("network {}", definition.name),
                            "a network with this name was created with a different definition",
                        ));
                    }
                    None => {}
                }
                let Some(_permit) = self.permit().await? else {
                    return Ok(Outcome::Cancelled);
                };
                self.call(self.driver.create_network(definition.clone()))
                    .await?;
                self.write_state(|s| s.record_network(definition.clone()))?;
                Ok(Outcome::Done)
            }
            Operation::CreateService(service) => self.create_service(service).await,
        }
    }

    async fn create_service(&self, service: &ServiceOperation) -> DriverResult<Outcome> {
        let path = service.instance().to_string();
        let instance = match self.read_state(|s| s.instance(&path).cloned())? {
            Some(instance) => {
                log::debug!("instance {path} already created in this run");
                instance
            }
            None => {
                let source = if service.master {
                    service.source()
                } else {
                    match self.read_state(|s| s.master(&service.master_key).cloned())? {
                        Some(master) => SourceRef::Master(master),
                        None => {
                            if service.kind.is_masterable() {
                                log::debug!(
                                    "no master registered for {}, cloning {path} from {}",
                                    service.master_key,
                                    service.kind
                                );
                            }
                            service.source()
                        }
                    }
                };

                let Some(_permit) = self.permit().await? else {
                    return Ok(Outcome::Cancelled);
                };
                let instance = self
                    .call(self.driver.clone_service(
                        source,
                        service.folder.clone(),
                        service.name.clone(),
                        service.overrides(),
                    ))
                    .await?;
                self.write_state(|s| {
                    if service.master {
                        s.register_master(service.master_key.clone(), instance.clone());
                    }
                    s.record_instance(instance.clone());
                })?;
                instance
            }
        };

        if service.master || !self.power_on || self.read_state(|s| s.is_powered(&path))? {
            return Ok(Outcome::Done);
        }
        let Some(_permit) = self.permit().await? else {
            log::info!("{path} was cloned but not powered on before cancellation");
            return Ok(Outcome::Cancelled);
        };
        self.call(self.driver.power_state(instance.clone(), PowerState::On))
            .await?;
        self.write_state(|s| s.record_power_on(&instance))?;
        Ok(Outcome::Done)
    }

    /// Undo a creation operation
    ///
    /// # Returns
    /// `Ok(None)` when removed, `Ok(Some(reason))` when there is nothing to do
    /// or the run was cancelled before the call
    async fn undo(&self, operation: &Operation) -> DriverResult<Option<SkipReason>> {
        let result = match operation {
            Operation::ApplyPermission { .. } => return Ok(Some(SkipReason::NothingToUndo)),
            Operation::CreateNetwork { .. } if !self.cleanup_networks => {
                return Ok(Some(SkipReason::NetworksRetained));
            }
            Operation::CreateNetwork { definition } => {
                let Some(_permit) = self.permit().await? else {
                    return Ok(Some(SkipReason::Cancelled));
                };
                let result = self
                    .call(self.driver.delete_network(definition.network_ref()))
                    .await;
                self.write_state(|s| s.forget_network(&definition.name))?;
                result
            }
            Operation::CreateFolder { folder, .. } => {
                let Some(_permit) = self.permit().await? else {
                    return Ok(Some(SkipReason::Cancelled));
                };
                let result = self
                    .call(self.driver.delete_folder(folder.clone(), true))
                    .await;
                if result.is_ok() || result.as_ref().is_err_and(DriverError::is_not_found) {
                    self.write_state(|s| s.forget_folder(folder))?;
                }
                result
            }
            Operation::CreateService(service) => {
                let instance = self
                    .read_state(|s| s.instance(&service.instance().to_string()).cloned())?
                    .unwrap_or_else(|| service.instance());
                let Some(_permit) = self.permit().await? else {
                    return Ok(Some(SkipReason::Cancelled));
                };
                self.call(self.driver.power_state(instance, PowerState::Off))
                    .await
            }
        };

        match result {
            Ok(()) => Ok(None),
            Err(e) if e.is_not_found() => {
                log::debug!("{operation}: already absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Create a node, then its children
fn create_node(context: Arc<RunContext>, id: OperationId) -> NodeFuture<()> {
    Box::pin(async move {
        let Some(node) = context.tree.get(id) else {
            return;
        };

        if !context.phase.applies(node.applicability) {
            context.set_status(id, OperationStatus::Skipped(SkipReason::PhaseMismatch));
        } else if context.cancel.is_cancelled() {
            context.skip_subtree(id, SkipReason::Cancelled);
            return;
        } else {
            context.set_status(id, OperationStatus::InProgress);
            match context.create(&node.operation).await {
                Ok(Outcome::Done) => {
                    log::debug!("{}", node.operation);
                    context.set_status(id, OperationStatus::Succeeded);
                }
                Ok(Outcome::Cancelled) => {
                    context.set_status(id, OperationStatus::Skipped(SkipReason::Cancelled));
                    for child in &node.children {
                        context.skip_subtree(*child, SkipReason::Cancelled);
                    }
                    return;
                }
                Err(e) => {
                    log::error!("{} ({}): {e}", node.operation, node.origin);
                    context.set_status(id, OperationStatus::Failed(e.to_string()));
                    for child in &node.children {
                        context.skip_subtree(*child, SkipReason::ParentFailed);
                    }
                    return;
                }
            }
        }

        let (prerequisites, rest): (Vec<OperationId>, Vec<OperationId>) =
            node.children.iter().copied().partition(|child| {
                context
                    .tree
                    .get(*child)
                    .is_some_and(|c| c.operation.is_prerequisite())
            });

        run_concurrently(&context, prerequisites.clone(), create_node).await;

        if prerequisites
            .iter()
            .any(|child| context.status(*child).is_failed())
        {
            log::warn!(
                "skipping contents of {}: a permission or network failed",
                node.operation
            );
            for child in rest {
                context.skip_subtree(child, SkipReason::PrerequisiteFailed);
            }
            return;
        }

        run_concurrently(&context, rest, create_node).await;
    })
}

/// Clean up the children of a node, then the node itself
///
/// Resolves to whether the node no longer blocks removal of its parent.
fn cleanup_node(context: Arc<RunContext>, id: OperationId) -> NodeFuture<bool> {
    Box::pin(async move {
        let Some(node) = context.tree.get(id) else {
            return true;
        };

        let children_clean = run_concurrently(&context, node.children.clone(), cleanup_node)
            .await
            .into_iter()
            .all(|clean| clean == Some(true));

        if !context.phase.applies(node.applicability) {
            context.set_status(id, OperationStatus::Skipped(SkipReason::PhaseMismatch));
            return children_clean;
        }
        if context.cancel.is_cancelled() {
            context.set_status(id, OperationStatus::Skipped(SkipReason::Cancelled));
            return false;
        }
        if !children_clean {
            context.set_status(id, OperationStatus::Skipped(SkipReason::DependentFailed));
            return false;
        }

        context.set_status(id, OperationStatus::InProgress);
        match context.undo(&node.operation).await {
            Ok(None) => {
                log::debug!("undid {}", node.operation);
                context.set_status(id, OperationStatus::Succeeded);
                true
            }
            Ok(Some(reason)) => {
                context.set_status(id, OperationStatus::Skipped(reason));
                reason != SkipReason::Cancelled
            }
            Err(e) => {
                log::error!("cleanup of {} ({}): {e}", node.operation, node.origin);
                context.set_status(id, OperationStatus::Failed(e.to_string()));
                false
            }
        }
    })
}

/// Run node futures for `ids` concurrently
///
/// Results are in `ids` order, `None` where the task panicked.
async fn run_concurrently<T, F>(
    context: &Arc<RunContext>,
    ids: Vec<OperationId>,
    run: F,
) -> Vec<Option<T>>
where
    T: Send + 'static,
    F: Fn(Arc<RunContext>, OperationId) -> NodeFuture<T>,
{
    match ids.len() {
        0 => Vec::new(),
        1 => vec![Some(run(Arc::clone(context), ids[0]).await)],
        _ => {
            let mut set = JoinSet::new();
            for (index, id) in ids.iter().enumerate() {
                let future = run(Arc::clone(context), *id);
                set.spawn(async move { (index, future.await) });
            }
            let mut results: Vec<Option<T>> = ids.iter().map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, value)) => results[index] = Some(value),
                    Err(e) => log::error!("operation task failed: {e}"),
                }
            }
            results
        }
    }
}
