// ============================================================================
// File: packages/adles/src/driver/trait_def.rs
// ----------------------------------------------------------------------------
// PlatformDriver trait definition
// ============================================================================

use crate::async_task::AsyncTask;

use super::errors::DriverResult;
use super::types::{
    CloneOverrides, FolderRef, GroupRef, HealthStatus, InstanceRef, NetworkDefinition,
    NetworkRef, PowerState, Role, SourceRef,
};

/// Capability surface every platform backend provides
///
/// Every call returns a spawned task so callers can fan calls out and await
/// them under their own concurrency limits. Arguments are owned because the
/// tasks outlive the call.
pub trait PlatformDriver: Send + Sync + std::fmt::Debug {
    /// Create a folder, or return it if it already exists
    ///
    /// # Arguments
    /// * `parent` - Parent folder, `None` for the platform root
    /// * `name` - Folder name
    ///
    /// # Returns
    /// AsyncTask resolving to the folder reference
    fn create_folder(&self, parent: Option<FolderRef>, name: String)
    -> AsyncTask<DriverResult<FolderRef>>;

    /// Delete a folder
    ///
    /// # Arguments
    /// * `folder` - Folder to delete
    /// * `recursive` - Also delete everything inside it
    ///
    /// # Returns
    /// AsyncTask resolving to `NotFound` when the folder does not exist
    fn delete_folder(&self, folder: FolderRef, recursive: bool) -> AsyncTask<DriverResult<()>>;

    /// Clone a service instance from a template, image or master
    ///
    /// # Arguments
    /// * `source` - What to clone from
    /// * `dest` - Destination folder
    /// * `name` - Instance name
    /// * `overrides` - Resources, interfaces and labels for the clone
    fn clone_service(
        &self,
        source: SourceRef,
        dest: FolderRef,
        name: String,
        overrides: CloneOverrides,
    ) -> AsyncTask<DriverResult<InstanceRef>>;

    /// Create a network, or return it if one with the same name exists
    fn create_network(&self, definition: NetworkDefinition) -> AsyncTask<DriverResult<NetworkRef>>;

    /// Delete a network
    fn delete_network(&self, network: NetworkRef) -> AsyncTask<DriverResult<()>>;

    /// Grant a group a role on a folder
    fn apply_permission(
        &self,
        target: FolderRef,
        group: GroupRef,
        role: Role,
    ) -> AsyncTask<DriverResult<()>>;

    /// Change the power state of an instance
    fn power_state(&self, instance: InstanceRef, desired: PowerState)
    -> AsyncTask<DriverResult<()>>;

    /// Check that the platform is reachable
    ///
    /// Should be fast and non-destructive.
    fn health_check(&self) -> AsyncTask<HealthStatus>;

    /// Release the session held with the platform
    ///
    /// Calls made after release fail with `DriverError::Released`.
    fn release(&self) -> AsyncTask<DriverResult<()>>;

    /// Driver type identifier
    fn driver_type(&self) -> &'static str;
}
