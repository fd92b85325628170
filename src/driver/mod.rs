// ============================================================================
// File: packages/adles/src/driver/mod.rs
// ----------------------------------------------------------------------------
// Platform driver trait definitions and module organization.
//
// Provides a uniform capability surface over virtualization platforms:
// - PlatformDriver trait for folder, network, clone and permission calls
// - Driver-specific error types and object references
// - Scoped sessions released on every exit path
// - Platform-conditional module loading
// ============================================================================

mod errors;
mod factory;
mod session;
mod trait_def;
mod types;

pub mod simulation;

#[cfg(unix)]
pub mod docker;

pub use crate::async_task::AsyncTask;
pub use errors::{DriverError, DriverResult};
pub use factory::{available_drivers, create_driver};
pub use session::DriverSession;
pub use simulation::{CallKind, DriverCall, SimInstance, SimulationDriver};
pub use trait_def::PlatformDriver;
pub use types::{
    CloneOverrides, FolderRef, GroupRef, HealthStatus, InstanceRef, NetworkDefinition,
    NetworkRef, NicAttachment, PowerState, Role, SourceRef,
};

#[cfg(unix)]
pub use docker::DockerDriver;
