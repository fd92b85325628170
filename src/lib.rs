// ============================================================================
// File: packages/adles/src/lib.rs
// ----------------------------------------------------------------------------
// ADLES: automated deployment of lab environments.
//
// Turns a declarative exercise specification into platform operations:
// - spec: typed model of exercise and package specifications
// - resolver: label resolution with collected diagnostics
// - instancer: instance counts, names and subnet/VLAN allocation
// - plan: the operation tree of an environment
// - executor: phase-filtered execution against a platform driver
// - driver: platform capability trait with simulation and Docker backends
// ============================================================================

pub mod async_task;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod instancer;
pub mod logging;
pub mod plan;
pub mod resolver;
pub mod spec;

#[cfg(test)]
mod fixtures;

pub use config::InfraConfig;
pub use error::{AdlesError, AdlesResult};
pub use executor::{Phase, PhaseExecutor, RunReport};
pub use plan::{OperationTree, build};
pub use resolver::resolve;
pub use spec::{PackageSpec, Specification};
