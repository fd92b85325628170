// ============================================================================
// File: packages/adles/src/driver/factory.rs
// ----------------------------------------------------------------------------
// Driver factory functions
// ============================================================================

use std::sync::Arc;

use crate::config::{InfraConfig, PlatformConfig};
use crate::error::{AdlesError, AdlesResult};

use super::simulation::SimulationDriver;
use super::trait_def::PlatformDriver;

#[cfg(unix)]
use super::docker::DockerDriver;

/// Create the driver selected by an infrastructure configuration
///
/// # Arguments
/// * `infra` - Parsed infrastructure configuration
///
/// # Returns
/// Shared driver instance, or an error when the platform cannot be driven
pub fn create_driver(infra: &InfraConfig) -> AdlesResult<Arc<dyn PlatformDriver>> {
    match &infra.platform {
        PlatformConfig::Simulation(config) => Ok(Arc::new(SimulationDriver::with_config(config))),

        #[cfg(unix)]
        PlatformConfig::Docker(config) => {
            let driver = DockerDriver::new(config)?;
            Ok(Arc::new(driver))
        }

        #[cfg(not(unix))]
        PlatformConfig::Docker(_) => Err(AdlesError::platform(
            "docker",
            "the docker driver requires a unix socket and is only available on unix hosts",
        )),

        PlatformConfig::Vsphere(_) => Err(AdlesError::platform(
            "vmware-vsphere",
            "vSphere is recognised in infrastructure files but no driver is available",
        )),
    }
}

/// Get all drivers available on this host
///
/// # Returns
/// Driver type identifiers usable in an infrastructure file
pub fn available_drivers() -> Vec<&'static str> {
    let mut drivers = vec!["simulation"];

    #[cfg(unix)]
    drivers.push("docker");

    drivers
}
