// ============================================================================
// File: packages/adles/src/config.rs
// ----------------------------------------------------------------------------
// Infrastructure configuration: which platform to drive, instancing
// thresholds and executor limits.
// ============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdlesError, AdlesResult};

/// Environment variable overriding `max-in-flight`
pub const MAX_IN_FLIGHT_ENV: &str = "ADLES_MAX_IN_FLIGHT";

/// Default cap on concurrent driver calls
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default Docker Engine endpoint
pub const DEFAULT_DOCKER_URL: &str = "unix:///var/run/docker.sock";

/// Warning and error limits for one kind of instanced entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Threshold {
    pub warn: u32,
    pub error: u32,
}

/// Instance count thresholds per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default = "Thresholds::default_folder")]
    pub folder: Threshold,

    #[serde(default = "Thresholds::default_service")]
    pub service: Threshold,
}

impl Thresholds {
    fn default_folder() -> Threshold {
        Threshold { warn: 25, error: 50 }
    }

    fn default_service() -> Threshold {
        Threshold { warn: 50, error: 70 }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            folder: Self::default_folder(),
            service: Self::default_service(),
        }
    }
}

/// In-memory platform settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SimulationConfig {
    /// Artificial latency added to every call, in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

/// Docker Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DockerConfig {
    /// Engine endpoint, `unix://<socket path>`
    #[serde(default = "DockerConfig::default_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "DockerConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl DockerConfig {
    fn default_url() -> String {
        DEFAULT_DOCKER_URL.to_string()
    }

    fn default_timeout() -> u64 {
        30
    }

    /// Socket path of a `unix://` endpoint
    pub fn socket_path(&self) -> AdlesResult<&str> {
        self.url.strip_prefix("unix://").ok_or_else(|| {
            AdlesError::config(format!(
                "docker url '{}' is not supported, only unix:// endpoints are",
                self.url
            ))
        })
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// The platform section of an infrastructure file
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformConfig {
    Simulation(SimulationConfig),
    Docker(DockerConfig),

    /// Recognised but not drivable
    Vsphere(serde_yaml::Value),
}

impl PlatformConfig {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformConfig::Simulation(_) => "simulation",
            PlatformConfig::Docker(_) => "docker",
            PlatformConfig::Vsphere(_) => "vmware-vsphere",
        }
    }
}

/// Parsed infrastructure configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InfraConfig {
    pub platform: PlatformConfig,
    pub thresholds: Thresholds,
    pub max_in_flight: usize,

    /// Power on clones after deployment
    pub power_on: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawInfra {
    #[serde(default)]
    simulation: Option<SimulationConfig>,
    #[serde(default)]
    docker: Option<DockerConfig>,
    #[serde(default)]
    vmware_vsphere: Option<serde_yaml::Value>,
    #[serde(default)]
    thresholds: Option<Thresholds>,
    #[serde(default)]
    max_in_flight: Option<usize>,
    #[serde(default)]
    power_on: Option<bool>,
}

impl InfraConfig {
    /// In-memory platform with default limits
    pub fn simulation() -> Self {
        Self {
            platform: PlatformConfig::Simulation(SimulationConfig::default()),
            thresholds: Thresholds::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            power_on: true,
        }
    }

    /// Load an infrastructure file
    pub fn from_path(path: &Path) -> AdlesResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AdlesError::io(path, e))?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            AdlesError::Config { message } => {
                AdlesError::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Parse an infrastructure document
    pub fn from_yaml_str(text: &str) -> AdlesResult<Self> {
        let raw: RawInfra =
            serde_yaml::from_str(text).map_err(|e| AdlesError::config(e.to_string()))?;

        let mut platforms = Vec::with_capacity(1);
        if let Some(simulation) = raw.simulation {
            platforms.push(PlatformConfig::Simulation(simulation));
        }
        if let Some(docker) = raw.docker {
            platforms.push(PlatformConfig::Docker(docker));
        }
        if let Some(vsphere) = raw.vmware_vsphere {
            platforms.push(PlatformConfig::Vsphere(vsphere));
        }
        if platforms.len() != 1 {
            return Err(AdlesError::config(format!(
                "exactly one platform section is required ({} given)",
                platforms.len()
            )));
        }

        let thresholds = raw.thresholds.unwrap_or_default();
        for (kind, threshold) in [("folder", thresholds.folder), ("service", thresholds.service)] {
            if threshold.warn > threshold.error {
                return Err(AdlesError::config(format!(
                    "{kind} threshold warn ({}) exceeds error ({})",
                    threshold.warn, threshold.error
                )));
            }
        }

        let max_in_flight = raw.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT);
        if max_in_flight == 0 {
            return Err(AdlesError::config("max-in-flight must be at least 1"));
        }

        Ok(Self {
            platform: platforms.remove(0),
            thresholds,
            max_in_flight,
            power_on: raw.power_on.unwrap_or(true),
        })
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> AdlesResult<Self> {
        match std::env::var(MAX_IN_FLIGHT_ENV) {
            Ok(value) => {
                let n = value.trim().parse::<usize>().map_err(|_| {
                    AdlesError::config(format!("{MAX_IN_FLIGHT_ENV}='{value}' is not a number"))
                })?;
                Ok(self.with_max_in_flight(n))
            }
            Err(_) => Ok(self),
        }
    }

    /// Set the concurrent driver call cap (minimum 1)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_power_on(mut self, power_on: bool) -> Self {
        self.power_on = power_on;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self::simulation()
    }
}
