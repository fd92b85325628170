// ============================================================================
// File: packages/adles/src/driver/types.rs
// ----------------------------------------------------------------------------
// Platform object references and call arguments
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spec::{NetworkKind, Subnet};

/// Folder on the platform, addressed by its full path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderRef {
    path: Vec<String>,
}

impl FolderRef {
    /// Folder from path components
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a `/`-separated path, ignoring empty components
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('/').filter(|c| !c.is_empty()))
    }

    /// Child folder reference
    pub fn child<S: Into<String>>(&self, name: S) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self { path }
    }

    /// Parent folder, `None` for a top-level folder
    pub fn parent(&self) -> Option<Self> {
        match self.path.len() {
            0 | 1 => None,
            n => Some(Self {
                path: self.path[..n - 1].to_vec(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    pub fn components(&self) -> &[String] {
        &self.path
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn is_within(&self, other: &FolderRef) -> bool {
        self.path.starts_with(&other.path)
    }
}

impl fmt::Display for FolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path.join("/"))
    }
}

/// Network on the platform, addressed by its unique name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkRef {
    pub name: String,
}

impl NetworkRef {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for NetworkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Service instance on the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub folder: FolderRef,
    pub name: String,

    /// Platform identifier, when the driver has one
    pub id: Option<String>,
}

impl InstanceRef {
    /// Reference derived from location alone
    pub fn at<S: Into<String>>(folder: FolderRef, name: S) -> Self {
        Self {
            folder,
            name: name.into(),
            id: None,
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.components().is_empty() {
            write!(f, "/{}", self.name)
        } else {
            write!(f, "{}/{}", self.folder, self.name)
        }
    }
}

/// Group permissions are granted to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub name: String,

    /// Membership lives in an external directory
    pub directory: bool,

    /// Known members
    pub members: Vec<String>,
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Access level granted on a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Deployed environment participant
    Member,

    /// Master author, may customize masters
    Master,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => f.write_str("member"),
            Role::Master => f.write_str("master"),
        }
    }
}

/// Desired power state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => f.write_str("on"),
            PowerState::Off => f.write_str("off"),
        }
    }
}

/// Concrete network to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    pub name: String,
    pub kind: NetworkKind,
    pub subnet: Option<Subnet>,
    pub vlan: u16,
    pub vswitch: Option<String>,
}

impl NetworkDefinition {
    pub fn network_ref(&self) -> NetworkRef {
        NetworkRef::new(self.name.clone())
    }
}

/// What a clone is made from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    /// Platform VM template by name
    Template(String),

    /// Container image
    Image(String),

    /// Dockerfile to build
    Dockerfile(PathBuf),

    /// Compose bundle
    Compose(PathBuf),

    /// Registered master instance
    Master(InstanceRef),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Template(name) => write!(f, "template {name}"),
            SourceRef::Image(name) => write!(f, "image {name}"),
            SourceRef::Dockerfile(path) => write!(f, "dockerfile {}", path.display()),
            SourceRef::Compose(path) => write!(f, "compose {}", path.display()),
            SourceRef::Master(instance) => write!(f, "master {instance}"),
        }
    }
}

/// Network interface of a clone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NicAttachment {
    pub interface: String,
    pub network: NetworkRef,
}

/// Per-clone settings applied on top of the source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOverrides {
    pub cpus: Option<u32>,

    /// Memory in MiB
    pub memory_mib: Option<u64>,

    pub nics: Vec<NicAttachment>,
    pub note: Option<String>,

    /// Free-form labels recorded with the instance
    pub labels: HashMap<String, String>,
}

/// Driver health, reported before a run starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the platform is reachable and usable
    pub is_healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Last health check timestamp
    pub last_check: std::time::SystemTime,

    /// Driver-specific details (versions, counts)
    pub metrics: HashMap<String, String>,
}

impl HealthStatus {
    /// Create a healthy status
    pub fn healthy<M: Into<String>>(message: M) -> Self {
        Self {
            is_healthy: true,
            message: message.into(),
            last_check: std::time::SystemTime::now(),
            metrics: HashMap::new(),
        }
    }

    /// Create an unhealthy status
    pub fn unhealthy<M: Into<String>>(message: M) -> Self {
        Self {
            is_healthy: false,
            message: message.into(),
            last_check: std::time::SystemTime::now(),
            metrics: HashMap::new(),
        }
    }

    /// Add a health metric
    pub fn with_metric<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_paths() {
        let root = FolderRef::parse("/Datacenter/labs/");
        assert_eq!(root.components(), &["Datacenter".to_string(), "labs".to_string()]);

        let team = root.child("team-1");
        assert_eq!(team.to_string(), "/Datacenter/labs/team-1");
        assert_eq!(team.name(), "team-1");
        assert_eq!(team.parent(), Some(root.clone()));
        assert!(team.is_within(&root));
        assert!(!root.is_within(&team));
        assert_eq!(FolderRef::new(["top"]).parent(), None);
    }

    #[test]
    fn instance_display() {
        let folder = FolderRef::new(["lab", "team-1"]);
        let instance = InstanceRef::at(folder, "kali").with_id("abc123");
        assert_eq!(instance.to_string(), "/lab/team-1/kali");
        assert_eq!(instance.id.as_deref(), Some("abc123"));
    }

    #[test]
    fn health_status_creation() {
        let healthy = HealthStatus::healthy("engine reachable").with_metric("version", "27.0");
        assert!(healthy.is_healthy);
        assert_eq!(healthy.metrics.get("version"), Some(&"27.0".to_string()));
        assert!(!HealthStatus::unhealthy("socket missing").is_healthy);
    }
}
