// ============================================================================
// File: packages/adles/src/plan/operation.rs
// ----------------------------------------------------------------------------
// Operation and node types of the operation tree
// ============================================================================

use std::collections::HashMap;
use std::fmt;

use crate::driver::{
    CloneOverrides, FolderRef, GroupRef, InstanceRef, NetworkDefinition, NicAttachment, Role,
    SourceRef,
};
use crate::spec::{Scoring, ServiceKind, ServiceResources};

/// Phases an operation takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applicability {
    /// Masters phase only
    MasterOnly,

    /// Deployment phase only
    DeployOnly,

    /// Shared infrastructure used by both phases
    Both,
}

impl Applicability {
    pub fn in_masters(self) -> bool {
        matches!(self, Applicability::MasterOnly | Applicability::Both)
    }

    pub fn in_deploy(self) -> bool {
        matches!(self, Applicability::DeployOnly | Applicability::Both)
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Applicability::MasterOnly => f.write_str("master"),
            Applicability::DeployOnly => f.write_str("deploy"),
            Applicability::Both => f.write_str("both"),
        }
    }
}

/// Index of a node in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub usize);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key masters are registered under: template folder path and
/// service-instance name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MasterKey {
    /// Dotted specification path of the folder template
    pub folder: String,

    /// Service-instance name inside that folder
    pub service: String,
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.services.{}", self.folder, self.service)
    }
}

/// A service instance to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOperation {
    pub folder: FolderRef,
    pub name: String,

    /// Label of the service definition
    pub service: String,
    pub kind: ServiceKind,
    pub nics: Vec<NicAttachment>,
    pub resources: ServiceResources,
    pub note: Option<String>,
    pub scoring: Option<Scoring>,
    pub master_key: MasterKey,

    /// Whether this clone is the master of its key
    pub master: bool,
}

impl ServiceOperation {
    pub fn instance(&self) -> InstanceRef {
        InstanceRef::at(self.folder.clone(), self.name.clone())
    }

    /// Source used when no master is registered
    pub fn source(&self) -> SourceRef {
        match &self.kind {
            ServiceKind::Template(name) => SourceRef::Template(name.clone()),
            ServiceKind::Image(name) => SourceRef::Image(name.clone()),
            ServiceKind::Dockerfile(path) => SourceRef::Dockerfile(path.clone()),
            ServiceKind::Compose(path) => SourceRef::Compose(path.clone()),
        }
    }

    /// Clone settings derived from the service and its instance
    pub fn overrides(&self) -> CloneOverrides {
        let mut labels = HashMap::new();
        labels.insert("service".to_string(), self.service.clone());
        labels.insert("master-key".to_string(), self.master_key.to_string());
        if let Some(scoring) = &self.scoring {
            if let Some(criteria) = &scoring.criteria {
                labels.insert("scoring.criteria".to_string(), criteria.clone());
            }
            if let Some(ports) = &scoring.ports {
                let ports: Vec<String> = ports.iter().map(u16::to_string).collect();
                labels.insert("scoring.ports".to_string(), ports.join(","));
            }
            if let Some(protocols) = &scoring.protocols {
                labels.insert("scoring.protocols".to_string(), protocols.join(","));
            }
        }
        CloneOverrides {
            cpus: self.resources.cpus,
            memory_mib: self.resources.memory,
            nics: self.nics.clone(),
            note: self.note.clone(),
            labels,
        }
    }
}

/// A single platform operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateFolder {
        parent: Option<FolderRef>,
        name: String,

        /// Full path of the folder created
        folder: FolderRef,
    },
    ApplyPermission {
        target: FolderRef,
        group: GroupRef,
        role: Role,
    },
    CreateNetwork {
        definition: NetworkDefinition,
    },
    CreateService(ServiceOperation),
}

impl Operation {
    /// Short kind name used in reports
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::CreateFolder { .. } => "folder",
            Operation::ApplyPermission { .. } => "permission",
            Operation::CreateNetwork { .. } => "network",
            Operation::CreateService(_) => "service",
        }
    }

    /// Folder created by this operation, if any
    pub fn created_folder(&self) -> Option<&FolderRef> {
        match self {
            Operation::CreateFolder { folder, .. } => Some(folder),
            _ => None,
        }
    }

    /// Whether a failure of this operation blocks its later siblings
    pub fn is_prerequisite(&self) -> bool {
        matches!(
            self,
            Operation::ApplyPermission { .. } | Operation::CreateNetwork { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateFolder { folder, .. } => write!(f, "create folder {folder}"),
            Operation::ApplyPermission {
                target,
                group,
                role,
            } => write!(f, "grant {role} on {target} to {group}"),
            Operation::CreateNetwork { definition } => {
                write!(f, "create network {} (vlan {}", definition.name, definition.vlan)?;
                if let Some(subnet) = &definition.subnet {
                    write!(f, ", {subnet}")?;
                }
                f.write_str(")")
            }
            Operation::CreateService(service) => {
                write!(f, "create service {} from {}", service.instance(), service.kind)?;
                if !service.nics.is_empty() {
                    let nics: Vec<String> = service
                        .nics
                        .iter()
                        .map(|nic| format!("{}={}", nic.interface, nic.network))
                        .collect();
                    write!(f, " [{}]", nics.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Node of the operation tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationNode {
    pub id: OperationId,
    pub parent: Option<OperationId>,
    pub children: Vec<OperationId>,
    pub depth: usize,
    pub applicability: Applicability,

    /// Specification path the operation was derived from
    pub origin: String,
    pub operation: Operation,
}
