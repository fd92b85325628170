// ============================================================================
// File: packages/adles/src/spec/service.rs
// ----------------------------------------------------------------------------
// Service definitions: the deployable units folders instantiate.
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Problem;

/// What a service is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Virtual machine template name
    Template(String),

    /// Container image reference
    Image(String),

    /// Dockerfile to build
    Dockerfile(PathBuf),

    /// Compose bundle
    Compose(PathBuf),
}

impl ServiceKind {
    /// Source reference passed to the platform when no master exists
    pub fn source(&self) -> String {
        match self {
            ServiceKind::Template(name) | ServiceKind::Image(name) => name.clone(),
            ServiceKind::Dockerfile(path) | ServiceKind::Compose(path) => {
                path.display().to_string()
            }
        }
    }

    /// Whether masters are produced for this kind
    pub fn is_masterable(&self) -> bool {
        matches!(self, ServiceKind::Template(_))
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Template(name) => write!(f, "template '{name}'"),
            ServiceKind::Image(name) => write!(f, "image '{name}'"),
            ServiceKind::Dockerfile(path) => write!(f, "dockerfile {}", path.display()),
            ServiceKind::Compose(path) => write!(f, "compose file {}", path.display()),
        }
    }
}

/// Resource limits for a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceResources {
    #[serde(default)]
    pub cpus: Option<u32>,

    /// Memory in MiB
    #[serde(default)]
    pub memory: Option<u64>,
}

/// Provisioner reference (validated, never run)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Provisioner {
    pub name: String,
    pub file: PathBuf,
}

/// A parsed service definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub kind: ServiceKind,
    pub network_interfaces: Vec<String>,
    pub resources: ServiceResources,
    pub note: Option<String>,
    pub provisioner: Option<Provisioner>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawService {
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    dockerfile: Option<PathBuf>,
    #[serde(default)]
    compose_file: Option<PathBuf>,
    #[serde(default)]
    network_interfaces: Vec<String>,
    #[serde(default)]
    resources: ServiceResources,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    provisioner: Option<Provisioner>,
    #[serde(default)]
    description: Option<String>,
}

impl ServiceSpec {
    /// Parse one entry of the `services` section
    pub fn parse(label: &str, value: &serde_yaml::Value, problems: &mut Vec<Problem>) -> Option<Self> {
        let path = format!("services.{label}");
        let raw: RawService = match serde_yaml::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                problems.push(Problem::new(path, e.to_string()));
                return None;
            }
        };

        let mut kinds = Vec::with_capacity(1);
        if let Some(template) = raw.template {
            kinds.push(ServiceKind::Template(template));
        }
        if let Some(image) = raw.image {
            kinds.push(ServiceKind::Image(image));
        }
        if let Some(dockerfile) = raw.dockerfile {
            kinds.push(ServiceKind::Dockerfile(dockerfile));
        }
        if let Some(compose) = raw.compose_file {
            kinds.push(ServiceKind::Compose(compose));
        }

        if kinds.len() != 1 {
            problems.push(Problem::new(
                path,
                "exactly one of 'template', 'image', 'dockerfile' or 'compose-file' must be given",
            ));
            return None;
        }

        let mut seen = std::collections::HashSet::new();
        for iface in &raw.network_interfaces {
            if !seen.insert(iface.as_str()) {
                problems.push(Problem::new(
                    format!("{path}.network-interfaces"),
                    format!("interface '{iface}' is declared more than once"),
                ));
            }
        }

        Some(Self {
            kind: kinds.remove(0),
            network_interfaces: raw.network_interfaces,
            resources: raw.resources,
            note: raw.note,
            provisioner: raw.provisioner,
            description: raw.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> (Option<ServiceSpec>, Vec<Problem>) {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).expect("valid yaml");
        let mut problems = Vec::new();
        let service = ServiceSpec::parse("kali", &value, &mut problems);
        (service, problems)
    }

    #[test]
    fn template_service() {
        let (service, problems) = parse(
            "template: Kali 2024\nnetwork-interfaces: [eth0, eth1]\nresources: {cpus: 2, memory: 4096}",
        );
        assert!(problems.is_empty());
        let service = service.expect("service parsed");
        assert_eq!(service.kind, ServiceKind::Template("Kali 2024".into()));
        assert!(service.kind.is_masterable());
        assert_eq!(service.network_interfaces.len(), 2);
        assert_eq!(service.resources.memory, Some(4096));
    }

    #[test]
    fn requires_exactly_one_kind() {
        let (service, problems) = parse("note: nothing to deploy");
        assert!(service.is_none());
        assert_eq!(problems[0].path, "services.kali");

        let (service, _) = parse("template: a\nimage: b");
        assert!(service.is_none());
    }

    #[test]
    fn unknown_key_is_schema_problem() {
        let (service, problems) = parse("image: nginx\ncolour: blue");
        assert!(service.is_none());
        assert!(problems[0].message.contains("colour"));
    }

    #[test]
    fn duplicate_interface() {
        let (_, problems) = parse("image: nginx\nnetwork-interfaces: [eth0, eth0]");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].path, "services.kali.network-interfaces");
    }
}
