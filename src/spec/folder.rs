// ============================================================================
// File: packages/adles/src/spec/folder.rs
// ----------------------------------------------------------------------------
// Folder tree of an exercise specification.
//
// A folder mapping mixes keyword keys (group, instances, services, ...) with
// child folder names, so it is parsed by hand in declaration order rather
// than derived. Service instances and instance specifications go through
// serde.
// ============================================================================

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::Problem;

/// Keys with a fixed meaning inside a folder mapping
pub const FOLDER_KEYWORDS: &[&str] = &[
    "group",
    "master-group",
    "instances",
    "description",
    "enabled",
    "services",
];

/// How an instance count is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceCount {
    /// Explicit number
    Number(i64),

    /// Size of the named group
    SizeOf(String),
}

/// The `instances` key of a folder or service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancesSpec {
    /// `None` when the mapping gave neither `number` nor `size-of`
    pub count: Option<InstanceCount>,

    /// Name prefix for concrete instances (defaults to the entity name)
    pub prefix: Option<String>,
}

impl InstancesSpec {
    pub fn number(n: i64) -> Self {
        Self {
            count: Some(InstanceCount::Number(n)),
            prefix: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInstances {
    Count(i64),
    Spec(RawInstanceMapping),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawInstanceMapping {
    #[serde(default)]
    number: Option<i64>,
    #[serde(default)]
    size_of: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
}

fn parse_instances(value: &Value, path: &str, problems: &mut Vec<Problem>) -> Option<InstancesSpec> {
    let raw: RawInstances = match serde_yaml::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(_) => {
            problems.push(Problem::new(
                path,
                "instances must be an integer or a mapping of 'number' or 'size-of' with an optional 'prefix'",
            ));
            return None;
        }
    };

    match raw {
        RawInstances::Count(n) => Some(InstancesSpec::number(n)),
        RawInstances::Spec(spec) => {
            let count = match (spec.number, spec.size_of) {
                (Some(_), Some(_)) => {
                    problems.push(Problem::new(
                        path,
                        "'number' and 'size-of' are mutually exclusive",
                    ));
                    return None;
                }
                (Some(n), None) => Some(InstanceCount::Number(n)),
                (None, Some(group)) => Some(InstanceCount::SizeOf(group)),
                (None, None) => None,
            };
            Some(InstancesSpec {
                count,
                prefix: spec.prefix,
            })
        }
    }
}

/// Network attachments of a service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkAttachments {
    /// Labels attached to interfaces in declaration order
    Ordered(Vec<String>),

    /// Explicit interface to network label mapping
    Mapped(Vec<(String, String)>),
}

impl Default for NetworkAttachments {
    fn default() -> Self {
        NetworkAttachments::Ordered(Vec::new())
    }
}

impl NetworkAttachments {
    /// Referenced network labels, in declaration order
    pub fn labels(&self) -> Vec<&str> {
        match self {
            NetworkAttachments::Ordered(labels) => labels.iter().map(String::as_str).collect(),
            NetworkAttachments::Mapped(pairs) => pairs.iter().map(|(_, l)| l.as_str()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NetworkAttachments::Ordered(labels) => labels.is_empty(),
            NetworkAttachments::Mapped(pairs) => pairs.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNetworks {
    List(Vec<String>),
    Mapping(Mapping),
}

/// Scoring metadata attached to a service instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scoring {
    #[serde(default)]
    pub ports: Option<Vec<u16>>,

    #[serde(default)]
    pub protocols: Option<Vec<String>>,

    /// Criteria file
    #[serde(default)]
    pub criteria: Option<String>,
}

/// A service placed in a base folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstanceSpec {
    pub name: String,

    /// Label of the service definition
    pub service: String,

    pub networks: NetworkAttachments,
    pub instances: Option<InstancesSpec>,
    pub scoring: Option<Scoring>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawServiceInstance {
    service: String,
    #[serde(default)]
    networks: Option<RawNetworks>,
    #[serde(default)]
    instances: Option<Value>,
    #[serde(default)]
    scoring: Option<Scoring>,
    #[serde(default = "enabled_default")]
    enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl ServiceInstanceSpec {
    fn parse(name: &str, value: &Value, path: &str, problems: &mut Vec<Problem>) -> Option<Self> {
        let raw: RawServiceInstance = match serde_yaml::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                problems.push(Problem::new(path, e.to_string()));
                return None;
            }
        };

        let networks = match raw.networks {
            None => NetworkAttachments::default(),
            Some(RawNetworks::List(labels)) => NetworkAttachments::Ordered(labels),
            Some(RawNetworks::Mapping(mapping)) => {
                let mut pairs = Vec::with_capacity(mapping.len());
                for (iface, label) in &mapping {
                    match (scalar_name(iface), label.as_str()) {
                        (Some(iface), Some(label)) => pairs.push((iface, label.to_string())),
                        _ => problems.push(Problem::new(
                            format!("{path}.networks"),
                            "network mappings must map interface names to network labels",
                        )),
                    }
                }
                NetworkAttachments::Mapped(pairs)
            }
        };

        let instances = match raw.instances {
            Some(value) => Some(parse_instances(&value, &format!("{path}.instances"), problems)?),
            None => None,
        };

        Some(Self {
            name: name.to_string(),
            service: raw.service,
            networks,
            instances,
            scoring: raw.scoring,
            enabled: raw.enabled,
        })
    }
}

/// Contents of a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderBody {
    /// Folder containing only folders
    Parent(Vec<FolderSpec>),

    /// Folder containing services
    Base(Vec<ServiceInstanceSpec>),
}

/// A parsed folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSpec {
    pub name: String,
    pub group: Option<String>,
    pub master_group: Option<String>,
    pub instances: Option<InstancesSpec>,
    pub description: Option<String>,
    pub enabled: bool,
    pub body: FolderBody,
}

impl FolderSpec {
    /// Parse the `folders` section
    pub fn parse_all(value: &Value, problems: &mut Vec<Problem>) -> Vec<FolderSpec> {
        let Some(mapping) = value.as_mapping() else {
            problems.push(Problem::new("folders", "must be a mapping of folder names"));
            return Vec::new();
        };
        parse_children(mapping.iter(), "folders", problems)
    }

    fn parse(name: &str, value: &Value, path: &str, problems: &mut Vec<Problem>) -> Option<Self> {
        let Some(mapping) = value.as_mapping() else {
            problems.push(Problem::new(path, "folder must be a mapping"));
            return None;
        };

        let mut folder = FolderSpec {
            name: name.to_string(),
            group: None,
            master_group: None,
            instances: None,
            description: None,
            enabled: true,
            body: FolderBody::Parent(Vec::new()),
        };
        let mut services: Option<Vec<ServiceInstanceSpec>> = None;
        let mut child_entries = Vec::new();

        for (key, value) in mapping {
            let Some(key_name) = scalar_name(key) else {
                problems.push(Problem::new(path, "folder keys must be strings"));
                continue;
            };
            let key_path = format!("{path}.{key_name}");
            match key_name.as_str() {
                "group" => folder.group = string_value(value, &key_path, problems),
                "master-group" => folder.master_group = string_value(value, &key_path, problems),
                "description" => folder.description = string_value(value, &key_path, problems),
                "enabled" => match value.as_bool() {
                    Some(enabled) => folder.enabled = enabled,
                    None => problems.push(Problem::new(key_path, "enabled must be a boolean")),
                },
                "instances" => folder.instances = parse_instances(value, &key_path, problems),
                "services" => match value.as_mapping() {
                    Some(entries) => {
                        let mut parsed = Vec::with_capacity(entries.len());
                        for (svc_key, svc_value) in entries {
                            let Some(svc_name) = scalar_name(svc_key) else {
                                problems.push(Problem::new(
                                    key_path.as_str(),
                                    "service instance names must be strings",
                                ));
                                continue;
                            };
                            let svc_path = format!("{key_path}.{svc_name}");
                            if let Some(svc) =
                                ServiceInstanceSpec::parse(&svc_name, svc_value, &svc_path, problems)
                            {
                                parsed.push(svc);
                            }
                        }
                        services = Some(parsed);
                    }
                    None => problems.push(Problem::new(
                        key_path,
                        "services must be a mapping of service instances",
                    )),
                },
                _ => child_entries.push((key, value)),
            }
        }

        match services {
            Some(services) if child_entries.is_empty() => folder.body = FolderBody::Base(services),
            Some(_) => {
                problems.push(Problem::new(
                    path,
                    "a folder cannot contain both services and child folders",
                ));
                return None;
            }
            None => {
                folder.body =
                    FolderBody::Parent(parse_children(child_entries.into_iter(), path, problems));
            }
        }

        Some(folder)
    }

    /// Whether this folder holds services
    pub fn is_base(&self) -> bool {
        matches!(self.body, FolderBody::Base(_))
    }

    pub fn children(&self) -> &[FolderSpec] {
        match &self.body {
            FolderBody::Parent(children) => children,
            FolderBody::Base(_) => &[],
        }
    }

    pub fn services(&self) -> &[ServiceInstanceSpec] {
        match &self.body {
            FolderBody::Base(services) => services,
            FolderBody::Parent(_) => &[],
        }
    }

    /// Visit this folder and every descendant in pre-order with its dotted path
    pub fn walk<'a>(&'a self, path: &str, visit: &mut dyn FnMut(&'a FolderSpec, &str)) {
        let path = format!("{path}.{}", self.name);
        visit(self, &path);
        for child in self.children() {
            child.walk(&path, visit);
        }
    }
}

fn parse_children<'a>(
    entries: impl Iterator<Item = (&'a Value, &'a Value)>,
    path: &str,
    problems: &mut Vec<Problem>,
) -> Vec<FolderSpec> {
    let mut children = Vec::new();
    for (key, value) in entries {
        let Some(name) = scalar_name(key) else {
            problems.push(Problem::new(path, "folder names must be strings"));
            continue;
        };
        let child_path = format!("{path}.{name}");
        if let Some(child) = FolderSpec::parse(&name, value, &child_path, problems) {
            children.push(child);
        }
    }
    children
}

/// Render a scalar mapping key as a name
fn scalar_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_value(value: &Value, path: &str, problems: &mut Vec<Problem>) -> Option<String> {
    match value.as_str() {
        Some(s) => Some(s.to_string()),
        None => {
            problems.push(Problem::new(path, "must be a string"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(yaml: &str) -> (Vec<FolderSpec>, Vec<Problem>) {
        let value: Value = serde_yaml::from_str(yaml).expect("valid yaml");
        let mut problems = Vec::new();
        let folders = FolderSpec::parse_all(&value, &mut problems);
        (folders, problems)
    }

    #[test]
    fn nested_folders_keep_declaration_order() {
        let (folders, problems) = parse(
            r#"
teams:
  group: Students
  instances:
    size-of: Students
    prefix: team
  zeta:
    services:
      web: {service: nginx}
  alpha:
    enabled: false
    services:
      db: {service: postgres, networks: [LAN]}
"#,
        );
        assert!(problems.is_empty(), "{problems:?}");
        let teams = &folders[0];
        assert_eq!(teams.group.as_deref(), Some("Students"));
        assert_eq!(
            teams.instances,
            Some(InstancesSpec {
                count: Some(InstanceCount::SizeOf("Students".into())),
                prefix: Some("team".into()),
            })
        );
        let names: Vec<_> = teams.children().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(!teams.children()[1].enabled);
        assert_eq!(teams.children()[1].services()[0].networks.labels(), vec!["LAN"]);
    }

    #[test]
    fn services_and_children_conflict() {
        let (folders, problems) = parse(
            r#"
mixed:
  services:
    web: {service: nginx}
  child:
    services: {}
"#,
        );
        assert!(folders.is_empty());
        assert_eq!(problems[0].path, "folders.mixed");
    }

    #[test]
    fn explicit_interface_mapping() {
        let (folders, problems) = parse(
            r#"
lab:
  services:
    router:
      service: vyos
      networks:
        eth1: LAN
        eth0: WAN
      instances: 2
"#,
        );
        assert!(problems.is_empty(), "{problems:?}");
        let router = &folders[0].services()[0];
        assert_eq!(
            router.networks,
            NetworkAttachments::Mapped(vec![
                ("eth1".into(), "LAN".into()),
                ("eth0".into(), "WAN".into()),
            ])
        );
        assert_eq!(router.instances, Some(InstancesSpec::number(2)));
    }

    #[test]
    fn instances_problems_are_located() {
        let (_, problems) = parse(
            r#"
lab:
  instances: {number: 2, size-of: Students}
  services:
    web: {service: nginx, instances: many}
"#,
        );
        let paths: Vec<_> = problems.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["folders.lab.instances", "folders.lab.services.web.instances"]
        );
    }

    #[test]
    fn service_instance_requires_service() {
        let (_, problems) = parse("lab:\n  services:\n    web: {networks: [LAN]}\n");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].path, "folders.lab.services.web");
    }

    #[test]
    fn walk_visits_in_pre_order() {
        let (folders, _) = parse("a:\n  b:\n    services: {}\n  c:\n    services: {}\n");
        let mut seen = Vec::new();
        folders[0].walk("folders", &mut |_, path| seen.push(path.to_string()));
        assert_eq!(seen, vec!["folders.a", "folders.a.b", "folders.a.c"]);
    }
}
