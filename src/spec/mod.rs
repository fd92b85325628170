// ============================================================================
// File: packages/adles/src/spec/mod.rs
// ----------------------------------------------------------------------------
// Typed exercise specification.
//
// The YAML document is parsed strictly into closed types. Every schema
// problem found is collected before failing, so one run reports them all.
// ============================================================================

mod folder;
mod group;
mod metadata;
mod network;
mod package;
mod service;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

pub use folder::{
    FolderBody, FolderSpec, InstanceCount, InstancesSpec, NetworkAttachments, Scoring,
    ServiceInstanceSpec, FOLDER_KEYWORDS,
};
pub use group::{GroupMembers, GroupSource, GroupSpec};
pub use metadata::Metadata;
pub use network::{NetworkKind, NetworkSpec, Networks, Subnet, SubnetError};
pub use package::{PackageContents, PackageMetadata, PackageSpec};
pub use service::{Provisioner, ServiceKind, ServiceResources, ServiceSpec};

use crate::error::{AdlesError, AdlesResult, Problem};

const REQUIRED_SECTIONS: &[&str] = &["metadata", "groups", "services", "networks", "folders"];
const OPTIONAL_SECTIONS: &[&str] = &["resources"];

/// A parsed exercise specification
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    pub metadata: Metadata,
    pub groups: BTreeMap<String, GroupSpec>,
    pub services: BTreeMap<String, ServiceSpec>,
    pub networks: Networks,

    /// Free-form resource pool settings, carried for drivers that use them
    pub resources: Option<Value>,

    /// Top-level folders in declaration order
    pub folders: Vec<FolderSpec>,

    /// Non-fatal findings of the parse
    pub warnings: Vec<Problem>,

    /// File the specification was loaded from
    pub source: Option<PathBuf>,
}

impl Specification {
    /// Load a specification file
    ///
    /// Relative paths inside the document (user files) are resolved
    /// against the file's directory. A missing `metadata.name` defaults to
    /// the file stem.
    pub fn from_path(path: &Path) -> AdlesResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AdlesError::io(path, e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut spec = Self::from_yaml_str(&text, &base_dir)?;
        if spec.metadata.name.is_none() {
            spec.metadata.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        spec.source = Some(path.to_path_buf());
        Ok(spec)
    }

    /// Parse a specification document
    pub fn from_yaml_str(text: &str, base_dir: &Path) -> AdlesResult<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value, base_dir)
    }

    /// Build a specification from an already-loaded YAML tree
    pub fn from_value(value: &Value, base_dir: &Path) -> AdlesResult<Self> {
        let Some(root) = value.as_mapping() else {
            return Err(AdlesError::schema(vec![Problem::new(
                "<root>",
                "specification must be a mapping of sections",
            )]));
        };

        let mut problems = Vec::new();
        let mut warnings = Vec::new();

        for section in REQUIRED_SECTIONS {
            if !root.contains_key(*section) {
                problems.push(Problem::new(*section, "missing required section"));
            }
        }
        for key in root.keys() {
            let name = key.as_str().unwrap_or("<non-string key>");
            if !REQUIRED_SECTIONS.contains(&name) && !OPTIONAL_SECTIONS.contains(&name) {
                warnings.push(Problem::new(name, "unknown section is ignored"));
            }
        }

        let metadata = match root.get("metadata") {
            Some(value) => serde_yaml::from_value::<Metadata>(value.clone()).unwrap_or_else(|e| {
                problems.push(Problem::new("metadata", e.to_string()));
                Metadata::default()
            }),
            None => Metadata::default(),
        };

        let mut groups = BTreeMap::new();
        for (label, value) in labelled_entries(root.get("groups"), "groups", &mut problems) {
            if let Some(group) = GroupSpec::parse(&label, value, base_dir, &mut problems) {
                groups.insert(label, group);
            }
        }

        let mut services = BTreeMap::new();
        for (label, value) in labelled_entries(root.get("services"), "services", &mut problems) {
            if let Some(service) = ServiceSpec::parse(&label, value, &mut problems) {
                services.insert(label, service);
            }
        }

        let networks = match root.get("networks") {
            Some(Value::Null) | None => Networks::default(),
            Some(value) => serde_yaml::from_value::<Networks>(value.clone()).unwrap_or_else(|e| {
                problems.push(Problem::new("networks", e.to_string()));
                Networks::default()
            }),
        };
        for label in networks.duplicate_labels() {
            problems.push(Problem::new(
                format!("networks.{label}"),
                "defined as both a unique and a generic network",
            ));
        }

        let folders = match root.get("folders") {
            Some(value) => FolderSpec::parse_all(value, &mut problems),
            None => Vec::new(),
        };

        if !problems.is_empty() {
            return Err(AdlesError::schema(problems));
        }

        Ok(Self {
            metadata,
            groups,
            services,
            networks,
            resources: root.get("resources").cloned(),
            folders,
            warnings,
            source: None,
        })
    }

    /// Directory of the specification file, if it was loaded from disk
    pub fn base_dir(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }
}

/// Entries of a label-keyed section, reporting non-mapping sections
fn labelled_entries<'a>(
    section: Option<&'a Value>,
    name: &str,
    problems: &mut Vec<Problem>,
) -> Vec<(String, &'a Value)> {
    match section {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(entries)) => entries
            .iter()
            .filter_map(|(key, value)| match key.as_str() {
                Some(label) => Some((label.to_string(), value)),
                None => {
                    problems.push(Problem::new(name, "labels must be strings"));
                    None
                }
            })
            .collect(),
        Some(_) => {
            problems.push(Problem::new(name, "must be a mapping of labels"));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests;
