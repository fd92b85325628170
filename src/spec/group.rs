// ============================================================================
// File: packages/adles/src/spec/group.rs
// ----------------------------------------------------------------------------
// Group definitions: simple groups (user list, directory group, user file)
// and template groups carrying an instance count.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Problem;

/// Where the members of a group come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    /// Explicit list of user names
    UserList(Vec<String>),

    /// External directory (Active Directory) group, membership unknown locally
    Directory(String),

    /// JSON user file, loaded at parse time
    File { path: PathBuf, members: GroupMembers },
}

/// Members loaded from a user file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMembers {
    /// `{ "user": "password", ... }`
    Flat(Vec<String>),

    /// `{ "1": { "user": "password" }, "2": { ... } }` for template groups
    PerInstance(BTreeMap<u32, Vec<String>>),
}

/// A parsed group definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub source: GroupSource,

    /// Instance count for template groups (validated by the instancer)
    pub instances: Option<i64>,

    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawGroup {
    #[serde(default)]
    instances: Option<i64>,
    #[serde(default)]
    ad_group: Option<String>,
    #[serde(default)]
    filename: Option<PathBuf>,
    #[serde(default)]
    user_list: Option<Vec<String>>,
    #[serde(default)]
    description: Option<String>,
}

impl GroupSpec {
    /// Parse one entry of the `groups` section
    ///
    /// # Arguments
    /// * `label` - Group label
    /// * `value` - Raw YAML value
    /// * `base_dir` - Directory user files are resolved against
    /// * `problems` - Sink for schema problems
    pub fn parse(
        label: &str,
        value: &serde_yaml::Value,
        base_dir: &Path,
        problems: &mut Vec<Problem>,
    ) -> Option<Self> {
        let path = format!("groups.{label}");
        let raw: RawGroup = match serde_yaml::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                problems.push(Problem::new(path, e.to_string()));
                return None;
            }
        };

        let is_template = raw.instances.is_some();
        let sources = [
            raw.ad_group.is_some(),
            raw.filename.is_some(),
            raw.user_list.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        if sources != 1 {
            problems.push(Problem::new(
                path,
                "exactly one of 'user-list', 'ad-group' or 'filename' must be given",
            ));
            return None;
        }

        let source = if let Some(ad_group) = raw.ad_group {
            GroupSource::Directory(ad_group)
        } else if let Some(filename) = raw.filename {
            let full = if filename.is_absolute() {
                filename.clone()
            } else {
                base_dir.join(&filename)
            };
            match load_user_file(&full, is_template) {
                Ok(members) => GroupSource::File {
                    path: full,
                    members,
                },
                Err(message) => {
                    problems.push(Problem::new(format!("{path}.filename"), message));
                    return None;
                }
            }
        } else {
            let users = raw.user_list.unwrap_or_default();
            if is_template {
                problems.push(Problem::new(
                    path,
                    "template groups must use 'ad-group' or 'filename', not 'user-list'",
                ));
                return None;
            }
            GroupSource::UserList(users)
        };

        Some(Self {
            source,
            instances: raw.instances,
            description: raw.description,
        })
    }

    /// Whether this is a template group
    pub fn is_template(&self) -> bool {
        self.instances.is_some()
    }

    /// Whether membership lives in an external directory
    pub fn is_directory(&self) -> bool {
        matches!(self.source, GroupSource::Directory(_))
    }

    /// Distinct users of the group (or of one template instance)
    ///
    /// Returns `None` for directory groups, whose membership is not known locally.
    pub fn users(&self, instance: Option<u32>) -> Option<Vec<String>> {
        let users: Vec<String> = match (&self.source, instance) {
            (GroupSource::Directory(_), _) => return None,
            (GroupSource::UserList(users), _) => users.clone(),
            (GroupSource::File { members, .. }, instance) => match (members, instance) {
                (GroupMembers::Flat(users), _) => users.clone(),
                (GroupMembers::PerInstance(map), Some(i)) => {
                    map.get(&i).cloned().unwrap_or_default()
                }
                (GroupMembers::PerInstance(map), None) => {
                    map.values().flatten().cloned().collect()
                }
            },
        };

        let mut seen = BTreeSet::new();
        Some(
            users
                .into_iter()
                .filter(|user| seen.insert(user.clone()))
                .collect(),
        )
    }
}

/// Read a JSON user file
fn load_user_file(path: &Path, per_instance: bool) -> Result<GroupMembers, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read user file {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| format!("invalid JSON in user file {}: {e}", path.display()))?;
    let object = value
        .as_object()
        .ok_or_else(|| format!("user file {} must contain an object", path.display()))?;

    if !per_instance {
        return Ok(GroupMembers::Flat(object.keys().cloned().collect()));
    }

    let mut instances = BTreeMap::new();
    for (key, users) in object {
        let index: u32 = key
            .parse()
            .map_err(|_| format!("instance key '{key}' in {} is not a number", path.display()))?;
        let users = users
            .as_object()
            .ok_or_else(|| format!("instance '{key}' in {} must be an object", path.display()))?;
        instances.insert(index, users.keys().cloned().collect());
    }
    Ok(GroupMembers::PerInstance(instances))
}
