// ============================================================================
// File: packages/adles/src/instancer/groups.rs
// ----------------------------------------------------------------------------
// Template group expansion
// ============================================================================

use std::collections::BTreeMap;

use crate::error::Problem;
use crate::resolver::SymbolTable;
use crate::spec::GroupSource;

use super::instance_names;

/// A concrete group permissions are granted to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteGroup {
    /// Label of the group definition
    pub label: String,

    /// 1-based instance index for template groups
    pub index: Option<u32>,

    /// Name of the group on the platform
    pub name: String,

    /// Whether the group lives in an external directory
    pub directory: bool,

    /// Known members, empty for directory groups
    pub members: Vec<String>,
}

/// Concrete groups by definition label
pub type GroupTable = BTreeMap<String, Vec<ConcreteGroup>>;

/// Expand every group of the symbol table
///
/// Simple groups yield one concrete group. Template groups yield one per
/// instance, named `<label>-<index>` (directory groups use the directory
/// group name as prefix).
pub fn expand_groups(symbols: &SymbolTable<'_>) -> Result<GroupTable, Vec<Problem>> {
    let mut table = GroupTable::new();
    let mut problems = Vec::new();

    for (label, group) in symbols.groups() {
        let (directory, base_name) = match &group.source {
            GroupSource::Directory(name) => (true, name.as_str()),
            _ => (false, label),
        };

        let concrete = match group.instances {
            None => vec![ConcreteGroup {
                label: label.to_string(),
                index: None,
                name: base_name.to_string(),
                directory,
                members: group.users(None).unwrap_or_default(),
            }],
            Some(n) if n >= 1 => match u32::try_from(n) {
                Ok(count) => instance_names(base_name, count)
                    .into_iter()
                    .map(|instance| ConcreteGroup {
                        label: label.to_string(),
                        index: instance.index,
                        name: instance.name,
                        directory,
                        members: group.users(instance.index).unwrap_or_default(),
                    })
                    .collect(),
                Err(_) => {
                    problems.push(Problem::new(
                        format!("groups.{label}.instances"),
                        format!("instance count {n} is too large"),
                    ));
                    continue;
                }
            },
            Some(n) => {
                problems.push(Problem::new(
                    format!("groups.{label}.instances"),
                    format!("instance count must be at least 1 (got {n})"),
                ));
                continue;
            }
        };
        table.insert(label.to_string(), concrete);
    }

    if problems.is_empty() {
        Ok(table)
    } else {
        Err(problems)
    }
}
