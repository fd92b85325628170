// ============================================================================
// File: packages/adles/src/instancer/mod.rs
// ----------------------------------------------------------------------------
// Expansion of templated entities into concrete instances.
//
// Covers instance count resolution (explicit numbers, size-of groups and
// thresholds), deterministic naming, template group expansion, and subnet
// and VLAN allocation for generic networks.
// ============================================================================

mod allocators;
mod groups;

use std::fmt;

pub use allocators::{SubnetAllocator, VlanAllocator};
pub use groups::{expand_groups, ConcreteGroup, GroupTable};

use crate::config::{Threshold, Thresholds};
use crate::error::Problem;
use crate::resolver::SymbolTable;
use crate::spec::{GroupSource, GroupSpec, InstanceCount, InstancesSpec};

/// Tags at and above this value are reserved for automatic allocation
pub const VLAN_RESERVED_START: u16 = 2000;

/// First automatically allocated VLAN tag
pub const VLAN_FIRST: u16 = 2001;

/// Last automatically allocated VLAN tag
pub const VLAN_LAST: u16 = 4094;

/// Kind of instanced entity, for threshold lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Folder,
    Service,
}

impl EntityKind {
    fn threshold(self, thresholds: &Thresholds) -> Threshold {
        match self {
            EntityKind::Folder => thresholds.folder,
            EntityKind::Service => thresholds.service,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Folder => f.write_str("folder"),
            EntityKind::Service => f.write_str("service"),
        }
    }
}

/// One concrete instance of a possibly templated entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    /// 1-based index, `None` for entities without an instances spec
    pub index: Option<u32>,

    /// Zero-padded index as it appears in names
    pub suffix: Option<String>,

    /// Concrete name
    pub name: String,
}

/// Expands instance specifications for one specification
#[derive(Debug, Clone)]
pub struct Instancer<'a> {
    symbols: &'a SymbolTable<'a>,
    thresholds: Thresholds,
}

impl<'a> Instancer<'a> {
    pub fn new(symbols: &'a SymbolTable<'a>, thresholds: Thresholds) -> Self {
        Self {
            symbols,
            thresholds,
        }
    }

    /// Resolve an instance count
    ///
    /// # Arguments
    /// * `instances` - The entity's instances spec
    /// * `kind` - Entity kind, selects the threshold
    /// * `path` - Specification path used in problems
    ///
    /// # Returns
    /// Count of at least 1, or the problem that prevents resolving it
    pub fn count(
        &self,
        instances: &InstancesSpec,
        kind: EntityKind,
        path: &str,
    ) -> Result<u32, Problem> {
        let count = base_count(instances, self.symbols, path)?;

        let threshold = kind.threshold(&self.thresholds);
        if count > threshold.error {
            return Err(Problem::new(
                path,
                format!(
                    "{count} instances exceeds the {kind} error threshold ({})",
                    threshold.error
                ),
            ));
        }
        if count > threshold.warn {
            log::warn!(
                "{path}: {count} instances exceeds the {kind} warning threshold ({})",
                threshold.warn
            );
        }
        Ok(count)
    }

    /// Concrete instances of an entity
    ///
    /// Entities without an instances spec yield a single instance with the
    /// bare name.
    pub fn expand(
        &self,
        name: &str,
        instances: Option<&InstancesSpec>,
        kind: EntityKind,
        path: &str,
    ) -> Result<Vec<InstanceName>, Problem> {
        let Some(instances) = instances else {
            return Ok(vec![InstanceName {
                index: None,
                suffix: None,
                name: name.to_string(),
            }]);
        };
        let count = self.count(instances, kind, path)?;
        let prefix = instances.prefix.as_deref().unwrap_or(name);
        Ok(instance_names(prefix, count))
    }
}

/// Instance count before thresholds apply
///
/// Shared by resolution, which reports every bad count at once, and by
/// the instancer.
pub fn base_count(
    instances: &InstancesSpec,
    symbols: &SymbolTable<'_>,
    path: &str,
) -> Result<u32, Problem> {
    let count = match &instances.count {
        Some(InstanceCount::Number(n)) => *n,
        Some(InstanceCount::SizeOf(label)) => {
            let group = symbols.group(label).ok_or_else(|| {
                Problem::new(path, format!("size-of group \"{label}\" is not defined"))
            })?;
            i64::from(group_size(label, group).map_err(|m| Problem::new(path, m))?)
        }
        None => {
            return Err(Problem::new(
                path,
                "instances mapping needs either 'number' or 'size-of'",
            ));
        }
    };

    if count < 1 {
        return Err(Problem::new(
            path,
            format!("instance count must be at least 1 (got {count})"),
        ));
    }
    u32::try_from(count)
        .map_err(|_| Problem::new(path, format!("instance count {count} is too large")))
}

/// `<prefix>-<index>` names, 1-based, zero-padded to the width of `count`
pub fn instance_names(prefix: &str, count: u32) -> Vec<InstanceName> {
    let width = count.to_string().len();
    (1..=count)
        .map(|index| {
            let suffix = format!("{index:0width$}");
            InstanceName {
                index: Some(index),
                name: format!("{prefix}-{suffix}"),
                suffix: Some(suffix),
            }
        })
        .collect()
}

/// Size of a group for `size-of`
///
/// Template groups count their instances; user lists and user files count
/// distinct users. Directory membership is not known locally.
pub fn group_size(label: &str, group: &GroupSpec) -> Result<u32, String> {
    if let Some(instances) = group.instances {
        return u32::try_from(instances)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| format!("template group \"{label}\" has invalid instance count {instances}"));
    }
    if let GroupSource::Directory(name) = &group.source {
        return Err(format!(
            "size of directory group \"{label}\" ({name}) cannot be resolved"
        ));
    }
    let users = group.users(None).unwrap_or_default();
    u32::try_from(users.len()).map_err(|_| format!("group \"{label}\" is too large"))
}
