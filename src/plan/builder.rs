// ============================================================================
// File: packages/adles/src/plan/builder.rs
// ----------------------------------------------------------------------------
// Folder tree builder: expands the folder hierarchy of a specification into
// the operation tree of both phases.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Thresholds;
use crate::driver::{FolderRef, GroupRef, NetworkDefinition, NetworkRef, NicAttachment, Role};
use crate::error::{AdlesError, AdlesResult, Problem};
use crate::instancer::{
    ConcreteGroup, EntityKind, GroupTable, InstanceName, Instancer, SubnetAllocator,
    VlanAllocator, expand_groups,
};
use crate::resolver::SymbolTable;
use crate::spec::{
    FolderSpec, NetworkAttachments, NetworkKind, ServiceInstanceSpec, ServiceSpec, Specification,
};

use super::OperationTree;
use super::operation::{
    Applicability, MasterKey, Operation, OperationId, ServiceOperation,
};

/// Name of the folder holding master folders
pub const MASTER_FOLDER_NAME: &str = "MASTER-FOLDERS";

/// Prefix of master folder, service and network names
pub const MASTER_PREFIX: &str = "(MASTER) ";

/// Build the operation tree of a resolved specification
///
/// # Arguments
/// * `spec` - Parsed specification
/// * `symbols` - Symbol table from a resolution without errors
/// * `thresholds` - Instance count thresholds
///
/// # Returns
/// The operation tree, or an instancing error listing every problem found
pub fn build(
    spec: &Specification,
    symbols: &SymbolTable<'_>,
    thresholds: Thresholds,
) -> AdlesResult<OperationTree> {
    let mut problems = Vec::new();
    let groups = expand_groups(symbols).unwrap_or_else(|mut group_problems| {
        problems.append(&mut group_problems);
        GroupTable::new()
    });

    let explicit_vlans = spec.networks.iter().filter_map(|(_, _, net)| net.vlan);
    let bindings = bind_generic_networks(spec, symbols);
    let mut builder = TreeBuilder {
        spec,
        symbols,
        instancer: Instancer::new(symbols, thresholds),
        groups,
        qualified: shared_labels(&bindings),
        bindings,
        network_names: BTreeMap::new(),
        subnets: spec
            .networks
            .generic_networks
            .iter()
            .map(|(label, net)| (label.clone(), SubnetAllocator::new(net)))
            .collect(),
        vlans: VlanAllocator::new(explicit_vlans),
        tree: OperationTree::new(),
        problems,
    };
    builder.build_root();

    if builder.problems.is_empty() {
        log::debug!(
            "built operation tree for {} with {} operations",
            spec.metadata.display_name(),
            builder.tree.len()
        );
        Ok(builder.tree)
    } else {
        Err(AdlesError::Instancing {
            problems: builder.problems,
        })
    }
}

/// Generic network labels by the folder they bind to
///
/// The key is the dotted path of the nearest instanced ancestor-or-self of a
/// referencing service, `None` for references bound to the environment root.
type Bindings = BTreeMap<Option<String>, BTreeSet<String>>;

fn bind_generic_networks(spec: &Specification, symbols: &SymbolTable<'_>) -> Bindings {
    fn visit(
        folder: &FolderSpec,
        path: &str,
        nearest: Option<&str>,
        symbols: &SymbolTable<'_>,
        bindings: &mut Bindings,
    ) {
        if !folder.enabled {
            return;
        }
        let path = format!("{path}.{}", folder.name);
        let nearest = if folder.instances.is_some() {
            Some(path.as_str())
        } else {
            nearest
        };
        for service in folder.services().iter().filter(|s| s.enabled) {
            for label in service.networks.labels() {
                if let Some((NetworkKind::Generic, _)) = symbols.network(label) {
                    bindings
                        .entry(nearest.map(str::to_string))
                        .or_default()
                        .insert(label.to_string());
                }
            }
        }
        for child in folder.children() {
            visit(child, &path, nearest, symbols, bindings);
        }
    }

    let mut bindings = Bindings::new();
    for folder in &spec.folders {
        visit(folder, "folders", None, symbols, &mut bindings);
    }
    bindings
}

/// Generic labels bound to more than one instanced folder
///
/// Their concrete names carry the instance names of the binding folder, so
/// `LAN` shared by `red` and `blue` becomes `LAN-red-1` and `LAN-blue-1`.
fn shared_labels(bindings: &Bindings) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut shared = BTreeSet::new();
    for labels in bindings
        .iter()
        .filter_map(|(key, labels)| key.as_ref().map(|_| labels))
    {
        for label in labels {
            if !seen.insert(label) {
                shared.insert(label.clone());
            }
        }
    }
    shared
}

/// Concrete network names visible inside a folder instance
type NetworkScope = BTreeMap<String, String>;

struct TreeBuilder<'s, 'a> {
    spec: &'s Specification,
    symbols: &'s SymbolTable<'a>,
    instancer: Instancer<'s>,
    groups: GroupTable,
    bindings: Bindings,
    qualified: BTreeSet<String>,

    /// Concrete network names already planned, with the path that produced them
    network_names: BTreeMap<String, String>,
    subnets: BTreeMap<String, SubnetAllocator>,
    vlans: VlanAllocator,
    tree: OperationTree,
    problems: Vec<Problem>,
}

impl<'s, 'a> TreeBuilder<'s, 'a> {
    /// Platform name of a network label
    fn network_name(&self, label: &str) -> String {
        match &self.spec.metadata.prefix {
            Some(prefix) => format!("{prefix}{label}"),
            None => label.to_string(),
        }
    }

    /// Reserve a concrete network name
    ///
    /// Two networks planned under one name would be merged on the platform.
    fn claim_network_name(&mut self, name: &str, path: &str) -> bool {
        if let Some(first) = self.network_names.get(name) {
            self.problems.push(Problem::new(
                path,
                format!("network name \"{name}\" is already produced by {first}"),
            ));
            return false;
        }
        self.network_names.insert(name.to_string(), path.to_string());
        true
    }

    fn allocate_vlan(&mut self, path: &str) -> u16 {
        match self.vlans.allocate() {
            Ok(vlan) => vlan,
            Err(message) => {
                self.problems.push(Problem::new(path, message));
                0
            }
        }
    }

    fn build_root(&mut self) {
        let spec = self.spec;
        let metadata = &spec.metadata;
        let mut parent_id = None;
        let mut parent_ref: Option<FolderRef> = None;
        for component in FolderRef::parse(metadata.root_path()).components() {
            let folder = match &parent_ref {
                Some(parent) => parent.child(component.clone()),
                None => FolderRef::new([component.clone()]),
            };
            parent_id = Some(self.tree.push(
                parent_id,
                Applicability::Both,
                "metadata.root-path",
                Operation::CreateFolder {
                    parent: parent_ref.clone(),
                    name: component.clone(),
                    folder: folder.clone(),
                },
            ));
            parent_ref = Some(folder);
        }

        let name = metadata.root_folder_name().to_string();
        let root = match &parent_ref {
            Some(parent) => parent.child(name.clone()),
            None => FolderRef::new([name.clone()]),
        };
        let root_id = self.tree.push(
            parent_id,
            Applicability::Both,
            "metadata",
            Operation::CreateFolder {
                parent: parent_ref,
                name,
                folder: root.clone(),
            },
        );

        for (label, net) in &spec.networks.unique_networks {
            let path = format!("networks.unique-networks.{label}");
            let name = self.network_name(label);
            if !self.claim_network_name(&name, &path) {
                continue;
            }
            let vlan = match net.vlan {
                Some(vlan) => vlan,
                None => self.allocate_vlan(&path),
            };
            let definition = NetworkDefinition {
                name,
                kind: NetworkKind::Unique,
                subnet: net.subnet,
                vlan,
                vswitch: net.vswitch.clone(),
            };
            self.tree.push(
                Some(root_id),
                Applicability::Both,
                path,
                Operation::CreateNetwork { definition },
            );
        }

        let mut scope = NetworkScope::new();
        let unbound = self.bindings.get(&None).cloned().unwrap_or_default();
        for label in unbound {
            let name = self.network_name(&label);
            let origin = format!("networks.generic-networks.{label}");
            self.push_generic(
                root_id,
                &origin,
                Applicability::DeployOnly,
                &label,
                name.clone(),
                true,
            );
            scope.insert(label, name);
        }

        self.build_masters(root_id, &root);

        for folder in spec.folders.iter().filter(|f| f.enabled) {
            self.deploy_folder(folder, "folders", root_id, &root, &[], &scope);
        }
    }

    /// Push a concrete generic network
    ///
    /// Deployed networks draw from the label's subnet allocator; master
    /// networks use the base subnet. `origin` is the folder path reported
    /// when the name is already taken.
    fn push_generic(
        &mut self,
        parent: OperationId,
        origin: &str,
        applicability: Applicability,
        label: &str,
        name: String,
        allocate_subnet: bool,
    ) {
        let path = format!("networks.generic-networks.{label}");
        if !self.claim_network_name(&name, origin) {
            return;
        }
        let Some((_, net)) = self.symbols.network(label) else {
            self.problems
                .push(Problem::new(&path, format!("network \"{label}\" is not defined")));
            return;
        };
        let subnet = if allocate_subnet {
            match self.subnets.get_mut(label).map(SubnetAllocator::allocate) {
                Some(Ok(subnet)) => subnet,
                Some(Err(message)) => {
                    self.problems.push(Problem::new(&path, message));
                    None
                }
                None => net.subnet,
            }
        } else {
            net.subnet
        };
        let vlan = self.allocate_vlan(&path);
        let definition = NetworkDefinition {
            name,
            kind: NetworkKind::Generic,
            subnet,
            vlan,
            vswitch: net.vswitch.clone(),
        };
        self.tree
            .push(Some(parent), applicability, path, Operation::CreateNetwork { definition });
    }

    fn build_masters(&mut self, root_id: OperationId, root: &FolderRef) {
        let masters = root.child(MASTER_FOLDER_NAME);
        let masters_id = self.tree.push(
            Some(root_id),
            Applicability::MasterOnly,
            "folders",
            Operation::CreateFolder {
                parent: Some(root.clone()),
                name: MASTER_FOLDER_NAME.to_string(),
                folder: masters.clone(),
            },
        );

        let labels: BTreeSet<String> = self.bindings.values().flatten().cloned().collect();
        let mut scope = NetworkScope::new();
        for label in labels {
            let name = format!("{MASTER_PREFIX}{}", self.network_name(&label));
            let origin = format!("networks.generic-networks.{label}");
            self.push_generic(
                masters_id,
                &origin,
                Applicability::MasterOnly,
                &label,
                name.clone(),
                false,
            );
            scope.insert(label, name);
        }

        let spec = self.spec;
        for folder in spec.folders.iter().filter(|f| f.enabled) {
            self.master_folder(folder, "folders", masters_id, &masters, &scope);
        }
    }

    /// Mirror a folder template under the master folder, without instancing
    fn master_folder(
        &mut self,
        folder: &FolderSpec,
        parent_path: &str,
        parent_id: OperationId,
        parent_ref: &FolderRef,
        scope: &NetworkScope,
    ) {
        let path = format!("{parent_path}.{}", folder.name);
        let name = format!("{MASTER_PREFIX}{}", folder.name);
        let folder_ref = parent_ref.child(name.clone());
        let id = self.tree.push(
            Some(parent_id),
            Applicability::MasterOnly,
            &path,
            Operation::CreateFolder {
                parent: Some(parent_ref.clone()),
                name,
                folder: folder_ref.clone(),
            },
        );

        if let Some(label) = folder.master_group.as_ref().or(folder.group.as_ref()) {
            for group in self.concrete_groups(label, &path) {
                self.tree.push(
                    Some(id),
                    Applicability::MasterOnly,
                    &path,
                    Operation::ApplyPermission {
                        target: folder_ref.clone(),
                        group: group_ref(&group),
                        role: Role::Master,
                    },
                );
            }
        }

        for service in folder.services().iter().filter(|s| s.enabled) {
            let service_path = format!("{path}.services.{}", service.name);
            let Some(definition) = self.lookup_service(service, &service_path) else {
                continue;
            };
            if !definition.kind.is_masterable() {
                continue;
            }
            let Some(nics) = self.attach(service, definition, scope, &service_path) else {
                continue;
            };
            let operation = ServiceOperation {
                folder: folder_ref.clone(),
                name: format!("{MASTER_PREFIX}{}", service.name),
                service: service.service.clone(),
                kind: definition.kind.clone(),
                nics,
                resources: definition.resources,
                note: definition.note.clone(),
                scoring: None,
                master_key: MasterKey {
                    folder: path.clone(),
                    service: service.name.clone(),
                },
                master: true,
            };
            self.tree.push(
                Some(id),
                Applicability::MasterOnly,
                service_path,
                Operation::CreateService(operation),
            );
        }

        for child in folder.children().iter().filter(|f| f.enabled) {
            self.master_folder(child, &path, id, &folder_ref, scope);
        }
    }

    /// Expand a folder template into its deployed instances
    fn deploy_folder(
        &mut self,
        folder: &FolderSpec,
        parent_path: &str,
        parent_id: OperationId,
        parent_ref: &FolderRef,
        lineage: &[InstanceName],
        scope: &NetworkScope,
    ) {
        let path = format!("{parent_path}.{}", folder.name);
        let instances = match self.instancer.expand(
            &folder.name,
            folder.instances.as_ref(),
            EntityKind::Folder,
            &format!("{path}.instances"),
        ) {
            Ok(instances) => instances,
            Err(problem) => {
                self.problems.push(problem);
                return;
            }
        };
        let count = instances.len();
        let bound: Vec<String> = self
            .bindings
            .get(&Some(path.clone()))
            .map(|labels| labels.iter().cloned().collect())
            .unwrap_or_default();

        for instance in instances {
            let folder_ref = parent_ref.child(instance.name.clone());
            let id = self.tree.push(
                Some(parent_id),
                Applicability::DeployOnly,
                &path,
                Operation::CreateFolder {
                    parent: Some(parent_ref.clone()),
                    name: instance.name.clone(),
                    folder: folder_ref.clone(),
                },
            );

            if let Some(label) = &folder.group {
                let groups = self.concrete_groups(label, &path);
                let paired = groups.len() == count
                    && groups.iter().all(|g| g.index.is_some())
                    && instance.index.is_some();
                for group in groups
                    .iter()
                    .filter(|g| !paired || g.index == instance.index)
                {
                    self.tree.push(
                        Some(id),
                        Applicability::DeployOnly,
                        &path,
                        Operation::ApplyPermission {
                            target: folder_ref.clone(),
                            group: group_ref(group),
                            role: Role::Member,
                        },
                    );
                }
            }

            let mut lineage = lineage.to_vec();
            if instance.suffix.is_some() {
                lineage.push(instance.clone());
            }
            let mut scope = scope.clone();
            for label in &bound {
                let qualifier: Vec<&str> = if self.qualified.contains(label) {
                    lineage.iter().map(|i| i.name.as_str()).collect()
                } else {
                    lineage.iter().filter_map(|i| i.suffix.as_deref()).collect()
                };
                let name = format!("{}-{}", self.network_name(label), qualifier.join("-"));
                self.push_generic(
                    id,
                    &path,
                    Applicability::DeployOnly,
                    label,
                    name.clone(),
                    true,
                );
                scope.insert(label.clone(), name);
            }

            for service in folder.services().iter().filter(|s| s.enabled) {
                self.deploy_service(service, &path, id, &folder_ref, &scope);
            }
            for child in folder.children().iter().filter(|f| f.enabled) {
                self.deploy_folder(child, &path, id, &folder_ref, &lineage, &scope);
            }
        }
    }

    fn deploy_service(
        &mut self,
        service: &ServiceInstanceSpec,
        folder_path: &str,
        parent_id: OperationId,
        folder_ref: &FolderRef,
        scope: &NetworkScope,
    ) {
        let path = format!("{folder_path}.services.{}", service.name);
        let Some(definition) = self.lookup_service(service, &path) else {
            return;
        };
        let instances = match self.instancer.expand(
            &service.name,
            service.instances.as_ref(),
            EntityKind::Service,
            &format!("{path}.instances"),
        ) {
            Ok(instances) => instances,
            Err(problem) => {
                self.problems.push(problem);
                return;
            }
        };
        let Some(nics) = self.attach(service, definition, scope, &path) else {
            return;
        };

        for instance in instances {
            let operation = ServiceOperation {
                folder: folder_ref.clone(),
                name: instance.name,
                service: service.service.clone(),
                kind: definition.kind.clone(),
                nics: nics.clone(),
                resources: definition.resources,
                note: definition.note.clone(),
                scoring: service.scoring.clone(),
                master_key: MasterKey {
                    folder: folder_path.to_string(),
                    service: service.name.clone(),
                },
                master: false,
            };
            self.tree.push(
                Some(parent_id),
                Applicability::DeployOnly,
                &path,
                Operation::CreateService(operation),
            );
        }
    }

    fn lookup_service(&mut self, service: &ServiceInstanceSpec, path: &str) -> Option<&'a ServiceSpec> {
        let definition = self.symbols.service(&service.service);
        if definition.is_none() {
            self.problems.push(Problem::new(
                path,
                format!("service \"{}\" is not defined", service.service),
            ));
        }
        definition
    }

    /// Concrete groups of a label; unknown labels are recorded as problems
    fn concrete_groups(&mut self, label: &str, path: &str) -> Vec<ConcreteGroup> {
        match self.groups.get(label) {
            Some(groups) => groups.clone(),
            None => {
                if self.symbols.group(label).is_none() {
                    self.problems
                        .push(Problem::new(path, format!("group \"{label}\" is not defined")));
                }
                Vec::new()
            }
        }
    }

    /// NIC attachments of a service instance within `scope`
    ///
    /// Ordered attachments take the service's declared interface names in
    /// order and fall back to `nic<i>`.
    fn attach(
        &mut self,
        service: &ServiceInstanceSpec,
        definition: &ServiceSpec,
        scope: &NetworkScope,
        path: &str,
    ) -> Option<Vec<NicAttachment>> {
        let pairs: Vec<(String, String)> = match &service.networks {
            NetworkAttachments::Ordered(labels) => labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let interface = definition
                        .network_interfaces
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("nic{i}"));
                    (interface, label.clone())
                })
                .collect(),
            NetworkAttachments::Mapped(pairs) => pairs.clone(),
        };

        let mut nics = Vec::with_capacity(pairs.len());
        let mut ok = true;
        for (interface, label) in pairs {
            let name = match self.symbols.network(&label) {
                Some((NetworkKind::Unique, _)) => Some(self.network_name(&label)),
                Some((NetworkKind::Generic, _)) => scope.get(&label).cloned(),
                None => None,
            };
            match name {
                Some(name) => nics.push(NicAttachment {
                    interface,
                    network: NetworkRef::new(name),
                }),
                None => {
                    self.problems.push(Problem::new(
                        format!("{path}.networks"),
                        format!("network \"{label}\" is not available here"),
                    ));
                    ok = false;
                }
            }
        }
        ok.then_some(nics)
    }
}

fn group_ref(group: &ConcreteGroup) -> GroupRef {
    GroupRef {
        name: group.name.clone(),
        directory: group.directory,
        members: group.members.clone(),
    }
}
