// ============================================================================
// File: packages/adles/src/resolver/checks.rs
// ----------------------------------------------------------------------------
// Individual resolution checks
// ============================================================================

use crate::instancer::{VLAN_RESERVED_START, base_count};
use crate::spec::{
    FolderSpec, InstancesSpec, NetworkAttachments, NetworkKind, ServiceInstanceSpec,
    Specification,
};

use super::{Diagnostics, SymbolTable};

pub(super) fn check_metadata(spec: &Specification, diagnostics: &mut Diagnostics) {
    let metadata = &spec.metadata;
    if metadata.description.is_none() {
        diagnostics.warning("metadata.description", "not specified");
    }
    if metadata.version.is_none() {
        diagnostics.warning("metadata.version", "not specified");
    }
    if metadata.folder_name.is_none() {
        diagnostics.warning(
            "metadata.folder-name",
            format!(
                "not specified, root folder will be named '{}'",
                metadata.root_folder_name()
            ),
        );
    }
}

pub(super) fn check_networks(spec: &Specification, diagnostics: &mut Diagnostics) {
    for (kind, label, network) in spec.networks.iter() {
        let path = format!("networks.{}.{label}", kind.section());

        match kind {
            NetworkKind::Unique => {
                if network.increment.is_some() {
                    diagnostics.error(
                        path.as_str(),
                        "increment is only valid on generic networks",
                    );
                }
                match network.vlan {
                    Some(0) => diagnostics.error(path.as_str(), "vlan 0 is not a valid tag"),
                    Some(vlan) if vlan >= VLAN_RESERVED_START => diagnostics.error(
                        path.as_str(),
                        format!(
                            "vlan {vlan} is in the range reserved for allocation ({VLAN_RESERVED_START} and above)"
                        ),
                    ),
                    _ => {}
                }
            }
            NetworkKind::Generic => {
                if network.vlan.is_some() {
                    diagnostics.error(
                        path.as_str(),
                        "vlan cannot be set on generic networks, tags are allocated per instance",
                    );
                }
            }
        }

        match network.subnet {
            None if network.increments() => {
                diagnostics.error(path.as_str(), "increment requires a subnet");
            }
            None => diagnostics.warning(path.as_str(), "no subnet specified"),
            Some(subnet) if subnet.is_unusable() => diagnostics.error(
                path.as_str(),
                format!("subnet {subnet} is in reserved address space"),
            ),
            Some(subnet) if !subnet.is_private() => diagnostics.warning(
                path.as_str(),
                format!("subnet {subnet} is not in private address space"),
            ),
            Some(_) => {}
        }
    }
}

pub(super) fn check_folders(
    spec: &Specification,
    symbols: &SymbolTable<'_>,
    diagnostics: &mut Diagnostics,
) {
    for folder in &spec.folders {
        folder.walk("folders", &mut |folder, path| {
            check_folder(folder, path, symbols, diagnostics);
        });
    }
}

fn check_folder(
    folder: &FolderSpec,
    path: &str,
    symbols: &SymbolTable<'_>,
    diagnostics: &mut Diagnostics,
) {
    if let Some(group) = &folder.group {
        if symbols.group(group).is_none() {
            diagnostics.error(path, format!("group \"{group}\" is not defined"));
        }
    }
    if let Some(group) = &folder.master_group {
        if symbols.group(group).is_none() {
            diagnostics.error(path, format!("master-group \"{group}\" is not defined"));
        }
    }
    if let Some(instances) = &folder.instances {
        check_instances(instances, path, symbols, diagnostics);
    }

    if folder.children().is_empty() && folder.services().is_empty() {
        diagnostics.warning(path, "folder has no services or child folders");
    }

    for service in folder.services() {
        let service_path = format!("{path}.services.{}", service.name);
        check_service_instance(service, &service_path, symbols, diagnostics);
    }
}

/// Counts that cannot resolve, independent of thresholds
fn check_instances(
    instances: &InstancesSpec,
    path: &str,
    symbols: &SymbolTable<'_>,
    diagnostics: &mut Diagnostics,
) {
    if let Err(problem) = base_count(instances, symbols, &format!("{path}.instances")) {
        diagnostics.error(problem.path, problem.message);
    }
}

fn check_service_instance(
    instance: &ServiceInstanceSpec,
    path: &str,
    symbols: &SymbolTable<'_>,
    diagnostics: &mut Diagnostics,
) {
    let service = symbols.service(&instance.service);
    if service.is_none() {
        diagnostics.error(
            path,
            format!("service \"{}\" is not defined", instance.service),
        );
    }

    for label in instance.networks.labels() {
        if symbols.network(label).is_none() {
            diagnostics.error(path, format!("network \"{label}\" is not defined"));
        }
    }

    if let Some(instances) = &instance.instances {
        check_instances(instances, path, symbols, diagnostics);
    }

    if let Some(service) = service {
        let declared = &service.network_interfaces;
        match &instance.networks {
            NetworkAttachments::Mapped(pairs) => {
                for (iface, _) in pairs {
                    if !declared.contains(iface) {
                        diagnostics.error(
                            format!("{path}.networks"),
                            format!(
                                "interface '{iface}' is not declared by service \"{}\"",
                                instance.service
                            ),
                        );
                    }
                }
            }
            NetworkAttachments::Ordered(labels) => {
                if !declared.is_empty() && labels.len() > declared.len() {
                    diagnostics.warning(
                        format!("{path}.networks"),
                        format!(
                            "{} networks listed but service \"{}\" declares {} interfaces",
                            labels.len(),
                            instance.service,
                            declared.len()
                        ),
                    );
                }
            }
        }
    }

    if let Some(scoring) = &instance.scoring {
        let scoring_path = format!("{path}.scoring");
        if scoring.criteria.is_none() {
            diagnostics.error(scoring_path.as_str(), "criteria is required");
        }
        if scoring.ports.is_none() {
            diagnostics.warning(scoring_path.as_str(), "no ports specified");
        }
        if scoring.protocols.is_none() {
            diagnostics.warning(scoring_path.as_str(), "no protocols specified");
        }
    }
}
