// ============================================================================
// File: packages/adles/src/executor/state.rs
// ----------------------------------------------------------------------------
// Phase State: what the current run has created on the platform, including
// the master registry. Lives for one executor and is never persisted.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

use crate::driver::{FolderRef, InstanceRef, NetworkDefinition};
use crate::plan::MasterKey;

/// Platform objects created during this run
#[derive(Debug, Default, Clone)]
pub struct PhaseState {
    folders: BTreeSet<FolderRef>,
    networks: BTreeMap<String, NetworkDefinition>,

    /// Service instances by full path
    instances: BTreeMap<String, InstanceRef>,

    /// Instance paths powered on by a deploy
    powered: BTreeSet<String>,

    masters: BTreeMap<MasterKey, InstanceRef>,
}

impl PhaseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_folder(&self, folder: &FolderRef) -> bool {
        self.folders.contains(folder)
    }

    pub fn record_folder(&mut self, folder: FolderRef) {
        self.folders.insert(folder);
    }

    /// Definition recorded under a network name
    pub fn network(&self, name: &str) -> Option<&NetworkDefinition> {
        self.networks.get(name)
    }

    pub fn record_network(&mut self, definition: NetworkDefinition) {
        self.networks.insert(definition.name.clone(), definition);
    }

    pub fn forget_network(&mut self, name: &str) {
        self.networks.remove(name);
    }

    pub fn instance(&self, path: &str) -> Option<&InstanceRef> {
        self.instances.get(path)
    }

    pub fn record_instance(&mut self, instance: InstanceRef) {
        self.instances.insert(instance.to_string(), instance);
    }

    pub fn record_power_on(&mut self, instance: &InstanceRef) {
        self.powered.insert(instance.to_string());
    }

    pub fn is_powered(&self, path: &str) -> bool {
        self.powered.contains(path)
    }

    /// Register a master under its key
    pub fn register_master(&mut self, key: MasterKey, instance: InstanceRef) {
        log::debug!("registered master {instance} for {key}");
        self.masters.insert(key, instance);
    }

    pub fn master(&self, key: &MasterKey) -> Option<&InstanceRef> {
        self.masters.get(key)
    }

    pub fn masters(&self) -> impl Iterator<Item = (&MasterKey, &InstanceRef)> {
        self.masters.iter()
    }

    /// Drop everything recorded at or below a deleted folder
    pub fn forget_folder(&mut self, folder: &FolderRef) {
        self.folders.retain(|f| !f.is_within(folder));
        self.instances.retain(|_, i| !i.folder.is_within(folder));
        let instances = &self.instances;
        self.powered.retain(|path| instances.contains_key(path));
        self.masters.retain(|_, i| !i.folder.is_within(folder));
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forgetting_a_folder_drops_its_contents() {
        let mut state = PhaseState::new();
        let lab = FolderRef::new(["lab"]);
        let masters = lab.child("MASTER-FOLDERS");
        state.record_folder(lab.clone());
        state.record_folder(masters.clone());
        let key = MasterKey {
            folder: "folders.teams".into(),
            service: "kali".into(),
        };
        state.register_master(key.clone(), InstanceRef::at(masters.clone(), "(MASTER) kali"));
        state.record_instance(InstanceRef::at(lab.clone(), "web"));

        state.forget_folder(&masters);
        assert!(state.has_folder(&lab));
        assert!(!state.has_folder(&masters));
        assert!(state.master(&key).is_none());
        assert!(state.instance("/lab/web").is_some());
    }
}
