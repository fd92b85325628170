// ============================================================================
// File: packages/adles/src/driver/docker/driver.rs
// ----------------------------------------------------------------------------
// PlatformDriver implementation on the Docker Engine API.
//
// Docker has no folders or permission model. Folders are virtual paths
// recorded as container labels, so a folder exists while this session
// created it or while any managed container carries its path. Permissions
// are recorded as labels on the folder's containers created afterwards.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use http::Method;
use serde_json::{Value, json};

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::config::DockerConfig;
use crate::driver::errors::{DriverError, DriverResult};
use crate::driver::trait_def::PlatformDriver;
use crate::driver::types::{
    CloneOverrides, FolderRef, GroupRef, HealthStatus, InstanceRef, NetworkDefinition,
    NetworkRef, PowerState, Role, SourceRef,
};

use super::api_client::{DockerApiClient, check_status, encode_query};

/// Label marking objects created by this driver
pub const MANAGED_LABEL: &str = "adles.managed";

/// Label holding the virtual folder path of a container
pub const FOLDER_LABEL: &str = "adles.folder";

/// Label holding the instance name of a container
pub const INSTANCE_LABEL: &str = "adles.instance";

/// Repository master snapshots are committed to
const MASTER_REPOSITORY: &str = "adles-master";

#[derive(Debug, Default)]
struct DockerState {
    folders: BTreeSet<FolderRef>,

    /// Granted roles per folder, as `group=role`
    permissions: BTreeMap<FolderRef, BTreeSet<String>>,
}

/// Docker Engine platform driver
#[derive(Debug, Clone)]
pub struct DockerDriver {
    client: DockerApiClient,
    state: Arc<RwLock<DockerState>>,
    released: Arc<AtomicBool>,
}

impl DockerDriver {
    /// Create a driver for the configured engine endpoint
    ///
    /// # Arguments
    /// * `config` - Docker section of the infrastructure file
    ///
    /// # Returns
    /// The driver, or `InvalidConfig` for a non-unix endpoint
    pub fn new(config: &DockerConfig) -> DriverResult<Self> {
        let socket = config
            .socket_path()
            .map_err(|e| DriverError::InvalidConfig {
                driver: "docker",
                details: e.to_string(),
            })?;
        let client = DockerApiClient::new(
            PathBuf::from(socket),
            Duration::from_secs(config.timeout_secs.max(1)),
        );
        Ok(Self {
            client,
            state: Arc::new(RwLock::new(DockerState::default())),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client(&self) -> &DockerApiClient {
        &self.client
    }

    fn check_released(released: &AtomicBool) -> DriverResult<()> {
        if released.load(Ordering::SeqCst) {
            Err(DriverError::Released)
        } else {
            Ok(())
        }
    }

    /// Spawn a call with access to the client and session state
    fn call<T, F, Fut>(&self, label: &str, op: F) -> AsyncTask<DriverResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(DockerApiClient, Arc<RwLock<DockerState>>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = DriverResult<T>> + Send + 'static,
    {
        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let released = Arc::clone(&self.released);
        AsyncTaskBuilder::new(async move {
            Self::check_released(&released)?;
            op(client, state).await
        })
        .with_label(format!("docker {label}"))
        .spawn()
    }
}

/// Container name for an instance
///
/// Docker names allow `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, every other character
/// becomes `-`.
pub fn container_name(instance: &InstanceRef) -> String {
    let mut parts: Vec<&str> = instance
        .folder
        .components()
        .iter()
        .map(String::as_str)
        .collect();
    parts.push(&instance.name);
    let raw = parts.join("_");
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        name.insert(0, 'x');
    }
    name
}

/// Image tag a master instance is committed to
pub fn master_image(master: &InstanceRef) -> String {
    format!("{MASTER_REPOSITORY}:{}", container_name(master).to_ascii_lowercase())
}

/// Request body for `POST /networks/create`
pub fn network_body(definition: &NetworkDefinition) -> Value {
    let mut body = json!({
        "Name": definition.name,
        "CheckDuplicate": true,
        "Labels": {
            MANAGED_LABEL: "true",
            "adles.vlan": definition.vlan.to_string(),
        },
    });
    match &definition.vswitch {
        Some(parent) => {
            body["Driver"] = json!("macvlan");
            body["Options"] = json!({ "parent": format!("{parent}.{}", definition.vlan) });
        }
        None => {
            body["Driver"] = json!("bridge");
        }
    }
    if let Some(subnet) = &definition.subnet {
        body["IPAM"] = json!({ "Config": [{ "Subnet": subnet.to_string() }] });
    }
    body
}

/// Request body for `POST /containers/create`
pub fn container_body(
    image: &str,
    instance: &InstanceRef,
    overrides: &CloneOverrides,
    permissions: &BTreeSet<String>,
) -> Value {
    let mut labels = serde_json::Map::new();
    labels.insert(MANAGED_LABEL.into(), json!("true"));
    labels.insert(FOLDER_LABEL.into(), json!(instance.folder.to_string()));
    labels.insert(INSTANCE_LABEL.into(), json!(instance.name));
    if let Some(note) = &overrides.note {
        labels.insert("adles.note".into(), json!(note));
    }
    if !permissions.is_empty() {
        let joined: Vec<&str> = permissions.iter().map(String::as_str).collect();
        labels.insert("adles.permissions".into(), json!(joined.join(",")));
    }
    for (key, value) in &overrides.labels {
        labels.insert(format!("adles.{key}"), json!(value));
    }

    let mut host_config = serde_json::Map::new();
    if let Some(cpus) = overrides.cpus {
        host_config.insert("NanoCpus".into(), json!(u64::from(cpus) * 1_000_000_000));
    }
    if let Some(memory) = overrides.memory_mib {
        host_config.insert("Memory".into(), json!(memory * 1024 * 1024));
    }

    let mut body = json!({
        "Image": image,
        "Hostname": instance.name.chars().filter(char::is_ascii_alphanumeric).collect::<String>(),
        "Labels": Value::Object(labels),
    });
    if let Some(first) = overrides.nics.first() {
        host_config.insert("NetworkMode".into(), json!(first.network.name));
        body["NetworkingConfig"] = json!({
            "EndpointsConfig": { first.network.name.clone(): {} }
        });
    }
    body["HostConfig"] = Value::Object(host_config);
    body
}

async fn pull_image(client: &DockerApiClient, image: &str) -> DriverResult<()> {
    let (repository, tag) = match image.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository, tag),
        _ => (image, "latest"),
    };
    let path = format!(
        "images/create?fromImage={}&tag={}",
        encode_query(repository),
        encode_query(tag)
    );
    client
        .expect_success(Method::POST, &path, None, &format!("image {image}"))
        .await?;
    Ok(())
}

/// Image to create a clone from, committing masters to an image first
async fn resolve_image(client: &DockerApiClient, source: &SourceRef) -> DriverResult<String> {
    match source {
        SourceRef::Image(image) => {
            pull_image(client, image).await?;
            Ok(image.clone())
        }
        SourceRef::Template(template) => {
            log::debug!("docker: using template {template} as an image reference");
            pull_image(client, template).await?;
            Ok(template.clone())
        }
        SourceRef::Master(master) => {
            let image = master_image(master);
            let (repository, tag) = image.split_once(':').unwrap_or((&image, "latest"));
            let path = format!(
                "commit?container={}&repo={}&tag={}",
                encode_query(&container_name(master)),
                encode_query(repository),
                encode_query(tag)
            );
            client
                .expect_success(Method::POST, &path, None, &format!("master {master}"))
                .await?;
            Ok(image)
        }
        SourceRef::Dockerfile(path) | SourceRef::Compose(path) => Err(DriverError::rejected(
            source.to_string(),
            format!(
                "building from {} is not supported by the docker driver, publish an image instead",
                path.display()
            ),
        )),
    }
}

/// Managed containers whose folder label lies within `folder`
async fn containers_within(
    client: &DockerApiClient,
    folder: &FolderRef,
) -> DriverResult<Vec<String>> {
    let filters = json!({ "label": [format!("{MANAGED_LABEL}=true")] }).to_string();
    let path = format!("containers/json?all=true&filters={}", encode_query(&filters));
    let containers = client
        .expect_success(Method::GET, &path, None, "containers")
        .await?
        .json()?;

    let mut ids = Vec::new();
    for container in containers.as_array().into_iter().flatten() {
        let label = container
            .get("Labels")
            .and_then(|labels| labels.get(FOLDER_LABEL))
            .and_then(Value::as_str);
        let id = container.get("Id").and_then(Value::as_str);
        if let (Some(label), Some(id)) = (label, id)
            && FolderRef::parse(label).is_within(folder)
        {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

impl PlatformDriver for DockerDriver {
    fn create_folder(
        &self,
        parent: Option<FolderRef>,
        name: String,
    ) -> AsyncTask<DriverResult<FolderRef>> {
        let folder = match &parent {
            Some(parent) => parent.child(name),
            None => FolderRef::new([name]),
        };
        self.call("create_folder", move |_client, state| async move {
            let mut state = state
                .write()
                .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
            if let Some(parent) = &parent
                && !state.folders.contains(parent)
            {
                return Err(DriverError::not_found(format!("folder {parent}")));
            }
            state.folders.insert(folder.clone());
            Ok(folder)
        })
    }

    fn delete_folder(&self, folder: FolderRef, recursive: bool) -> AsyncTask<DriverResult<()>> {
        self.call("delete_folder", move |client, state| async move {
            let ids = containers_within(&client, &folder).await?;
            let known = state
                .read()
                .map_err(|e| DriverError::internal(format!("Failed to acquire read lock: {e}")))?
                .folders
                .contains(&folder);
            if ids.is_empty() && !known {
                return Err(DriverError::not_found(format!("folder {folder}")));
            }
            if !ids.is_empty() && !recursive {
                return Err(DriverError::rejected(
                    format!("folder {folder}"),
                    "folder is not empty",
                ));
            }
            for id in &ids {
                let response = client
                    .request(Method::DELETE, &format!("containers/{id}?force=true&v=true"), None)
                    .await?;
                // Already removed by a concurrent cleanup
                if response.status != http::StatusCode::NOT_FOUND {
                    check_status(response, &format!("container {id}"))?;
                }
            }
            let mut state = state
                .write()
                .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
            state.folders.retain(|f| !f.is_within(&folder));
            state.permissions.retain(|f, _| !f.is_within(&folder));
            log::debug!("docker: removed folder {folder} with {} containers", ids.len());
            Ok(())
        })
    }

    fn clone_service(
        &self,
        source: SourceRef,
        dest: FolderRef,
        name: String,
        overrides: CloneOverrides,
    ) -> AsyncTask<DriverResult<InstanceRef>> {
        let instance = InstanceRef::at(dest, name);
        self.call("clone_service", move |client, state| async move {
            let permissions = {
                let state = state.read().map_err(|e| {
                    DriverError::internal(format!("Failed to acquire read lock: {e}"))
                })?;
                if !state.folders.contains(&instance.folder) {
                    return Err(DriverError::not_found(format!("folder {}", instance.folder)));
                }
                let mut granted = BTreeSet::new();
                for (folder, roles) in &state.permissions {
                    if instance.folder.is_within(folder) {
                        granted.extend(roles.iter().cloned());
                    }
                }
                granted
            };

            let image = resolve_image(&client, &source).await?;
            let container = container_name(&instance);
            let body = container_body(&image, &instance, &overrides, &permissions);
            let created = client
                .expect_success(
                    Method::POST,
                    &format!("containers/create?name={}", encode_query(&container)),
                    Some(&body),
                    &format!("instance {instance}"),
                )
                .await?
                .json()?;
            let id = created
                .get("Id")
                .and_then(Value::as_str)
                .unwrap_or(&container)
                .to_string();

            for nic in overrides.nics.iter().skip(1) {
                let body = json!({ "Container": id });
                client
                    .expect_success(
                        Method::POST,
                        &format!("networks/{}/connect", encode_query(&nic.network.name)),
                        Some(&body),
                        &format!("network {}", nic.network),
                    )
                    .await?;
            }
            log::debug!("docker: created {container} from {source}");
            Ok(instance.with_id(id))
        })
    }

    fn create_network(&self, definition: NetworkDefinition) -> AsyncTask<DriverResult<NetworkRef>> {
        self.call("create_network", move |client, _state| async move {
            let network = definition.network_ref();
            let target = format!("network {network}");
            let existing = client
                .request(
                    Method::GET,
                    &format!("networks/{}", encode_query(&definition.name)),
                    None,
                )
                .await?;
            if existing.status.is_success() {
                log::debug!("docker: {target} already exists");
                return Ok(network);
            }
            client
                .expect_success(
                    Method::POST,
                    "networks/create",
                    Some(&network_body(&definition)),
                    &target,
                )
                .await?;
            Ok(network)
        })
    }

    fn delete_network(&self, network: NetworkRef) -> AsyncTask<DriverResult<()>> {
        self.call("delete_network", move |client, _state| async move {
            client
                .expect_success(
                    Method::DELETE,
                    &format!("networks/{}", encode_query(&network.name)),
                    None,
                    &format!("network {network}"),
                )
                .await?;
            Ok(())
        })
    }

    fn apply_permission(
        &self,
        target: FolderRef,
        group: GroupRef,
        role: Role,
    ) -> AsyncTask<DriverResult<()>> {
        self.call("apply_permission", move |_client, state| async move {
            let mut state = state
                .write()
                .map_err(|e| DriverError::internal(format!("Failed to acquire write lock: {e}")))?;
            if !state.folders.contains(&target) {
                return Err(DriverError::not_found(format!("folder {target}")));
            }
            state
                .permissions
                .entry(target)
                .or_default()
                .insert(format!("{}={role}", group.name));
            Ok(())
        })
    }

    fn power_state(
        &self,
        instance: InstanceRef,
        desired: PowerState,
    ) -> AsyncTask<DriverResult<()>> {
        self.call("power_state", move |client, _state| async move {
            let action = match desired {
                PowerState::On => "start",
                PowerState::Off => "stop",
            };
            let container = instance
                .id
                .clone()
                .unwrap_or_else(|| container_name(&instance));
            client
                .expect_success(
                    Method::POST,
                    &format!("containers/{}/{action}", encode_query(&container)),
                    None,
                    &format!("instance {instance}"),
                )
                .await?;
            Ok(())
        })
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let client = self.client.clone();
        let released = Arc::clone(&self.released);
        AsyncTaskBuilder::new(async move {
            if released.load(Ordering::SeqCst) {
                return HealthStatus::unhealthy("session released");
            }
            let socket = client.socket_path().display().to_string();
            match client.request(Method::GET, "version", None).await {
                Ok(response) if response.status.is_success() => {
                    let version = response
                        .json()
                        .ok()
                        .and_then(|v| v.get("Version").and_then(Value::as_str).map(str::to_string))
                        .unwrap_or_else(|| "unknown".to_string());
                    HealthStatus::healthy("docker engine reachable")
                        .with_metric("engine_version", version)
                        .with_metric("socket", socket)
                }
                Ok(response) => HealthStatus::unhealthy(format!(
                    "docker engine at {socket} answered {}",
                    response.status
                )),
                Err(e) => HealthStatus::unhealthy(format!("docker engine at {socket}: {e}")),
            }
        })
        .with_label("docker health_check")
        .spawn()
    }

    fn release(&self) -> AsyncTask<DriverResult<()>> {
        let released = Arc::clone(&self.released);
        let stats = (
            self.client.stats().api_calls(),
            self.client.stats().failed_calls(),
        );
        AsyncTaskBuilder::new(async move {
            if !released.swap(true, Ordering::SeqCst) {
                log::debug!(
                    "docker session released after {} API calls ({} failed)",
                    stats.0,
                    stats.1
                );
            }
            Ok(())
        })
        .spawn()
    }

    fn driver_type(&self) -> &'static str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::types::NicAttachment;
    use crate::spec::{NetworkKind, Subnet};
    use pretty_assertions::assert_eq;

    #[test]
    fn container_names_are_sanitized() {
        let instance = InstanceRef::at(FolderRef::new(["Lab", "team-1"]), "(MASTER) kali");
        assert_eq!(container_name(&instance), "Lab_team-1_-MASTER--kali");
        assert_eq!(master_image(&instance), "adles-master:lab_team-1_-master--kali");

        let odd = InstanceRef::at(FolderRef::new(["(MASTER) Lab"]), "web");
        assert!(container_name(&odd).starts_with('x'));
    }

    #[test]
    fn macvlan_network_uses_vlan_subinterface() {
        let definition = NetworkDefinition {
            name: "Team-LAN-1".into(),
            kind: NetworkKind::Generic,
            subnet: Some("10.0.1.0/24".parse::<Subnet>().expect("subnet")),
            vlan: 2001,
            vswitch: Some("eth0".into()),
        };
        let body = network_body(&definition);
        assert_eq!(body["Driver"], "macvlan");
        assert_eq!(body["Options"]["parent"], "eth0.2001");
        assert_eq!(body["IPAM"]["Config"][0]["Subnet"], "10.0.1.0/24");

        let bridge = network_body(&NetworkDefinition {
            vswitch: None,
            subnet: None,
            ..definition
        });
        assert_eq!(bridge["Driver"], "bridge");
        assert!(bridge.get("IPAM").is_none());
    }

    #[test]
    fn container_body_carries_resources_and_labels() {
        let instance = InstanceRef::at(FolderRef::new(["Lab"]), "web");
        let overrides = CloneOverrides {
            cpus: Some(2),
            memory_mib: Some(512),
            nics: vec![
                NicAttachment {
                    interface: "eth0".into(),
                    network: NetworkRef::new("LAN"),
                },
                NicAttachment {
                    interface: "eth1".into(),
                    network: NetworkRef::new("DMZ"),
                },
            ],
            note: Some("scored".into()),
            labels: Default::default(),
        };
        let permissions = BTreeSet::from(["Staff=master".to_string()]);
        let body = container_body("nginx:1.27", &instance, &overrides, &permissions);
        assert_eq!(body["Image"], "nginx:1.27");
        assert_eq!(body["HostConfig"]["NanoCpus"], 2_000_000_000u64);
        assert_eq!(body["HostConfig"]["Memory"], 512u64 * 1024 * 1024);
        assert_eq!(body["HostConfig"]["NetworkMode"], "LAN");
        assert_eq!(body["Labels"][FOLDER_LABEL], "/Lab");
        assert_eq!(body["Labels"]["adles.permissions"], "Staff=master");
        assert!(body["NetworkingConfig"]["EndpointsConfig"].get("DMZ").is_none());
    }

    #[test]
    fn non_unix_endpoint_is_invalid() {
        let config = DockerConfig {
            url: "tcp://127.0.0.1:2375".into(),
            ..DockerConfig::default()
        };
        assert!(matches!(
            DockerDriver::new(&config),
            Err(DriverError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_engine_is_unhealthy() {
        let config = DockerConfig {
            url: "unix:///nonexistent/docker.sock".into(),
            timeout_secs: 1,
        };
        let driver = DockerDriver::new(&config).expect("driver");
        let health = driver.health_check().await.expect("task joins");
        assert!(!health.is_healthy);
        assert!(health.message.contains("/nonexistent/docker.sock"));
    }

    #[tokio::test]
    async fn folders_are_virtual() {
        let driver = DockerDriver::new(&DockerConfig::default()).expect("driver");
        let lab = driver
            .create_folder(None, "Lab".into())
            .await
            .expect("task joins")
            .expect("virtual folder");
        let err = driver
            .create_folder(Some(lab.child("missing")), "x".into())
            .await
            .expect("task joins")
            .expect_err("parent missing");
        assert!(err.is_not_found());
    }
}
