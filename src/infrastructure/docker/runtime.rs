// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::cluster::request::NodeRole;
use crate::infrastructure::constants::{
    HOST_LOOPBACK, LABEL_CLUSTER_NAME, LABEL_OWNED, LABEL_TYPE, STOP_TIMEOUT_SECS,
};
use crate::shared::error::{ProvisionError, Result};
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{
    EndpointIpamConfig, EndpointSettings, HostConfig, Ipam, IpamConfig, PortBinding,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures::TryStreamExt;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info};

pub type Labels = BTreeMap<String, String>;

const MTU_OPTION: &str = "com.docker.network.driver.mtu";
const BRIDGE_DRIVER: &str = "bridge";

/// Labels carried by every container and network this tool creates.
pub fn owned_labels() -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_OWNED.to_string(), "true".to_string());
    labels
}

pub fn cluster_labels(cluster: &str) -> Labels {
    let mut labels = owned_labels();
    labels.insert(LABEL_CLUSTER_NAME.to_string(), cluster.to_string());
    labels
}

pub fn node_labels(cluster: &str, role: NodeRole) -> Labels {
    let mut labels = cluster_labels(cluster);
    labels.insert(LABEL_TYPE.to_string(), role.label_value().to_string());
    labels
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown(String),
}

impl ContainerState {
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// The node is gone for good and will not come back without operator action.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub labels: Labels,
    pub state: ContainerState,
    /// Human readable status, e.g. "Up 3 minutes".
    pub status: String,
    /// Unix timestamp of container creation.
    pub created: i64,
}

impl ContainerSummary {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn role(&self) -> Option<NodeRole> {
        self.label(LABEL_TYPE).and_then(NodeRole::from_label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub ip_address: Option<String>,
    /// Published TCP ports keyed by container port.
    pub ports: BTreeMap<u16, Vec<HostBinding>>,
}

impl ContainerDetails {
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .get(&container_port)
            .and_then(|bindings| bindings.first())
            .map(|b| b.host_port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    pub cidr: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub mtu: u32,
    pub labels: Labels,
}

/// Everything needed to create one node container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub hostname: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: Labels,
    pub network: String,
    pub ipv4_address: Option<Ipv4Addr>,
    /// Container ports published on the host loopback with a random host port.
    pub published_ports: Vec<u16>,
    pub nano_cpus: i64,
    pub memory_bytes: i64,
    pub privileged: bool,
    pub read_only_rootfs: bool,
    pub security_opt: Vec<String>,
    pub tmpfs: Vec<String>,
    pub volumes: Vec<String>,
}

/// Container runtime operations, filtered by label equality.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn ensure_image(&self, image: &str) -> Result<()>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()>;

    /// Removing a network that does not exist succeeds.
    async fn remove_network(&self, name: &str) -> Result<()>;

    async fn list_networks(&self, labels: &Labels) -> Result<Vec<String>>;

    /// Returns the new container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Force-removes the container and its anonymous volumes. Missing containers succeed.
    async fn remove_container(&self, id: &str) -> Result<()>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;

    /// All containers (running or not) carrying every label in `labels`.
    async fn list_containers(&self, labels: &Labels) -> Result<Vec<ContainerSummary>>;
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ProvisionError::DockerNotAvailable(e.to_string()))?;
        Ok(Self { docker })
    }
}

fn label_filters(labels: &Labels) -> HashMap<String, Vec<String>> {
    let selectors = labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>();
    HashMap::from([("label".to_string(), selectors)])
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

fn parse_port_key(key: &str) -> Option<u16> {
    let (port, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    if proto != "tcp" {
        return None;
    }
    port.parse().ok()
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ProvisionError::DockerNotAvailable(e.to_string()))?;
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!(image, "image already present");
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            check_duplicate: true,
            driver: BRIDGE_DRIVER.to_string(),
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.cidr.to_string()),
                    gateway: Some(spec.gateway.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            options: HashMap::from([(MTU_OPTION.to_string(), spec.mtu.to_string())]),
            labels: spec.labels.clone().into_iter().collect(),
            ..Default::default()
        };
        self.docker.create_network(options).await?;
        debug!(network = %spec.name, cidr = %spec.cidr, "created network");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_networks(&self, labels: &Labels) -> Result<Vec<String>> {
        let options = ListNetworksOptions {
            filters: label_filters(labels),
        };
        let networks = self.docker.list_networks(Some(options)).await?;
        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let port_bindings = spec
            .published_ports
            .iter()
            .map(|port| {
                (
                    port_key(*port),
                    Some(vec![PortBinding {
                        host_ip: Some(HOST_LOOPBACK.to_string()),
                        host_port: None,
                    }]),
                )
            })
            .collect::<HashMap<_, _>>();
        let exposed_ports = spec
            .published_ports
            .iter()
            .map(|port| (port_key(*port), HashMap::new()))
            .collect::<HashMap<_, _>>();

        let endpoint = EndpointSettings {
            ipam_config: spec.ipv4_address.map(|ip| EndpointIpamConfig {
                ipv4_address: Some(ip.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = Config {
            hostname: Some(spec.hostname.clone()),
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            exposed_ports: Some(exposed_ports),
            volumes: Some(
                spec.volumes
                    .iter()
                    .map(|v| (v.clone(), HashMap::new()))
                    .collect(),
            ),
            host_config: Some(HostConfig {
                privileged: Some(spec.privileged),
                readonly_rootfs: Some(spec.read_only_rootfs),
                security_opt: Some(spec.security_opt.clone()),
                tmpfs: Some(
                    spec.tmpfs
                        .iter()
                        .map(|t| (t.clone(), String::new()))
                        .collect(),
                ),
                port_bindings: Some(port_bindings),
                nano_cpus: Some(spec.nano_cpus),
                memory: Some(spec.memory_bytes),
                network_mode: Some(spec.network.clone()),
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig {
                endpoints_config: HashMap::from([(spec.network.clone(), endpoint)]),
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ProvisionError::container(&spec.name, e))?;
        debug!(container = %spec.name, id = %response.id, "created container");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let state = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|status| ContainerState::parse(&status.to_string()))
            .unwrap_or_else(|| ContainerState::Unknown(String::new()));

        let network_settings = inspect.network_settings.unwrap_or_default();
        let ip_address = network_settings
            .networks
            .unwrap_or_default()
            .into_values()
            .find_map(|n| n.ip_address.filter(|ip| !ip.is_empty()));

        let mut ports = BTreeMap::new();
        for (key, bindings) in network_settings.ports.unwrap_or_default() {
            let Some(container_port) = parse_port_key(&key) else {
                continue;
            };
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|b| {
                    Some(HostBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port?.parse().ok()?,
                    })
                })
                .collect::<Vec<_>>();
            if !bindings.is_empty() {
                ports.insert(container_port, bindings);
            }
        }

        Ok(ContainerDetails {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            state,
            ip_address,
            ports,
        })
    }

    async fn list_containers(&self, labels: &Labels) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: label_filters(labels),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                labels: c.labels.unwrap_or_default().into_iter().collect(),
                state: ContainerState::parse(c.state.as_deref().unwrap_or_default()),
                status: c.status.unwrap_or_default(),
                created: c.created.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_labels() {
        let labels = node_labels("demo", NodeRole::ControlPlane);
        assert_eq!(labels.get(LABEL_OWNED).map(String::as_str), Some("true"));
        assert_eq!(
            labels.get(LABEL_CLUSTER_NAME).map(String::as_str),
            Some("demo")
        );
        assert_eq!(
            labels.get(LABEL_TYPE).map(String::as_str),
            Some("controlplane")
        );
    }

    #[test]
    fn test_label_filters() {
        let filters = label_filters(&cluster_labels("demo"));
        assert_eq!(
            filters.get("label").unwrap(),
            &vec![
                "talos.cluster.name=demo".to_string(),
                "talos.owned=true".to_string()
            ]
        );
    }

    #[test]
    fn test_container_state() {
        assert!(ContainerState::parse("running").is_running());
        assert!(ContainerState::parse("Exited").is_failed());
        assert!(ContainerState::parse("dead").is_failed());
        assert!(!ContainerState::parse("restarting").is_failed());
        assert_eq!(
            ContainerState::parse("weird"),
            ContainerState::Unknown("weird".to_string())
        );
    }

    #[test]
    fn test_parse_port_key() {
        assert_eq!(parse_port_key("50000/tcp"), Some(50000));
        assert_eq!(parse_port_key("6443"), Some(6443));
        assert_eq!(parse_port_key("53/udp"), None);
    }
}
