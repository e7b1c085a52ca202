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

//! Docker-backed cluster provisioner: networks, node containers and the state file.

use super::runtime::{cluster_labels, node_labels, ContainerRuntime, ContainerSpec, NetworkSpec};
use crate::domain::cluster::request::{ClusterRequest, NodeRequest, NodeRole};
use crate::infrastructure::constants::{
    ENV_PLATFORM, ENV_USERDATA, HOST_LOOPBACK, KUBERNETES_API_PORT, NODE_TMPFS_MOUNTS,
    NODE_VOLUMES, SECURITY_OPT_SECCOMP, STATE_FILE_NAME, TALOS_API_PORT,
};
use crate::shared::error::{ProvisionError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub role: NodeRole,
    pub address: Option<Ipv4Addr>,
    pub container_id: String,
}

/// What the provisioner knows about a created cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub name: String,
    pub network_name: String,
    #[serde(default)]
    pub cidr: Option<Ipv4Net>,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    /// Host-reachable Kubernetes API address, `127.0.0.1:<port>`.
    #[serde(default)]
    pub kubernetes_endpoint: Option<String>,
}

impl ClusterInfo {
    pub fn control_planes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::ControlPlane)
    }
}

/// Creates, rediscovers and tears down the containers backing a cluster.
#[async_trait]
pub trait ClusterProvisioner: Send + Sync {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterInfo>;

    /// Rebuild the info for an existing cluster.
    async fn reflect(&self, name: &str) -> Result<ClusterInfo>;

    async fn destroy(&self, info: &ClusterInfo) -> Result<()>;
}

pub struct DockerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    state_dir: PathBuf,
}

impl DockerProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            state_dir: state_dir.into(),
        }
    }

    pub fn cluster_state_dir(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    pub fn state_file(&self, name: &str) -> PathBuf {
        self.cluster_state_dir(name).join(STATE_FILE_NAME)
    }

    async fn write_state(&self, info: &ClusterInfo) -> Result<()> {
        let dir = self.cluster_state_dir(&info.name);
        tokio::fs::create_dir_all(&dir).await?;
        let content = serde_yaml::to_string(info)?;
        tokio::fs::write(dir.join(STATE_FILE_NAME), content).await?;
        debug!(cluster = %info.name, dir = %dir.display(), "wrote cluster state");
        Ok(())
    }

    async fn read_state(&self, name: &str) -> Result<Option<ClusterInfo>> {
        let path = self.state_file(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_yaml::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn kubernetes_endpoint(&self, container: &str) -> Result<String> {
        let details = self.runtime.inspect_container(container).await?;
        let port = details
            .host_port(KUBERNETES_API_PORT)
            .ok_or_else(|| ProvisionError::NoPortMapping {
                container: container.to_string(),
                port: KUBERNETES_API_PORT,
            })?;
        Ok(format!("{}:{}", HOST_LOOPBACK, port))
    }

    /// Rebuild the info from labeled containers when the state file is gone.
    async fn reflect_from_labels(&self, name: &str) -> Result<ClusterInfo> {
        let mut containers = self.runtime.list_containers(&cluster_labels(name)).await?;
        if containers.is_empty() {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes = Vec::with_capacity(containers.len());
        for container in &containers {
            let details = self.runtime.inspect_container(&container.id).await?;
            nodes.push(NodeInfo {
                name: container.name.clone(),
                role: container.role().unwrap_or(NodeRole::Worker),
                address: details.ip_address.as_deref().and_then(|ip| ip.parse().ok()),
                container_id: container.id.clone(),
            });
        }

        let mut info = ClusterInfo {
            name: name.to_string(),
            network_name: name.to_string(),
            cidr: None,
            gateway: None,
            nodes,
            kubernetes_endpoint: None,
        };
        let first = info.control_planes().next().map(|n| n.container_id.clone());
        if let Some(first) = first {
            info.kubernetes_endpoint = self.kubernetes_endpoint(&first).await.ok();
        }
        Ok(info)
    }
}

/// Container spec for one node: privileged, read-only rootfs, config passed as USERDATA.
pub fn node_container_spec(request: &ClusterRequest, node: &NodeRequest) -> Result<ContainerSpec> {
    let userdata = STANDARD.encode(node.config.to_yaml()?);
    let published_ports = match node.role {
        NodeRole::ControlPlane => vec![TALOS_API_PORT, KUBERNETES_API_PORT],
        NodeRole::Worker => Vec::new(),
    };

    Ok(ContainerSpec {
        name: node.name.clone(),
        hostname: node.name.clone(),
        image: request.image.clone(),
        env: vec![
            ENV_PLATFORM.to_string(),
            format!("{}={}", ENV_USERDATA, userdata),
        ],
        labels: node_labels(&request.name, node.role),
        network: request.network.name.clone(),
        ipv4_address: Some(node.address),
        published_ports,
        nano_cpus: node.resources.nano_cpus,
        memory_bytes: node.resources.memory_bytes,
        privileged: true,
        read_only_rootfs: true,
        security_opt: vec![SECURITY_OPT_SECCOMP.to_string()],
        tmpfs: NODE_TMPFS_MOUNTS.iter().map(|s| s.to_string()).collect(),
        volumes: NODE_VOLUMES.iter().map(|s| s.to_string()).collect(),
    })
}

#[async_trait]
impl ClusterProvisioner for DockerProvisioner {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterInfo> {
        self.runtime.ensure_image(&request.image).await?;

        let network = NetworkSpec {
            name: request.network.name.clone(),
            cidr: request.network.cidr,
            gateway: request.network.gateway,
            mtu: request.network.mtu,
            labels: cluster_labels(&request.name),
        };
        self.runtime.create_network(&network).await?;
        info!(cluster = %request.name, cidr = %network.cidr, "created cluster network");

        let mut nodes = Vec::with_capacity(request.nodes.len());
        for node in &request.nodes {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled);
            }
            let spec = node_container_spec(request, node)?;
            let id = self.runtime.create_container(&spec).await?;
            self.runtime
                .start_container(&id)
                .await
                .map_err(|e| ProvisionError::container(&node.name, e))?;
            info!(cluster = %request.name, node = %node.name, address = %node.address, "started node");

            nodes.push(NodeInfo {
                name: node.name.clone(),
                role: node.role,
                address: Some(node.address),
                container_id: id,
            });
        }

        let mut info = ClusterInfo {
            name: request.name.clone(),
            network_name: request.network.name.clone(),
            cidr: Some(request.network.cidr),
            gateway: Some(request.network.gateway),
            nodes,
            kubernetes_endpoint: None,
        };

        let first = info.control_planes().next().map(|n| n.container_id.clone());
        if let Some(first) = first {
            info.kubernetes_endpoint = Some(self.kubernetes_endpoint(&first).await?);
        }

        self.write_state(&info).await?;
        Ok(info)
    }

    async fn reflect(&self, name: &str) -> Result<ClusterInfo> {
        if let Some(info) = self.read_state(name).await? {
            return Ok(info);
        }
        warn!(
            cluster = name,
            path = %self.state_file(name).display(),
            "state file missing, rebuilding cluster info from container labels"
        );
        self.reflect_from_labels(name).await
    }

    async fn destroy(&self, info: &ClusterInfo) -> Result<()> {
        let labeled = self
            .runtime
            .list_containers(&cluster_labels(&info.name))
            .await?;
        let ids: BTreeSet<String> = labeled
            .into_iter()
            .map(|c| c.id)
            .chain(info.nodes.iter().map(|n| n.container_id.clone()))
            .collect();

        for id in &ids {
            self.runtime
                .remove_container(id)
                .await
                .map_err(|e| ProvisionError::container(id, e))?;
            debug!(cluster = %info.name, container = %id, "removed container");
        }

        let mut networks: BTreeSet<String> = self
            .runtime
            .list_networks(&cluster_labels(&info.name))
            .await?
            .into_iter()
            .collect();
        networks.insert(info.network_name.clone());
        for network in &networks {
            self.runtime.remove_network(network).await?;
        }

        remove_dir_if_exists(&self.cluster_state_dir(&info.name)).await?;
        info!(cluster = %info.name, containers = ids.len(), "destroyed cluster");
        Ok(())
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::{ConfigBundle, MachineConfig, TalosConfig};
    use crate::domain::cluster::request::{build_request, NodeDefaults, NodeResources};
    use crate::infrastructure::constants::{LABEL_CLUSTER_NAME, LABEL_TYPE};

    fn request() -> ClusterRequest {
        let cp = MachineConfig::new(serde_yaml::from_str("machine:\n  type: controlplane\n").unwrap());
        let worker = MachineConfig::new(serde_yaml::from_str("machine:\n  type: worker\n").unwrap());
        let bundle = ConfigBundle::new(cp, worker, TalosConfig::default(), "https://10.5.0.2:6443");
        let defaults = NodeDefaults {
            image: "ghcr.io/siderolabs/talos:v1.11.2".to_string(),
            resources: NodeResources::parse("2", "2GiB").unwrap(),
            mtu: 1500,
        };
        build_request("demo", "10.5.0.0/24", 1, 1, &bundle, &defaults).unwrap()
    }

    #[test]
    fn test_control_plane_spec() {
        let request = request();
        let spec = node_container_spec(&request, &request.nodes[0]).unwrap();

        assert_eq!(spec.name, "demo-control-plane-1");
        assert_eq!(spec.hostname, spec.name);
        assert_eq!(spec.published_ports, vec![50000, 6443]);
        assert_eq!(spec.ipv4_address, Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert_eq!(spec.labels.get(LABEL_CLUSTER_NAME).map(String::as_str), Some("demo"));
        assert_eq!(spec.labels.get(LABEL_TYPE).map(String::as_str), Some("controlplane"));
        assert!(spec.privileged);
        assert!(spec.read_only_rootfs);
        assert_eq!(spec.nano_cpus, 2_000_000_000);
        assert!(spec.env.contains(&"PLATFORM=container".to_string()));

        let userdata = spec
            .env
            .iter()
            .find_map(|e| e.strip_prefix("USERDATA="))
            .unwrap();
        let decoded = String::from_utf8(STANDARD.decode(userdata).unwrap()).unwrap();
        assert!(decoded.contains("type: controlplane"));
    }

    #[test]
    fn test_worker_publishes_nothing() {
        let request = request();
        let spec = node_container_spec(&request, &request.nodes[1]).unwrap();
        assert!(spec.published_ports.is_empty());
        assert_eq!(spec.labels.get(LABEL_TYPE).map(String::as_str), Some("worker"));
    }

    #[test]
    fn test_state_round_trips_through_yaml() {
        let info = ClusterInfo {
            name: "demo".to_string(),
            network_name: "demo".to_string(),
            cidr: Some("10.5.0.0/24".parse().unwrap()),
            gateway: Some(Ipv4Addr::new(10, 5, 0, 1)),
            nodes: vec![NodeInfo {
                name: "demo-control-plane-1".to_string(),
                role: NodeRole::ControlPlane,
                address: Some(Ipv4Addr::new(10, 5, 0, 2)),
                container_id: "abc".to_string(),
            }],
            kubernetes_endpoint: Some("127.0.0.1:32768".to_string()),
        };
        let yaml = serde_yaml::to_string(&info).unwrap();
        assert!(yaml.contains("role: control-plane"));
        let parsed: ClusterInfo = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, info);
    }
}
