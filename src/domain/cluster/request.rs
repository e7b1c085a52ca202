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

//! Cluster request: every node to create, with its address, limits and config.

use crate::domain::bundle::{ConfigBundle, MachineConfig};
use crate::domain::network::{self, NetworkAllocation};
use crate::infrastructure::constants::{FIRST_NODE_OFFSET, TYPE_CONTROL_PLANE, TYPE_WORKER};
use crate::shared::error::{ProvisionError, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl NodeRole {
    /// Value of the `talos.type` container label.
    pub fn label_value(&self) -> &'static str {
        match self {
            NodeRole::ControlPlane => TYPE_CONTROL_PLANE,
            NodeRole::Worker => TYPE_WORKER,
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            TYPE_CONTROL_PLANE => Some(NodeRole::ControlPlane),
            TYPE_WORKER => Some(NodeRole::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::ControlPlane => write!(f, "control-plane"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeResources {
    pub nano_cpus: i64,
    pub memory_bytes: i64,
}

impl NodeResources {
    pub fn parse(cpus: &str, memory: &str) -> Result<Self> {
        let nano_cpus = crate::domain::config::parse_cpus(cpus)
            .map_err(|e| ProvisionError::config_error(e.to_string()))?;
        let memory_bytes = crate::domain::config::parse_memory_size(memory)
            .map_err(|e| ProvisionError::config_error(e.to_string()))?;
        Ok(Self {
            nano_cpus,
            memory_bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRequest {
    pub name: String,
    pub role: NodeRole,
    pub address: Ipv4Addr,
    pub resources: NodeResources,
    pub config: MachineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    pub name: String,
    pub cidr: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub mtu: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRequest {
    pub name: String,
    pub image: String,
    pub network: NetworkRequest,
    pub nodes: Vec<NodeRequest>,
}

impl ClusterRequest {
    pub fn control_planes(&self) -> impl Iterator<Item = &NodeRequest> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::ControlPlane)
    }

    pub fn workers(&self) -> impl Iterator<Item = &NodeRequest> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Worker)
    }
}

/// Settings shared by every node of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefaults {
    pub image: String,
    pub resources: NodeResources,
    pub mtu: u32,
}

pub fn control_plane_name(cluster: &str, index: usize) -> String {
    format!("{}-control-plane-{}", cluster, index + 1)
}

pub fn worker_name(cluster: &str, index: usize) -> String {
    format!("{}-worker-{}", cluster, index + 1)
}

/// Control planes take offsets `2..2+C`, workers follow at `2+C..2+C+W`.
pub fn build_request(
    cluster_name: &str,
    cidr: &str,
    control_planes: usize,
    workers: usize,
    bundle: &ConfigBundle,
    defaults: &NodeDefaults,
) -> Result<ClusterRequest> {
    let allocation = network::allocate(cidr)?;

    let mut nodes = Vec::with_capacity(control_planes + workers);
    for i in 0..control_planes {
        nodes.push(node_request(
            &allocation,
            control_plane_name(cluster_name, i),
            NodeRole::ControlPlane,
            i,
            bundle,
            defaults,
        )?);
    }
    for i in 0..workers {
        nodes.push(node_request(
            &allocation,
            worker_name(cluster_name, i),
            NodeRole::Worker,
            control_planes + i,
            bundle,
            defaults,
        )?);
    }

    Ok(ClusterRequest {
        name: cluster_name.to_string(),
        image: defaults.image.clone(),
        network: NetworkRequest {
            name: cluster_name.to_string(),
            cidr: allocation.net(),
            gateway: allocation.gateway(),
            mtu: defaults.mtu,
        },
        nodes,
    })
}

fn node_request(
    allocation: &NetworkAllocation,
    name: String,
    role: NodeRole,
    index: usize,
    bundle: &ConfigBundle,
    defaults: &NodeDefaults,
) -> Result<NodeRequest> {
    let offset = i64::try_from(index)
        .ok()
        .and_then(|i| i.checked_add(FIRST_NODE_OFFSET))
        .ok_or_else(|| ProvisionError::OffsetOutOfRange {
            offset: i64::MAX,
            cidr: allocation.net().to_string(),
        })?;

    Ok(NodeRequest {
        name,
        role,
        address: allocation.addr(offset)?,
        resources: defaults.resources,
        config: bundle.for_role(role).clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::TalosConfig;
    use std::collections::HashSet;

    fn bundle() -> ConfigBundle {
        let cp = MachineConfig::new(serde_yaml::from_str("machine:\n  type: controlplane\n").unwrap());
        let worker = MachineConfig::new(serde_yaml::from_str("machine:\n  type: worker\n").unwrap());
        ConfigBundle::new(cp, worker, TalosConfig::default(), "https://10.5.0.2:6443")
    }

    fn defaults() -> NodeDefaults {
        NodeDefaults {
            image: "ghcr.io/siderolabs/talos:v1.11.2".to_string(),
            resources: NodeResources::parse("2", "2GiB").unwrap(),
            mtu: 1500,
        }
    }

    #[test]
    fn test_node_names_and_addresses() {
        let request = build_request("demo", "10.5.0.0/24", 3, 2, &bundle(), &defaults()).unwrap();

        assert_eq!(request.nodes.len(), 5);
        let names: Vec<_> = request.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "demo-control-plane-1",
                "demo-control-plane-2",
                "demo-control-plane-3",
                "demo-worker-1",
                "demo-worker-2",
            ]
        );
        assert_eq!(request.nodes[0].address, Ipv4Addr::new(10, 5, 0, 2));
        assert_eq!(request.nodes[3].address, Ipv4Addr::new(10, 5, 0, 5));

        let unique: HashSet<_> = request.nodes.iter().map(|n| n.address).collect();
        assert_eq!(unique.len(), 5);
        assert_eq!(request.network.gateway, Ipv4Addr::new(10, 5, 0, 1));
        assert_eq!(request.control_planes().count(), 3);
        assert_eq!(request.workers().count(), 2);
    }

    #[test]
    fn test_nodes_carry_role_config() {
        let request = build_request("demo", "10.5.0.0/24", 1, 1, &bundle(), &defaults()).unwrap();
        let cp = &request.nodes[0];
        let worker = &request.nodes[1];
        assert_eq!(cp.role, NodeRole::ControlPlane);
        assert_eq!(
            cp.config.lookup(&["machine", "type"]).and_then(|v| v.as_str()),
            Some("controlplane")
        );
        assert_eq!(
            worker.config.lookup(&["machine", "type"]).and_then(|v| v.as_str()),
            Some("worker")
        );
        assert_eq!(worker.resources.memory_bytes, 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_ipv6_aborts_request() {
        let err = build_request("demo", "fd00::/64", 1, 0, &bundle(), &defaults()).unwrap_err();
        assert!(matches!(err, ProvisionError::Ipv6NotSupported(_)));
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(NodeRole::ControlPlane.label_value(), "controlplane");
        assert_eq!(NodeRole::from_label("worker"), Some(NodeRole::Worker));
        assert_eq!(NodeRole::from_label("etcd"), None);
        assert_eq!(NodeRole::ControlPlane.to_string(), "control-plane");
    }
}
