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

use crate::domain::bundle::BundleBuilder;
use crate::domain::cluster::credentials::{prune_kubeconfig, write_kubeconfig, write_talosconfig};
use crate::domain::cluster::readiness::{ReadinessSettings, Sequencer, Stage};
use crate::domain::cluster::request::{build_request, NodeDefaults, NodeResources, NodeRole};
use crate::domain::cluster::validator::ClusterValidator;
use crate::domain::config::ProvisionerConfig;
use crate::domain::patches::{Patch, PatchStore};
use crate::infrastructure::constants::LABEL_CLUSTER_NAME;
use crate::infrastructure::docker::{
    cluster_labels, owned_labels, ClusterInfo, ClusterProvisioner, ContainerRuntime,
    ContainerState, ContainerSummary, DockerProvisioner, DockerRuntime,
};
use crate::infrastructure::kubernetes::{KubeProbe, KubernetesProbe};
use crate::infrastructure::talos::{TalosCtl, TalosSdk};
use crate::shared::error::{ProvisionError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle entry point for Talos-in-Docker clusters.
///
/// Cluster membership is always recomputed from container labels; nothing
/// here caches which clusters exist.
pub struct TalosProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    provisioner: Box<dyn ClusterProvisioner>,
    sdk: Box<dyn TalosSdk>,
    probe: Box<dyn KubernetesProbe>,
    config: ProvisionerConfig,
    settings: ReadinessSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOperation {
    Start,
    Stop,
}

impl TalosProvisioner {
    /// Connect to the local Docker daemon and use `talosctl` from `PATH`.
    pub fn new(config: ProvisionerConfig) -> Result<Self> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
        let provisioner = DockerProvisioner::new(runtime.clone(), config.state_dir());
        Ok(Self::with_components(
            config,
            runtime,
            Box::new(provisioner),
            Box::new(TalosCtl::default()),
            Box::new(KubeProbe::new()),
        ))
    }

    pub fn with_components(
        config: ProvisionerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        provisioner: Box<dyn ClusterProvisioner>,
        sdk: Box<dyn TalosSdk>,
        probe: Box<dyn KubernetesProbe>,
    ) -> Self {
        let settings = ReadinessSettings::from_section(&config.readiness);
        Self {
            runtime,
            provisioner,
            sdk,
            probe,
            config,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: ReadinessSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub async fn create(&self, name: &str, cancel: &CancellationToken) -> Result<ClusterInfo> {
        self.runtime.ping().await?;
        ClusterValidator::validate_name(name)?;
        ClusterValidator::validate(&self.config)?;

        if self.exists(name).await? {
            return Err(ProvisionError::ClusterAlreadyExists(name.to_string()));
        }
        info!(cluster = name, stage = %Stage::Requested, "creating cluster");

        let patches = self.load_patches()?;
        let mut bundle = BundleBuilder::new(self.sdk.as_ref())
            .build(
                name,
                &self.config.cluster.kubernetes_version,
                &self.config.network.cidr,
                &patches,
            )
            .await?;
        println!("✓ Machine configuration generated ({} patches)", patches.len());

        let defaults = NodeDefaults {
            image: self.config.cluster.talos_image.clone(),
            resources: NodeResources::parse(&self.config.nodes.cpus, &self.config.nodes.memory)?,
            mtu: self.config.network.mtu,
        };
        let request = build_request(
            name,
            &self.config.network.cidr,
            self.config.cluster.control_planes,
            self.config.cluster.workers,
            &bundle,
            &defaults,
        )?;

        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let info = self.provisioner.create(&request, cancel).await?;
        println!(
            "✓ {} node containers started on network {}",
            info.nodes.len(),
            info.network_name
        );

        let kubeconfig_path = self.config.kubeconfig_path();
        let talosconfig_path = self.config.talosconfig_path();
        if kubeconfig_path.is_none() && talosconfig_path.is_none() {
            debug!(cluster = name, "no credential paths configured, skipping bootstrap");
            return Ok(info);
        }

        let sequencer = Sequencer::new(
            self.runtime.as_ref(),
            self.sdk.as_ref(),
            self.probe.as_ref(),
            &self.settings,
        );
        sequencer.remap(name, &mut bundle).await?;

        if let Some(path) = &talosconfig_path {
            write_talosconfig(path, bundle.talosconfig()).await?;
            println!("✓ Talosconfig written to {}", path.display());
        }

        let Some(path) = kubeconfig_path else {
            return Ok(info);
        };

        println!("\nWaiting for cluster to be ready...");
        let kubeconfig = sequencer.bootstrap_and_wait(&info, &bundle, cancel).await?;
        println!("✓ Cluster is ready!");

        write_kubeconfig(&path, &kubeconfig).await?;
        println!("✓ Kubeconfig written to {}", path.display());

        Ok(info)
    }

    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        if !self.exists(name).await? {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        let info = self.provisioner.reflect(name).await?;
        self.provisioner.destroy(&info).await?;
        println!("✓ Cluster '{}' containers removed", name);

        if let Some(path) = self.config.kubeconfig_path() {
            match prune_kubeconfig(&path, name).await {
                Ok(true) => println!("✓ Kubeconfig entries removed from {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!(
                    cluster = name,
                    path = %path.display(),
                    error = %e,
                    "failed to prune kubeconfig, remove the entries manually"
                ),
            }
        }

        Ok(())
    }

    pub async fn start(&self, name: &str, cancel: &CancellationToken) -> Result<usize> {
        self.apply_to_nodes(name, NodeOperation::Start, cancel).await
    }

    pub async fn stop(&self, name: &str, cancel: &CancellationToken) -> Result<usize> {
        self.apply_to_nodes(name, NodeOperation::Stop, cancel).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let containers = self.runtime.list_containers(&cluster_labels(name)).await?;
        Ok(!containers.is_empty())
    }

    /// Names of every cluster with at least one owned container.
    pub async fn list(&self) -> Result<Vec<String>> {
        let containers = self.runtime.list_containers(&owned_labels()).await?;
        let names: BTreeSet<String> = containers
            .iter()
            .filter_map(|c| c.label(LABEL_CLUSTER_NAME))
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Node containers of a cluster, sorted by name.
    pub async fn nodes(&self, name: &str) -> Result<Vec<ContainerSummary>> {
        let mut containers = self.runtime.list_containers(&cluster_labels(name)).await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    pub async fn get_cluster_status(&self, name: &str) -> Result<ClusterStatus> {
        let nodes = self.nodes(name).await?;
        if nodes.is_empty() {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }
        Ok(ClusterStatus::from_containers(name, nodes))
    }

    pub async fn list_clusters(&self) -> Result<Vec<ClusterStatus>> {
        let containers = self.runtime.list_containers(&owned_labels()).await?;
        let mut by_cluster: BTreeMap<String, Vec<ContainerSummary>> = BTreeMap::new();
        for container in containers {
            if let Some(cluster) = container.label(LABEL_CLUSTER_NAME).map(str::to_string) {
                by_cluster.entry(cluster).or_default().push(container);
            }
        }

        Ok(by_cluster
            .into_iter()
            .map(|(name, mut nodes)| {
                nodes.sort_by(|a, b| a.name.cmp(&b.name));
                ClusterStatus::from_containers(&name, nodes)
            })
            .collect())
    }

    fn load_patches(&self) -> Result<Vec<Patch>> {
        match self.config.patches_dir() {
            Some(dir) => {
                let patches = PatchStore::new(dir).load()?;
                info!(count = patches.len(), "loaded configuration patches");
                Ok(patches)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn apply_to_nodes(
        &self,
        name: &str,
        operation: NodeOperation,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let containers = self.nodes(name).await?;
        if containers.is_empty() {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }

        let mut changed = 0;
        for container in &containers {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled);
            }

            let result = match operation {
                NodeOperation::Start if container.state.is_running() => continue,
                NodeOperation::Stop if !container.state.is_running() => continue,
                NodeOperation::Start => self.runtime.start_container(&container.id).await,
                NodeOperation::Stop => self.runtime.stop_container(&container.id).await,
            };
            result.map_err(|e| ProvisionError::container(&container.name, e))?;

            debug!(cluster = name, container = %container.name, ?operation, "node updated");
            changed += 1;
        }

        info!(cluster = name, ?operation, changed, "cluster nodes updated");
        Ok(changed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub name: String,
    pub role: Option<NodeRole>,
    pub state: ContainerState,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStatus {
    pub name: String,
    pub nodes: Vec<NodeStatus>,
    /// Unix timestamp of the oldest node container.
    pub created: Option<i64>,
}

impl ClusterStatus {
    pub fn from_containers(name: &str, containers: Vec<ContainerSummary>) -> Self {
        let created = containers.iter().map(|c| c.created).min();
        let nodes = containers
            .into_iter()
            .map(|c| NodeStatus {
                role: c.role(),
                name: c.name,
                state: c.state,
                status: c.status,
            })
            .collect();
        Self {
            name: name.to_string(),
            nodes,
            created,
        }
    }

    /// `(running, total)` for nodes of `role`.
    pub fn count(&self, role: NodeRole) -> (usize, usize) {
        let nodes = self.nodes.iter().filter(|n| n.role == Some(role));
        let (running, total) = nodes.fold((0, 0), |(running, total), n| {
            (running + usize::from(n.state.is_running()), total + 1)
        });
        (running, total)
    }

    pub fn running(&self) -> usize {
        self.nodes.iter().filter(|n| n.state.is_running()).count()
    }

    pub fn failed(&self) -> usize {
        self.nodes.iter().filter(|n| n.state.is_failed()).count()
    }
}
