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

//! Bootstrap and readiness sequencing for a freshly provisioned cluster.

use super::credentials::rewrite_servers;
use crate::domain::bundle::{remap_endpoint, ConfigBundle, TalosConfig};
use crate::domain::cluster::request::NodeRole;
use crate::domain::config::ReadinessSection;
use crate::infrastructure::constants::{
    BOOTSTRAP_RETRY_DELAY_SECS, HOST_LOOPBACK, KUBERNETES_API_PORT, TALOS_API_PORT,
};
use crate::infrastructure::docker::{
    cluster_labels, node_labels, ClusterInfo, ContainerRuntime, NodeInfo,
};
use crate::infrastructure::kubernetes::{KubeCheck, KubernetesProbe};
use crate::infrastructure::talos::{TalosProbe, TalosSdk};
use crate::shared::error::{ProvisionError, Result};
use backon::{ConstantBuilder, Retryable};
use kube::config::Kubeconfig;
use std::fmt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TALOS_PROBES: [TalosProbe; 3] = [TalosProbe::Apid, TalosProbe::Etcd, TalosProbe::Kubelet];
const BASE_KUBE_CHECKS: [KubeCheck; 2] = [KubeCheck::ApiServer, KubeCheck::NodesRegistered];
const CNI_KUBE_CHECKS: [KubeCheck; 3] =
    [KubeCheck::NodesReady, KubeCheck::CoreDns, KubeCheck::KubeProxy];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub bootstrap_attempts: usize,
    pub bootstrap_delay: Duration,
}

impl ReadinessSettings {
    pub fn from_section(section: &ReadinessSection) -> Self {
        Self {
            timeout: section.timeout(),
            poll_interval: section.poll_interval(),
            bootstrap_attempts: section.bootstrap_retry_attempts,
            bootstrap_delay: Duration::from_secs(BOOTSTRAP_RETRY_DELAY_SECS),
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self::from_section(&ReadinessSection::default())
    }
}

/// Lifecycle stage of a cluster being brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Requested,
    Provisioned,
    Bootstrapped,
    WaitingReady,
    Ready,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Requested => "requested",
            Stage::Provisioned => "provisioned",
            Stage::Bootstrapped => "bootstrapped",
            Stage::WaitingReady => "waiting-ready",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// How a readiness wait ended.
#[derive(Debug)]
pub enum PollOutcome {
    Ready(Kubeconfig),
    Cancelled,
    TimedOut { last_failure: String },
    /// A condition that will not resolve on its own, e.g. an exited node.
    Failed(ProvisionError),
}

impl PollOutcome {
    pub fn into_result(self, cluster: &str, timeout: Duration) -> Result<Kubeconfig> {
        match self {
            PollOutcome::Ready(kubeconfig) => Ok(kubeconfig),
            PollOutcome::Cancelled => Err(ProvisionError::Cancelled),
            PollOutcome::TimedOut { last_failure } => Err(ProvisionError::ReadinessTimeout {
                cluster: cluster.to_string(),
                timeout,
                last_failure,
            }),
            PollOutcome::Failed(err) => Err(err),
        }
    }
}

/// What one readiness wait is aimed at.
#[derive(Debug, Clone)]
pub struct ReadinessTarget<'a> {
    pub cluster: &'a str,
    /// Management API address of the first control plane, as seen through the endpoint.
    pub node: String,
    pub talosconfig: &'a TalosConfig,
    /// Host-reachable Kubernetes API address, `127.0.0.1:<port>`.
    pub kubernetes_endpoint: &'a str,
    pub expected_nodes: usize,
    pub custom_cni: bool,
}

enum RoundFailure {
    NotReady(String),
    Fatal(ProvisionError),
}

pub struct Sequencer<'a> {
    runtime: &'a dyn ContainerRuntime,
    sdk: &'a dyn TalosSdk,
    probe: &'a dyn KubernetesProbe,
    settings: &'a ReadinessSettings,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        sdk: &'a dyn TalosSdk,
        probe: &'a dyn KubernetesProbe,
        settings: &'a ReadinessSettings,
    ) -> Self {
        Self {
            runtime,
            sdk,
            probe,
            settings,
        }
    }

    /// `127.0.0.1:<port>` the host reaches the first control plane's management API on.
    pub async fn resolve_endpoint(&self, cluster: &str) -> Result<String> {
        let mut control_planes = self
            .runtime
            .list_containers(&node_labels(cluster, NodeRole::ControlPlane))
            .await?;
        control_planes.sort_by(|a, b| a.name.cmp(&b.name));

        let first = control_planes
            .first()
            .ok_or_else(|| ProvisionError::NoControlPlane(cluster.to_string()))?;
        let details = self.runtime.inspect_container(&first.id).await?;
        let port = details
            .host_port(TALOS_API_PORT)
            .ok_or_else(|| ProvisionError::NoPortMapping {
                container: first.name.clone(),
                port: TALOS_API_PORT,
            })?;

        Ok(format!("{}:{}", HOST_LOOPBACK, port))
    }

    /// Resolve the mapped management endpoint and point the bundle's talosconfig at it.
    pub async fn remap(&self, cluster: &str, bundle: &mut ConfigBundle) -> Result<String> {
        let endpoint = self.resolve_endpoint(cluster).await?;
        remap_endpoint(bundle, &endpoint)?;
        info!(cluster, %endpoint, "remapped management endpoint");
        Ok(endpoint)
    }

    /// Issue the bootstrap call, retrying while the node's API is still coming up.
    pub async fn bootstrap(
        &self,
        cluster: &str,
        talosconfig: &TalosConfig,
        node: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.settings.bootstrap_delay)
            .with_max_times(self.settings.bootstrap_attempts);

        let attempt = (|| self.sdk.bootstrap(talosconfig, node))
            .retry(backoff)
            .notify(|err, delay| {
                debug!(cluster, error = %err, ?delay, "bootstrap not accepted yet, retrying")
            });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
            result = attempt => result,
        }
    }

    /// Poll until every readiness check passes, the caller cancels, the
    /// timeout expires, or a node fails for good.
    pub async fn wait_ready(
        &self,
        target: &ReadinessTarget<'_>,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let deadline = tokio::time::sleep(self.settings.timeout);
        tokio::pin!(deadline);
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_failure = "no health check completed".to_string();
        let mut kubeconfig: Option<Kubeconfig> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = &mut deadline => return PollOutcome::TimedOut { last_failure },
                _ = interval.tick() => {}
            }

            let round = self.poll_once(target, &mut kubeconfig);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = &mut deadline => return PollOutcome::TimedOut { last_failure },
                result = round => result,
            };

            match result {
                Ok(ready) => return PollOutcome::Ready(ready),
                Err(RoundFailure::Fatal(err)) => return PollOutcome::Failed(err),
                Err(RoundFailure::NotReady(reason)) => {
                    debug!(cluster = target.cluster, %reason, "cluster not ready yet");
                    last_failure = reason;
                }
            }
        }
    }

    async fn poll_once(
        &self,
        target: &ReadinessTarget<'_>,
        cached: &mut Option<Kubeconfig>,
    ) -> std::result::Result<Kubeconfig, RoundFailure> {
        let containers = self
            .runtime
            .list_containers(&cluster_labels(target.cluster))
            .await
            .map_err(|e| RoundFailure::NotReady(format!("containers: {}", e)))?;
        if let Some(failed) = containers.iter().find(|c| c.state.is_failed()) {
            return Err(RoundFailure::Fatal(ProvisionError::NodeFailed {
                container: failed.name.clone(),
                state: failed.state.to_string(),
            }));
        }

        for probe in TALOS_PROBES {
            self.sdk
                .check(target.talosconfig, &target.node, probe)
                .await
                .map_err(|e| RoundFailure::NotReady(format!("{}: {}", probe, e)))?;
        }

        let kubeconfig = match cached {
            Some(kubeconfig) => kubeconfig.clone(),
            None => {
                let raw = self
                    .sdk
                    .kubeconfig(target.talosconfig, &target.node)
                    .await
                    .map_err(|e| RoundFailure::NotReady(format!("kubeconfig: {}", e)))?;
                let mut parsed = Kubeconfig::from_yaml(&raw)
                    .map_err(|e| RoundFailure::Fatal(e.into()))?;
                rewrite_servers(&mut parsed, target.kubernetes_endpoint);
                cached.insert(parsed).clone()
            }
        };

        let extra: &[KubeCheck] = if target.custom_cni {
            &[]
        } else {
            &CNI_KUBE_CHECKS
        };
        for check in BASE_KUBE_CHECKS.iter().chain(extra) {
            self.probe
                .check(&kubeconfig, *check, target.expected_nodes)
                .await
                .map_err(|e| RoundFailure::NotReady(format!("{}: {}", check, e)))?;
        }

        Ok(kubeconfig)
    }

    /// Bootstrap the cluster and wait for it, returning the rewritten kubeconfig.
    ///
    /// `bundle` must already point at the mapped endpoint (see [`Sequencer::remap`]).
    pub async fn bootstrap_and_wait(
        &self,
        info: &ClusterInfo,
        bundle: &ConfigBundle,
        cancel: &CancellationToken,
    ) -> Result<Kubeconfig> {
        let node = bootstrap_node(info)?;
        let kubernetes_endpoint =
            info.kubernetes_endpoint
                .as_deref()
                .ok_or_else(|| ProvisionError::NoPortMapping {
                    container: node.name.clone(),
                    port: KUBERNETES_API_PORT,
                })?;
        let address = node
            .address
            .map(|ip| ip.to_string())
            .ok_or_else(|| ProvisionError::NoControlPlane(info.name.clone()))?;

        info!(cluster = %info.name, stage = %Stage::Provisioned, node = %address, "bootstrapping cluster");
        self.bootstrap(&info.name, bundle.talosconfig(), &address, cancel)
            .await
            .inspect_err(|e| warn!(cluster = %info.name, stage = %Stage::Failed, error = %e, "bootstrap failed"))?;
        info!(cluster = %info.name, stage = %Stage::Bootstrapped, "bootstrap accepted");

        let custom_cni = bundle.uses_custom_cni();
        if custom_cni {
            info!(cluster = %info.name, "custom CNI configured, skipping workload readiness checks");
        }
        let target = ReadinessTarget {
            cluster: &info.name,
            node: address,
            talosconfig: bundle.talosconfig(),
            kubernetes_endpoint,
            expected_nodes: info.nodes.len(),
            custom_cni,
        };

        info!(
            cluster = %info.name,
            stage = %Stage::WaitingReady,
            timeout_secs = self.settings.timeout.as_secs(),
            "waiting for cluster to become ready"
        );
        let outcome = self.wait_ready(&target, cancel).await;
        let result = outcome.into_result(&info.name, self.settings.timeout);
        match &result {
            Ok(_) => info!(cluster = %info.name, stage = %Stage::Ready, "cluster is ready"),
            Err(e) => warn!(cluster = %info.name, stage = %Stage::Failed, error = %e, "cluster did not become ready"),
        }
        result
    }
}

fn bootstrap_node(info: &ClusterInfo) -> Result<&NodeInfo> {
    info.control_planes()
        .min_by(|a, b| a.name.cmp(&b.name))
        .ok_or_else(|| ProvisionError::NoControlPlane(info.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_section() {
        let settings = ReadinessSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(600));
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.bootstrap_attempts, 30);
    }

    #[test]
    fn test_timeout_outcome_is_distinct() {
        let err = PollOutcome::TimedOut {
            last_failure: "etcd: not healthy".to_string(),
        }
        .into_result("demo", Duration::from_secs(1))
        .unwrap_err();
        assert!(err.is_readiness_timeout());
        assert!(err.to_string().contains("etcd: not healthy"));

        let err = PollOutcome::Cancelled
            .into_result("demo", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_bootstrap_node_needs_control_plane() {
        let info = ClusterInfo {
            name: "demo".to_string(),
            network_name: "demo".to_string(),
            cidr: None,
            gateway: None,
            nodes: Vec::new(),
            kubernetes_endpoint: None,
        };
        assert!(matches!(
            bootstrap_node(&info),
            Err(ProvisionError::NoControlPlane(_))
        ));
    }
}
