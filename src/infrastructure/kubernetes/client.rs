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

use crate::shared::error::{ProvisionError, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use std::fmt;
use std::time::Duration;

const CONDITION_READY: &str = "Ready";
const STATUS_TRUE: &str = "True";
const KUBE_SYSTEM: &str = "kube-system";
const COREDNS_SELECTOR: &str = "k8s-app=kube-dns";
const KUBE_PROXY_SELECTOR: &str = "k8s-app=kube-proxy";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Kubernetes-level readiness checks, run through the external endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KubeCheck {
    ApiServer,
    NodesRegistered,
    NodesReady,
    CoreDns,
    KubeProxy,
}

impl fmt::Display for KubeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KubeCheck::ApiServer => "kube-apiserver",
            KubeCheck::NodesRegistered => "nodes-registered",
            KubeCheck::NodesReady => "nodes-ready",
            KubeCheck::CoreDns => "coredns",
            KubeCheck::KubeProxy => "kube-proxy",
        };
        write!(f, "{}", name)
    }
}

/// An error from `check` means the condition does not hold yet.
#[async_trait::async_trait]
pub trait KubernetesProbe: Send + Sync {
    async fn check(
        &self,
        kubeconfig: &Kubeconfig,
        check: KubeCheck,
        expected_nodes: usize,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct KubeProbe;

impl KubeProbe {
    pub fn new() -> Self {
        Self
    }

    async fn client(&self, kubeconfig: &Kubeconfig) -> Result<Client> {
        let mut config =
            kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    ProvisionError::Kubernetes(format!(
                        "Failed to create Kubernetes config: {}",
                        e
                    ))
                })?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        Client::try_from(config).map_err(|e| {
            ProvisionError::Kubernetes(format!("Failed to create Kubernetes client: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl KubernetesProbe for KubeProbe {
    async fn check(
        &self,
        kubeconfig: &Kubeconfig,
        check: KubeCheck,
        expected_nodes: usize,
    ) -> Result<()> {
        let client = self.client(kubeconfig).await?;

        match check {
            KubeCheck::ApiServer => {
                client.apiserver_version().await?;
                Ok(())
            }
            KubeCheck::NodesRegistered => {
                let nodes = list_nodes(&client).await?;
                expect_at_least(check, nodes.len(), expected_nodes)
            }
            KubeCheck::NodesReady => {
                let nodes = list_nodes(&client).await?;
                let ready = nodes.iter().filter(|n| node_ready(n)).count();
                expect_at_least(check, ready, expected_nodes)
            }
            KubeCheck::CoreDns => {
                let pods = list_system_pods(&client, COREDNS_SELECTOR).await?;
                let ready = pods.iter().filter(|p| pod_ready(p)).count();
                if pods.is_empty() || ready < pods.len() {
                    return Err(not_ready(check, ready, pods.len()));
                }
                Ok(())
            }
            KubeCheck::KubeProxy => {
                let pods = list_system_pods(&client, KUBE_PROXY_SELECTOR).await?;
                let ready = pods.iter().filter(|p| pod_ready(p)).count();
                expect_at_least(check, ready, expected_nodes)
            }
        }
    }
}

async fn list_nodes(client: &Client) -> Result<Vec<Node>> {
    let api: Api<Node> = Api::all(client.clone());
    Ok(api.list(&ListParams::default()).await?.items)
}

async fn list_system_pods(client: &Client, selector: &str) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::namespaced(client.clone(), KUBE_SYSTEM);
    let lp = ListParams::default().labels(selector);
    Ok(api.list(&lp).await?.items)
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == CONDITION_READY && c.status == STATUS_TRUE)
        })
        .unwrap_or(false)
}

fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == CONDITION_READY && c.status == STATUS_TRUE)
        })
        .unwrap_or(false)
}

fn expect_at_least(check: KubeCheck, actual: usize, expected: usize) -> Result<()> {
    if actual < expected {
        return Err(not_ready(check, actual, expected));
    }
    Ok(())
}

fn not_ready(check: KubeCheck, actual: usize, expected: usize) -> ProvisionError {
    ProvisionError::Kubernetes(format!("{}: {}/{} ready", check, actual, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, PodCondition, PodStatus};

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_ready() {
        assert!(node_ready(&node("True")));
        assert!(!node_ready(&node("False")));
        assert!(!node_ready(&Node::default()));
    }

    #[test]
    fn test_pod_ready() {
        let pod = Pod {
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(pod_ready(&pod));
        assert!(!pod_ready(&Pod::default()));
    }

    #[test]
    fn test_expect_at_least() {
        assert!(expect_at_least(KubeCheck::NodesReady, 3, 3).is_ok());
        let err = expect_at_least(KubeCheck::NodesReady, 1, 3).unwrap_err();
        assert!(err.to_string().contains("nodes-ready: 1/3 ready"));
    }
}
