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

//! In-memory stand-ins for Docker, talosctl and the Kubernetes API.

#![allow(dead_code)]

use async_trait::async_trait;
use kube::config::Kubeconfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use talos_kube::domain::bundle::TalosConfig;
use talos_kube::domain::config::ProvisionerConfig;
use talos_kube::infrastructure::docker::{
    ContainerDetails, ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary,
    DockerProvisioner, HostBinding, Labels, NetworkSpec,
};
use talos_kube::infrastructure::kubernetes::{KubeCheck, KubernetesProbe};
use talos_kube::infrastructure::talos::{GenerateInput, GeneratedConfig, TalosProbe, TalosSdk};
use talos_kube::{ProvisionError, ReadinessSettings, Result, TalosProvisioner};

// ============================================================================
// Container runtime
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub state: ContainerState,
    pub ports: BTreeMap<u16, u16>,
    pub created: i64,
}

#[derive(Debug, Default)]
pub struct RuntimeState {
    pub containers: BTreeMap<String, FakeContainer>,
    pub networks: BTreeMap<String, NetworkSpec>,
    pub images: Vec<String>,
    pub next_id: u64,
    pub next_port: u16,
    pub docker_down: bool,
    /// Container name whose start call fails.
    pub fail_start: Option<String>,
    /// Container name that exits right after starting.
    pub exit_on_start: Option<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn container_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<_> = state
            .containers
            .values()
            .map(|c| c.spec.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|c| c.spec.name == name)
            .cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.keys().cloned().collect()
    }

    fn find_id(state: &RuntimeState, id_or_name: &str) -> Option<String> {
        state
            .containers
            .values()
            .find(|c| c.id == id_or_name || c.spec.name == id_or_name)
            .map(|c| c.id.clone())
    }

    fn check_up(state: &RuntimeState) -> Result<()> {
        if state.docker_down {
            return Err(ProvisionError::DockerNotAvailable(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }
        Ok(())
    }
}

fn matches_labels(have: &Labels, want: &Labels) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        Self::check_up(&self.state.lock().unwrap())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if !state.images.iter().any(|i| i == image) {
            state.images.push(image.to_string());
        }
        Ok(())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if state.networks.contains_key(&spec.name) {
            return Err(ProvisionError::Docker(format!(
                "network with name {} already exists",
                spec.name
            )));
        }
        state.networks.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn list_networks(&self, labels: &Labels) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .values()
            .filter(|n| matches_labels(&n.labels, labels))
            .map(|n| n.name.clone())
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(ProvisionError::container(
                &spec.name,
                "Conflict. The container name is already in use",
            ));
        }

        state.next_id += 1;
        let id = format!("fake{:04}", state.next_id);
        let mut ports = BTreeMap::new();
        for port in &spec.published_ports {
            state.next_port += 1;
            ports.insert(*port, 32000 + state.next_port);
        }
        let created = 1_700_000_000 + state.next_id as i64;

        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                state: ContainerState::Created,
                ports,
                created,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        let fail_start = state.fail_start.clone();
        let exit_on_start = state.exit_on_start.clone();
        let key = Self::find_id(&state, id)
            .ok_or_else(|| ProvisionError::Docker(format!("No such container: {}", id)))?;
        let container = state
            .containers
            .get_mut(&key)
            .ok_or_else(|| ProvisionError::Docker(format!("No such container: {}", id)))?;

        if fail_start.as_deref() == Some(container.spec.name.as_str()) {
            return Err(ProvisionError::Docker("driver failed programming external connectivity".to_string()));
        }
        container.state = if exit_on_start.as_deref() == Some(container.spec.name.as_str()) {
            ContainerState::Exited
        } else {
            ContainerState::Running
        };
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        let key = Self::find_id(&state, id)
            .ok_or_else(|| ProvisionError::Docker(format!("No such container: {}", id)))?;
        if let Some(container) = state.containers.get_mut(&key) {
            container.state = ContainerState::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(key) = Self::find_id(&state, id) {
            state.containers.remove(&key);
            state.removed.push(key);
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let state = self.state.lock().unwrap();
        let container = Self::find_id(&state, id)
            .and_then(|key| state.containers.get(&key))
            .ok_or_else(|| ProvisionError::Docker(format!("No such container: {}", id)))?;

        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.spec.name.clone(),
            state: container.state.clone(),
            ip_address: container.spec.ipv4_address.map(|ip| ip.to_string()),
            ports: container
                .ports
                .iter()
                .map(|(port, host_port)| {
                    (
                        *port,
                        vec![HostBinding {
                            host_ip: "127.0.0.1".to_string(),
                            host_port: *host_port,
                        }],
                    )
                })
                .collect(),
        })
    }

    async fn list_containers(&self, labels: &Labels) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state
            .containers
            .values()
            .filter(|c| matches_labels(&c.spec.labels, labels))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.spec.name.clone(),
                labels: c.spec.labels.clone(),
                state: c.state.clone(),
                status: c.state.to_string(),
                created: c.created,
            })
            .collect())
    }
}

// ============================================================================
// Talos SDK
// ============================================================================

#[derive(Debug, Default)]
pub struct SdkState {
    pub healthy: AtomicBool,
    pub bootstrap_failures: AtomicUsize,
    pub bootstrap_calls: AtomicUsize,
    pub kubeconfig_calls: AtomicUsize,
    pub probes: Mutex<Vec<TalosProbe>>,
    pub inputs: Mutex<Vec<GenerateInput>>,
    pub bootstrap_endpoints: Mutex<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSdk {
    pub state: Arc<SdkState>,
}

impl FakeSdk {
    pub fn healthy() -> Self {
        let sdk = Self::default();
        sdk.state.healthy.store(true, Ordering::SeqCst);
        sdk
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }

    pub fn failing_bootstrap(times: usize) -> Self {
        let sdk = Self::healthy();
        sdk.state.bootstrap_failures.store(times, Ordering::SeqCst);
        sdk
    }
}

pub fn machine_document(role: &str, input: &GenerateInput) -> serde_yaml::Value {
    serde_yaml::from_str(&format!(
        r#"
version: v1alpha1
machine:
  type: {role}
  kubelet:
    image: ghcr.io/siderolabs/kubelet:v{version}
cluster:
  clusterName: {name}
  controlPlane:
    endpoint: {endpoint}
  apiServer:
    certSANs:
      - {san}
"#,
        role = role,
        version = input.kubernetes_version,
        name = input.cluster_name,
        endpoint = input.endpoint,
        san = input.additional_sans.join(", "),
    ))
    .unwrap()
}

pub fn talos_kubeconfig(cluster: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: {c}
  cluster:
    server: https://10.5.0.2:6443
    certificate-authority-data: Y2E=
contexts:
- name: admin@{c}
  context:
    cluster: {c}
    namespace: default
    user: admin@{c}
current-context: admin@{c}
users:
- name: admin@{c}
  user:
    client-certificate-data: Y3J0
"#,
        c = cluster
    )
}

#[async_trait]
impl TalosSdk for FakeSdk {
    async fn generate_config(&self, input: &GenerateInput) -> Result<GeneratedConfig> {
        self.state.inputs.lock().unwrap().push(input.clone());
        let talosconfig = TalosConfig::from_yaml(&format!(
            "context: {name}\ncontexts:\n  {name}:\n    endpoints: [{endpoints}]\n    ca: Y2E=\n",
            name = input.cluster_name,
            endpoints = input.endpoints.join(", "),
        ))?;
        Ok(GeneratedConfig {
            control_plane: machine_document("controlplane", input),
            worker: machine_document("worker", input),
            talosconfig,
        })
    }

    async fn bootstrap(&self, talosconfig: &TalosConfig, _node: &str) -> Result<()> {
        self.state.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .bootstrap_endpoints
            .lock()
            .unwrap()
            .push(talosconfig.endpoints().to_vec());
        let remaining = self.state.bootstrap_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .bootstrap_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ProvisionError::Talos(
                "rpc error: code = Unavailable desc = connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn kubeconfig(&self, talosconfig: &TalosConfig, _node: &str) -> Result<String> {
        self.state.kubeconfig_calls.fetch_add(1, Ordering::SeqCst);
        let name = talosconfig.context.clone().unwrap_or_default();
        Ok(talos_kubeconfig(&name))
    }

    async fn check(&self, _talosconfig: &TalosConfig, _node: &str, probe: TalosProbe) -> Result<()> {
        self.state.probes.lock().unwrap().push(probe);
        if !self.state.healthy.load(Ordering::SeqCst) {
            return Err(ProvisionError::Talos(format!("{} is not healthy", probe)));
        }
        Ok(())
    }
}

// ============================================================================
// Kubernetes probe
// ============================================================================

#[derive(Debug, Default)]
pub struct ProbeState {
    pub checks: Mutex<Vec<KubeCheck>>,
    pub servers: Mutex<Vec<String>>,
    pub expected_nodes: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    pub state: Arc<ProbeState>,
}

impl FakeProbe {
    pub fn checks(&self) -> Vec<KubeCheck> {
        self.state.checks.lock().unwrap().clone()
    }
}

#[async_trait]
impl KubernetesProbe for FakeProbe {
    async fn check(
        &self,
        kubeconfig: &Kubeconfig,
        check: KubeCheck,
        expected_nodes: usize,
    ) -> Result<()> {
        self.state.checks.lock().unwrap().push(check);
        self.state
            .expected_nodes
            .store(expected_nodes, Ordering::SeqCst);
        if let Some(server) = kubeconfig
            .clusters
            .first()
            .and_then(|c| c.cluster.as_ref())
            .and_then(|c| c.server.clone())
        {
            self.state.servers.lock().unwrap().push(server);
        }
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn test_config(state_dir: &Path) -> ProvisionerConfig {
    let mut conf = ProvisionerConfig::default();
    conf.cluster.name = "demo".to_string();
    conf.cluster.workers = 1;
    conf.output.state_dir = state_dir.display().to_string();
    conf
}

pub fn fast_settings() -> ReadinessSettings {
    ReadinessSettings {
        timeout: std::time::Duration::from_secs(60),
        poll_interval: std::time::Duration::from_secs(2),
        bootstrap_attempts: 5,
        bootstrap_delay: std::time::Duration::from_secs(1),
    }
}

pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub sdk: FakeSdk,
    pub probe: FakeProbe,
    pub provisioner: TalosProvisioner,
}

pub fn harness(conf: ProvisionerConfig, sdk: FakeSdk) -> Harness {
    let runtime = FakeRuntime::new();
    let probe = FakeProbe::default();
    let docker = DockerProvisioner::new(runtime.clone(), conf.state_dir());
    let provisioner = TalosProvisioner::with_components(
        conf,
        runtime.clone(),
        Box::new(docker),
        Box::new(sdk.clone()),
        Box::new(probe.clone()),
    )
    .with_settings(fast_settings());

    Harness {
        runtime,
        sdk,
        probe,
        provisioner,
    }
}
