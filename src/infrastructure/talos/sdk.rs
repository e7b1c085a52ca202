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

use crate::domain::bundle::TalosConfig;
use crate::shared::error::Result;
use serde_yaml::Value;
use std::fmt;

/// Parameters for base machine configuration generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateInput {
    pub cluster_name: String,
    pub kubernetes_version: String,
    /// Cluster API endpoint, `https://<control-plane-ip>:6443`.
    pub endpoint: String,
    /// Management API endpoints written into the talosconfig.
    pub endpoints: Vec<String>,
    pub additional_sans: Vec<String>,
}

/// Unpatched machine configuration for both roles plus the client config.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedConfig {
    pub control_plane: Value,
    pub worker: Value,
    pub talosconfig: TalosConfig,
}

/// Node-level health probes answered by the Talos management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TalosProbe {
    Apid,
    Etcd,
    Kubelet,
}

impl fmt::Display for TalosProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TalosProbe::Apid => write!(f, "apid"),
            TalosProbe::Etcd => write!(f, "etcd"),
            TalosProbe::Kubelet => write!(f, "kubelet"),
        }
    }
}

/// The cluster-bootstrap SDK as seen by the provisioner.
///
/// `check` returning an error means "not healthy yet"; callers decide whether
/// to keep polling.
#[async_trait::async_trait]
pub trait TalosSdk: Send + Sync {
    async fn generate_config(&self, input: &GenerateInput) -> Result<GeneratedConfig>;

    async fn bootstrap(&self, talosconfig: &TalosConfig, node: &str) -> Result<()>;

    /// Raw kubeconfig YAML as issued by the cluster.
    async fn kubeconfig(&self, talosconfig: &TalosConfig, node: &str) -> Result<String>;

    async fn check(&self, talosconfig: &TalosConfig, node: &str, probe: TalosProbe) -> Result<()>;
}
