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

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Docker is not available: {0}")]
    DockerNotAvailable(String),

    #[error("Cluster '{0}' already exists")]
    ClusterAlreadyExists(String),

    #[error("Cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("Invalid CIDR '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("IPv6 networks are not supported: {0}")]
    Ipv6NotSupported(String),

    #[error("Address offset must not be negative: {0}")]
    NegativeOffset(i64),

    #[error("Address offset {offset} is out of range for network {cidr}")]
    OffsetOutOfRange { offset: i64, cidr: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid patch {}: {reason}", path.display())]
    InvalidPatch { path: PathBuf, reason: String },

    #[error("Failed to load patch {}: {reason}", path.display())]
    PatchStore { path: PathBuf, reason: String },

    #[error("No control plane container found for cluster '{0}'")]
    NoControlPlane(String),

    #[error("Container '{container}' has no published mapping for port {port}")]
    NoPortMapping { container: String, port: u16 },

    #[error("Cluster '{cluster}' did not become ready within {}s (last failure: {last_failure})", timeout.as_secs())]
    ReadinessTimeout {
        cluster: String,
        timeout: Duration,
        last_failure: String,
    },

    #[error("Node container '{container}' is {state}, check its logs with: docker logs {container}")]
    NodeFailed { container: String, state: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Container '{container}': {message}")]
    Container { container: String, message: String },

    #[error("Docker API error: {0}")]
    Docker(String),

    #[error("Talos error: {0}")]
    Talos(String),

    #[error("Kubernetes API error: {0}")]
    Kubernetes(String),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<bollard::errors::Error> for ProvisionError {
    fn from(err: bollard::errors::Error) -> Self {
        ProvisionError::Docker(err.to_string())
    }
}

impl From<kube::Error> for ProvisionError {
    fn from(err: kube::Error) -> Self {
        ProvisionError::Kubernetes(err.to_string())
    }
}

impl From<kube::config::KubeconfigError> for ProvisionError {
    fn from(err: kube::config::KubeconfigError) -> Self {
        ProvisionError::Kubeconfig(err.to_string())
    }
}

impl ProvisionError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::ConfigError(context.into())
    }

    pub fn invalid_cidr(cidr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_patch(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn container(container: impl Into<String>, message: impl ToString) -> Self {
        Self::Container {
            container: container.into(),
            message: message.to_string(),
        }
    }

    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
