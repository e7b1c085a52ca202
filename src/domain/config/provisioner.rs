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

//! Provisioner configuration file (`talos-kube.toml`)

use crate::infrastructure::constants::{
    DEFAULT_BOOTSTRAP_RETRY_ATTEMPTS, DEFAULT_CIDR, DEFAULT_KUBERNETES_VERSION, DEFAULT_MTU,
    DEFAULT_NODE_CPUS, DEFAULT_NODE_MEMORY, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_READINESS_TIMEOUT_SECS, DEFAULT_STATE_DIR, DEFAULT_TALOS_IMAGE, NANO_CPUS_PER_CPU,
};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Main configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub cluster: ClusterSection,
    pub network: NetworkSection,
    pub nodes: NodesSection,
    pub output: OutputSection,
    pub readiness: ReadinessSection,
}

impl ProvisionerConfig {
    /// Load configuration from TOML file
    pub fn from<T: AsRef<str>>(path: T) -> anyhow::Result<Self> {
        let content = read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.as_ref(), e))?;

        let conf: Self =
            toml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;

        Ok(conf)
    }

    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.output.kubeconfig.as_deref().map(expand_home)
    }

    pub fn talosconfig_path(&self) -> Option<PathBuf> {
        self.output.talosconfig.as_deref().map(expand_home)
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_home(&self.output.state_dir)
    }

    pub fn patches_dir(&self) -> Option<PathBuf> {
        self.cluster.patches_dir.as_deref().map(expand_home)
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    pub name: String,
    pub kubernetes_version: String,
    pub talos_image: String,
    pub control_planes: usize,
    pub workers: usize,
    pub patches_dir: Option<String>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            name: "talos-default".to_string(),
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            talos_image: DEFAULT_TALOS_IMAGE.to_string(),
            control_planes: 1,
            workers: 0,
            patches_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub cidr: String,
    pub mtu: u32,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_CIDR.to_string(),
            mtu: DEFAULT_MTU,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesSection {
    pub cpus: String,
    pub memory: String,
}

impl Default for NodesSection {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_NODE_CPUS.to_string(),
            memory: DEFAULT_NODE_MEMORY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub kubeconfig: Option<String>,
    pub talosconfig: Option<String>,
    pub state_dir: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            talosconfig: None,
            state_dir: DEFAULT_STATE_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSection {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub bootstrap_retry_attempts: usize,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            bootstrap_retry_attempts: DEFAULT_BOOTSTRAP_RETRY_ATTEMPTS,
        }
    }
}

impl ReadinessSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .map(|home| home.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| Path::new(path).to_path_buf()),
        _ => PathBuf::from(path),
    }
}

/// Parse a CPU count such as "2" or "1.5" into Docker NanoCPUs.
pub fn parse_cpus(s: &str) -> anyhow::Result<i64> {
    let cpus: f64 = s
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid CPU count: {}", s))?;
    if !cpus.is_finite() || cpus <= 0.0 {
        anyhow::bail!("CPU count must be positive: {}", s);
    }
    Ok((cpus * NANO_CPUS_PER_CPU as f64).round() as i64)
}

/// Parse a memory size such as "2GiB", "512Mi" or "1073741824" into bytes.
pub fn parse_memory_size(s: &str) -> anyhow::Result<i64> {
    let s = s.trim().to_uppercase();

    let (num_str, unit) = if let Some(n) = s.strip_suffix("TIB").or(s.strip_suffix("TI")) {
        (n, 1024i64 * 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GIB").or(s.strip_suffix("GI")) {
        (n, 1024i64 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MIB").or(s.strip_suffix("MI")) {
        (n, 1024i64 * 1024)
    } else if let Some(n) = s.strip_suffix("KIB").or(s.strip_suffix("KI")) {
        (n, 1024i64)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1000i64 * 1000 * 1000)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1000i64 * 1000)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1000i64)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: i64 = num_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid memory size: {}", s))?;
    if num <= 0 {
        anyhow::bail!("Memory size must be positive: {}", s);
    }

    num.checked_mul(unit)
        .ok_or_else(|| anyhow::anyhow!("Memory size too large: {}", s))
}
