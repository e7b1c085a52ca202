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

/// Default images and versions
pub const DEFAULT_TALOS_IMAGE: &str = "ghcr.io/siderolabs/talos:v1.11.2";
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.34.1";

/// Network configuration
pub const DEFAULT_CIDR: &str = "10.5.0.0/24";
pub const DEFAULT_MTU: u32 = 1500;
pub const HOST_LOOPBACK: &str = "127.0.0.1";

/// Address offsets inside the cluster network
pub const GATEWAY_OFFSET: i64 = 1;
pub const FIRST_NODE_OFFSET: i64 = 2;

/// Node ports
pub const TALOS_API_PORT: u16 = 50000;
pub const KUBERNETES_API_PORT: u16 = 6443;

/// Default node resources
pub const DEFAULT_NODE_CPUS: &str = "2";
pub const DEFAULT_NODE_MEMORY: &str = "2GiB";
pub const NANO_CPUS_PER_CPU: i64 = 1_000_000_000;

/// Readiness settings
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_BOOTSTRAP_RETRY_ATTEMPTS: usize = 30;
pub const BOOTSTRAP_RETRY_DELAY_SECS: u64 = 2;

/// Container stop grace period
pub const STOP_TIMEOUT_SECS: i64 = 10;

/// Container labels
pub const LABEL_OWNED: &str = "talos.owned";
pub const LABEL_CLUSTER_NAME: &str = "talos.cluster.name";
pub const LABEL_TYPE: &str = "talos.type";

/// Node roles
pub const TYPE_CONTROL_PLANE: &str = "controlplane";
pub const TYPE_WORKER: &str = "worker";

/// Node container settings
pub const ENV_PLATFORM: &str = "PLATFORM=container";
pub const ENV_USERDATA: &str = "USERDATA";
pub const SECURITY_OPT_SECCOMP: &str = "seccomp=unconfined";
pub const NODE_TMPFS_MOUNTS: [&str; 3] = ["/run", "/system", "/tmp"];
pub const NODE_VOLUMES: [&str; 6] = [
    "/system/state",
    "/var",
    "/etc/cni",
    "/etc/kubernetes",
    "/usr/libexec/kubernetes",
    "/opt",
];

/// Credential naming
pub const CONTEXT_PREFIX: &str = "admin@";

/// Default CNI shipped with generated configs
pub const DEFAULT_CNI: &str = "flannel";

/// Cluster name limits
pub const MAX_CLUSTER_NAME_LEN: usize = 45;

/// Configuration file environment variable
pub const CONFIG_FILE_ENV: &str = "TALOS_KUBE_CONFIG_FILE";

/// State file written per cluster
pub const STATE_FILE_NAME: &str = "state.yaml";
pub const DEFAULT_STATE_DIR: &str = "~/.talos/clusters";
