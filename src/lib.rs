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

// Core modules
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export commonly used types
pub use domain::bundle::{remap_endpoint, BundleBuilder, ConfigBundle, MachineConfig, TalosConfig};
pub use domain::cluster::{
    build_request, ClusterRequest, ClusterStatus, ClusterValidator, NodeDefaults, NodeRequest,
    NodeResources, NodeRole, PollOutcome, ReadinessSettings, Sequencer, TalosProvisioner,
};
pub use domain::config::ProvisionerConfig;
pub use domain::network::{allocate, NetworkAllocation};
pub use domain::patches::{Patch, PatchStore, Scope};
pub use infrastructure::docker::{
    ClusterInfo, ClusterProvisioner, ContainerRuntime, DockerProvisioner, DockerRuntime, NodeInfo,
};
pub use infrastructure::kubernetes::{KubeCheck, KubeProbe, KubernetesProbe};
pub use infrastructure::talos::{TalosCtl, TalosProbe, TalosSdk};
pub use shared::{ProvisionError, Result};
