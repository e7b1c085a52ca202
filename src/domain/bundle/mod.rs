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

//! Configuration bundle: patched per-role machine configs plus the client config.

pub mod builder;
pub mod machine;
pub mod talosconfig;

pub use builder::{fold_patches, BundleBuilder};
pub use machine::MachineConfig;
pub use talosconfig::{TalosConfig, TalosContext};

use crate::domain::cluster::request::NodeRole;
use crate::shared::error::Result;

/// Immutable once built, except for the talosconfig endpoint list which
/// only [`remap_endpoint`] may rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBundle {
    control_plane: MachineConfig,
    worker: MachineConfig,
    talosconfig: TalosConfig,
    endpoint: String,
}

impl ConfigBundle {
    pub fn new(
        control_plane: MachineConfig,
        worker: MachineConfig,
        talosconfig: TalosConfig,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            worker,
            talosconfig,
            endpoint: endpoint.into(),
        }
    }

    pub fn control_plane(&self) -> &MachineConfig {
        &self.control_plane
    }

    pub fn worker(&self) -> &MachineConfig {
        &self.worker
    }

    pub fn for_role(&self, role: NodeRole) -> &MachineConfig {
        match role {
            NodeRole::ControlPlane => &self.control_plane,
            NodeRole::Worker => &self.worker,
        }
    }

    pub fn talosconfig(&self) -> &TalosConfig {
        &self.talosconfig
    }

    /// Cluster API endpoint baked into the machine configs (`https://<ip>:6443`).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn uses_custom_cni(&self) -> bool {
        self.control_plane.uses_custom_cni()
    }
}

/// Point the talosconfig at `endpoint` (`127.0.0.1:<mapped-port>`).
///
/// This is the only mutation a bundle accepts after it is built.
pub fn remap_endpoint(bundle: &mut ConfigBundle, endpoint: &str) -> Result<()> {
    bundle.talosconfig.set_endpoints(vec![endpoint.to_string()])
}
