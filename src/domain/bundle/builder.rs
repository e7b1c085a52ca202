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

use super::{ConfigBundle, MachineConfig};
use crate::domain::network;
use crate::domain::patches::{apply_all, Patch, Scope};
use crate::infrastructure::constants::{FIRST_NODE_OFFSET, HOST_LOOPBACK, KUBERNETES_API_PORT};
use crate::infrastructure::talos::{GenerateInput, GeneratedConfig, TalosSdk};
use crate::shared::error::Result;
use serde_yaml::Value;
use tracing::{debug, info};

pub struct BundleBuilder<'a> {
    sdk: &'a dyn TalosSdk,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(sdk: &'a dyn TalosSdk) -> Self {
        Self { sdk }
    }

    pub async fn build(
        &self,
        cluster_name: &str,
        kubernetes_version: &str,
        cidr: &str,
        patches: &[Patch],
    ) -> Result<ConfigBundle> {
        let allocation = network::allocate(cidr)?;
        let control_plane_ip = allocation.addr(FIRST_NODE_OFFSET)?;
        let endpoint = format!("https://{}:{}", control_plane_ip, KUBERNETES_API_PORT);

        let input = GenerateInput {
            cluster_name: cluster_name.to_string(),
            kubernetes_version: kubernetes_version.to_string(),
            endpoint: endpoint.clone(),
            endpoints: vec![control_plane_ip.to_string()],
            additional_sans: vec![HOST_LOOPBACK.to_string()],
        };
        info!(cluster = cluster_name, %endpoint, "generating base machine configuration");
        let generated = self.sdk.generate_config(&input).await?;

        let (control_plane, worker) = fold_patches(&generated, patches)?;
        debug!(
            cluster = cluster_name,
            patches = patches.len(),
            "applied configuration patches"
        );

        Ok(ConfigBundle::new(
            control_plane,
            worker,
            generated.talosconfig,
            endpoint,
        ))
    }
}

/// Apply cluster patches to both roles, then role-scoped patches to their role.
///
/// Patches keep their relative order within a scope.
pub fn fold_patches(
    generated: &GeneratedConfig,
    patches: &[Patch],
) -> Result<(MachineConfig, MachineConfig)> {
    let scoped = |scope: Scope| patches.iter().filter(move |p| p.scope == scope);

    let fold = |base: &Value, role_scope: Scope| -> Result<MachineConfig> {
        let with_cluster = apply_all(base, scoped(Scope::Cluster))?;
        let with_role = apply_all(&with_cluster, scoped(role_scope))?;
        Ok(MachineConfig::new(with_role))
    };

    let control_plane = fold(&generated.control_plane, Scope::ControlPlane)?;
    let worker = fold(&generated.worker, Scope::Worker)?;
    Ok((control_plane, worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::TalosConfig;

    fn generated() -> GeneratedConfig {
        GeneratedConfig {
            control_plane: serde_yaml::from_str("machine:\n  type: controlplane\n").unwrap(),
            worker: serde_yaml::from_str("machine:\n  type: worker\n").unwrap(),
            talosconfig: TalosConfig::default(),
        }
    }

    fn patch(scope: Scope, name: &str, content: &str) -> Patch {
        Patch::from_yaml(name, scope, content).unwrap()
    }

    #[test]
    fn test_role_patch_overrides_cluster_patch() {
        let patches = vec![
            patch(Scope::Cluster, "c.yaml", "machine:\n  x: 1\n"),
            patch(Scope::ControlPlane, "cp.yaml", "machine:\n  x: 2\n"),
        ];
        let (cp, worker) = fold_patches(&generated(), &patches).unwrap();
        assert_eq!(cp.lookup(&["machine", "x"]), Some(&Value::from(2)));
        assert_eq!(worker.lookup(&["machine", "x"]), Some(&Value::from(1)));
    }

    #[test]
    fn test_scope_order_is_independent_of_input_order() {
        let patches = vec![
            patch(Scope::ControlPlane, "cp.yaml", "machine:\n  x: 2\n"),
            patch(Scope::Cluster, "c.yaml", "machine:\n  x: 1\n"),
        ];
        let (cp, _) = fold_patches(&generated(), &patches).unwrap();
        assert_eq!(cp.lookup(&["machine", "x"]), Some(&Value::from(2)));
    }

    #[test]
    fn test_later_patch_in_scope_wins() {
        let patches = vec![
            patch(Scope::Worker, "10.yaml", "machine:\n  x: a\n"),
            patch(Scope::Worker, "20.yaml", "machine:\n  x: b\n"),
        ];
        let (cp, worker) = fold_patches(&generated(), &patches).unwrap();
        assert_eq!(worker.lookup(&["machine", "x"]), Some(&Value::from("b")));
        assert_eq!(cp.lookup(&["machine", "x"]), None);
    }

    #[test]
    fn test_invalid_patch_fails_whole_fold() {
        let patches = vec![
            patch(Scope::Cluster, "ok.yaml", "machine:\n  x: 1\n"),
            patch(Scope::Worker, "bad.yaml", "42\n"),
        ];
        assert!(fold_patches(&generated(), &patches).is_err());
    }
}
