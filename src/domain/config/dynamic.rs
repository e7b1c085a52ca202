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

//! `-D key=value` overrides applied on top of the resolved configuration.

use super::provisioner::ProvisionerConfig;
use std::collections::HashMap;
use std::str::FromStr;

/// Keys accepted by [`apply_overrides`].
pub const SUPPORTED_KEYS: [&str; 16] = [
    "cluster.name",
    "cluster.kubernetes-version",
    "cluster.talos-image",
    "cluster.control-planes",
    "cluster.workers",
    "cluster.patches-dir",
    "network.cidr",
    "network.mtu",
    "nodes.cpus",
    "nodes.memory",
    "output.kubeconfig",
    "output.talosconfig",
    "output.state-dir",
    "readiness.timeout-secs",
    "readiness.poll-interval-secs",
    "readiness.bootstrap-retry-attempts",
];

pub fn apply_overrides(
    configs: &HashMap<String, String>,
    conf: &mut ProvisionerConfig,
) -> anyhow::Result<()> {
    let mut keys: Vec<&String> = configs.keys().collect();
    keys.sort();

    for key in keys {
        let value = configs[key].as_str();
        match key.as_str() {
            "cluster.name" => conf.cluster.name = value.to_string(),
            "cluster.kubernetes-version" => conf.cluster.kubernetes_version = value.to_string(),
            "cluster.talos-image" => conf.cluster.talos_image = value.to_string(),
            "cluster.control-planes" => conf.cluster.control_planes = parse(key, value)?,
            "cluster.workers" => conf.cluster.workers = parse(key, value)?,
            "cluster.patches-dir" => conf.cluster.patches_dir = Some(value.to_string()),
            "network.cidr" => conf.network.cidr = value.to_string(),
            "network.mtu" => conf.network.mtu = parse(key, value)?,
            "nodes.cpus" => conf.nodes.cpus = value.to_string(),
            "nodes.memory" => conf.nodes.memory = value.to_string(),
            "output.kubeconfig" => conf.output.kubeconfig = Some(value.to_string()),
            "output.talosconfig" => conf.output.talosconfig = Some(value.to_string()),
            "output.state-dir" => conf.output.state_dir = value.to_string(),
            "readiness.timeout-secs" => conf.readiness.timeout_secs = parse(key, value)?,
            "readiness.poll-interval-secs" => {
                conf.readiness.poll_interval_secs = parse(key, value)?
            }
            "readiness.bootstrap-retry-attempts" => {
                conf.readiness.bootstrap_retry_attempts = parse(key, value)?
            }
            other => anyhow::bail!(
                "Unknown property '{}'. Supported: {}",
                other,
                SUPPORTED_KEYS.join(", ")
            ),
        }
    }

    Ok(())
}

fn parse<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, value))
}
