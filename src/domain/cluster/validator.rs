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

use crate::domain::cluster::request::NodeResources;
use crate::domain::config::ProvisionerConfig;
use crate::domain::network;
use crate::infrastructure::constants::MAX_CLUSTER_NAME_LEN;
use crate::shared::error::{ProvisionError, Result};
use regex::Regex;

const VERSION_PATTERN: &str = r"^v?\d+\.\d+\.\d+$";

/// Checks a resolved configuration before anything touches Docker.
pub struct ClusterValidator;

impl ClusterValidator {
    pub fn validate(conf: &ProvisionerConfig) -> Result<()> {
        Self::validate_name(&conf.cluster.name)?;
        Self::validate_node_counts(conf)?;
        Self::validate_version(&conf.cluster.kubernetes_version)?;
        NodeResources::parse(&conf.nodes.cpus, &conf.nodes.memory)?;

        if conf.network.mtu == 0 {
            return Err(ProvisionError::ValidationError(
                "network.mtu must be > 0".to_string(),
            ));
        }
        if conf.readiness.poll_interval_secs == 0 {
            return Err(ProvisionError::ValidationError(
                "readiness.poll_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_name(name: &str) -> Result<()> {
        if !is_valid_cluster_name(name) {
            return Err(ProvisionError::ValidationError(format!(
                "Invalid cluster name '{}': use lowercase letters, digits and '-', \
                starting and ending with a letter or digit",
                name
            )));
        }

        if name.len() > MAX_CLUSTER_NAME_LEN {
            return Err(ProvisionError::ValidationError(format!(
                "Cluster name too long (max {} chars): {}",
                MAX_CLUSTER_NAME_LEN, name
            )));
        }

        Ok(())
    }

    fn validate_node_counts(conf: &ProvisionerConfig) -> Result<()> {
        let control_planes = conf.cluster.control_planes;
        let workers = conf.cluster.workers;
        if control_planes == 0 {
            return Err(ProvisionError::ValidationError(
                "cluster.control_planes must be > 0".to_string(),
            ));
        }

        let allocation = network::allocate(&conf.network.cidr)?;
        let wanted = (control_planes + workers) as u64;
        if wanted > allocation.node_capacity() {
            return Err(ProvisionError::ValidationError(format!(
                "Network {} has room for {} nodes, {} requested",
                allocation.net(),
                allocation.node_capacity(),
                wanted
            )));
        }

        Ok(())
    }

    fn validate_version(version: &str) -> Result<()> {
        let pattern = Regex::new(VERSION_PATTERN)
            .map_err(|e| ProvisionError::config_error(e.to_string()))?;
        if !pattern.is_match(version) {
            return Err(ProvisionError::ValidationError(format!(
                "Invalid Kubernetes version '{}', expected MAJOR.MINOR.PATCH",
                version
            )));
        }
        Ok(())
    }
}

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
pub fn is_valid_cluster_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    if !name.chars().next().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }
    if !name.chars().last().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl ProvisionerConfig {
    pub fn validate(&self) -> Result<()> {
        ClusterValidator::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProvisionerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_cluster_names() {
        assert!(is_valid_cluster_name("demo"));
        assert!(is_valid_cluster_name("talos-1"));
        assert!(!is_valid_cluster_name("Demo"));
        assert!(!is_valid_cluster_name("-demo"));
        assert!(!is_valid_cluster_name("demo-"));
        assert!(!is_valid_cluster_name("de_mo"));
        assert!(!is_valid_cluster_name(""));
        assert!(ClusterValidator::validate_name(&"a".repeat(46)).is_err());
    }

    #[test]
    fn test_network_capacity() {
        let mut conf = ProvisionerConfig::default();
        conf.network.cidr = "10.5.0.0/29".to_string();
        conf.cluster.control_planes = 3;
        conf.cluster.workers = 2;
        assert!(conf.validate().is_ok());

        conf.cluster.workers = 3;
        assert!(matches!(
            conf.validate(),
            Err(ProvisionError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut conf = ProvisionerConfig::default();
        conf.cluster.control_planes = 0;
        assert!(conf.validate().is_err());

        let mut conf = ProvisionerConfig::default();
        conf.cluster.kubernetes_version = "latest".to_string();
        assert!(conf.validate().is_err());

        let mut conf = ProvisionerConfig::default();
        conf.cluster.kubernetes_version = "v1.34.1".to_string();
        assert!(conf.validate().is_ok());

        let mut conf = ProvisionerConfig::default();
        conf.network.cidr = "fd00::/64".to_string();
        assert!(matches!(
            conf.validate(),
            Err(ProvisionError::Ipv6NotSupported(_))
        ));

        let mut conf = ProvisionerConfig::default();
        conf.nodes.memory = "lots".to_string();
        assert!(conf.validate().is_err());
    }
}
