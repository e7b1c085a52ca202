//! Cluster lifecycle commands

use super::display::TableRenderer;
use crate::domain::config::{apply_overrides, ProvisionerConfig};
use crate::infrastructure::constants::CONFIG_FILE_ENV;
use crate::{ProvisionError, TalosProvisioner};
use clap::Parser;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug, Clone)]
pub struct CreateCommand {
    /// Cluster name (DNS label, max 45 chars)
    /// If not provided, will use cluster.name from config file
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Path to the provisioner configuration file (talos-kube.toml)
    /// If not provided, reads TALOS_KUBE_CONFIG_FILE or uses defaults
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    /// Number of control plane nodes
    #[arg(long)]
    pub control_planes: Option<usize>,

    /// Number of worker nodes
    #[arg(long)]
    pub workers: Option<usize>,

    /// Kubernetes version (e.g. 1.34.1)
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    /// Talos node image
    #[arg(long)]
    pub image: Option<String>,

    /// IPv4 CIDR of the cluster network
    #[arg(long)]
    pub cidr: Option<String>,

    /// Write the cluster kubeconfig here; bootstrap and readiness only run when set
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<String>,

    /// Write the talosconfig here
    #[arg(long, value_name = "PATH")]
    pub talosconfig: Option<String>,

    /// Directory holding cluster/, control-planes/ and workers/ patch files
    #[arg(long, value_name = "DIR")]
    pub patches_dir: Option<String>,

    /// Dynamic configuration properties to override any settings (-D key=value)
    ///
    /// Cluster: cluster.name, cluster.kubernetes-version, cluster.talos-image,
    /// cluster.control-planes, cluster.workers, cluster.patches-dir
    /// Network: network.cidr, network.mtu
    /// Nodes: nodes.cpus, nodes.memory
    /// Output: output.kubeconfig, output.talosconfig, output.state-dir
    /// Readiness: readiness.timeout-secs, readiness.poll-interval-secs,
    /// readiness.bootstrap-retry-attempts
    ///
    /// Example: -Dnodes.memory=4GiB -Dreadiness.timeout-secs=900
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// Cluster name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    /// Kubeconfig to remove the cluster's entries from
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<String>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct StartCommand {
    /// Cluster name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct StopCommand {
    /// Cluster name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ListCommand {
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,
}

#[derive(Parser, Debug)]
pub struct StatusCommand {
    /// Cluster name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl CreateCommand {
    pub async fn execute(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut conf = load_config(self.config_file.as_deref())?;

        // Priority: -D > command line > config file > defaults
        if let Some(ref name) = self.name {
            conf.cluster.name = name.clone();
        }
        if let Some(control_planes) = self.control_planes {
            conf.cluster.control_planes = control_planes;
        }
        if let Some(workers) = self.workers {
            conf.cluster.workers = workers;
        }
        if let Some(ref version) = self.kubernetes_version {
            conf.cluster.kubernetes_version = version.clone();
        }
        if let Some(ref image) = self.image {
            conf.cluster.talos_image = image.clone();
        }
        if let Some(ref cidr) = self.cidr {
            conf.network.cidr = cidr.clone();
        }
        if self.kubeconfig.is_some() {
            conf.output.kubeconfig = self.kubeconfig.clone();
        }
        if self.talosconfig.is_some() {
            conf.output.talosconfig = self.talosconfig.clone();
        }
        if self.patches_dir.is_some() {
            conf.cluster.patches_dir = self.patches_dir.clone();
        }
        apply_properties(&self.properties, &mut conf)?;

        conf.validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        let name = conf.cluster.name.clone();

        println!(
            "Creating cluster '{}' ({} control planes, {} workers, network {})...",
            name, conf.cluster.control_planes, conf.cluster.workers, conf.network.cidr
        );
        let provisioner = TalosProvisioner::new(conf)?;
        let info = provisioner
            .create(&name, cancel)
            .await
            .map_err(|e| lifecycle_error("create", &name, e))?;

        println!("Cluster {} created successfully!", info.name);
        if let Some(endpoint) = &info.kubernetes_endpoint {
            println!("  Kubernetes API: https://{}", endpoint);
        }
        Ok(())
    }
}

impl DeleteCommand {
    pub async fn execute(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut conf = load_config(self.config_file.as_deref())?;
        if self.kubeconfig.is_some() {
            conf.output.kubeconfig = self.kubeconfig.clone();
        }
        apply_properties(&self.properties, &mut conf)?;
        let name = resolve_name(self.name.as_deref(), &conf);

        let provisioner = TalosProvisioner::new(conf)?;
        provisioner
            .delete(&name, cancel)
            .await
            .map_err(|e| lifecycle_error("delete", &name, e))?;

        println!("Cluster {} deleted successfully!", name);
        Ok(())
    }
}

impl StartCommand {
    pub async fn execute(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut conf = load_config(self.config_file.as_deref())?;
        apply_properties(&self.properties, &mut conf)?;
        let name = resolve_name(self.name.as_deref(), &conf);

        let provisioner = TalosProvisioner::new(conf)?;
        let started = provisioner
            .start(&name, cancel)
            .await
            .map_err(|e| lifecycle_error("start", &name, e))?;

        println!("✓ Cluster {} started ({} containers)", name, started);
        Ok(())
    }
}

impl StopCommand {
    pub async fn execute(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut conf = load_config(self.config_file.as_deref())?;
        apply_properties(&self.properties, &mut conf)?;
        let name = resolve_name(self.name.as_deref(), &conf);

        let provisioner = TalosProvisioner::new(conf)?;
        let stopped = provisioner
            .stop(&name, cancel)
            .await
            .map_err(|e| lifecycle_error("stop", &name, e))?;

        println!("✓ Cluster {} stopped ({} containers)", name, stopped);
        Ok(())
    }
}

impl ListCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let conf = load_config(self.config_file.as_deref())?;
        let provisioner = TalosProvisioner::new(conf)?;
        let clusters = provisioner.list_clusters().await?;

        let renderer = TableRenderer::new();
        println!("{}", renderer.render_clusters_list(&clusters, chrono::Utc::now()));
        Ok(())
    }
}

impl StatusCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let mut conf = load_config(self.config_file.as_deref())?;
        apply_properties(&self.properties, &mut conf)?;
        let name = resolve_name(self.name.as_deref(), &conf);

        let provisioner = TalosProvisioner::new(conf)?;
        let status = provisioner
            .get_cluster_status(&name)
            .await
            .map_err(|e| lifecycle_error("query", &name, e))?;

        let renderer = TableRenderer::new();
        println!("{}", renderer.render_cluster_status(&status, chrono::Utc::now()));
        Ok(())
    }
}

/// Config file from the flag, then TALOS_KUBE_CONFIG_FILE, then defaults.
fn load_config(config_file: Option<&str>) -> anyhow::Result<ProvisionerConfig> {
    if let Some(path) = config_file {
        return ProvisionerConfig::from(path);
    }
    if let Ok(env_path) = std::env::var(CONFIG_FILE_ENV) {
        return ProvisionerConfig::from(&env_path);
    }
    Ok(ProvisionerConfig::default())
}

fn resolve_name(flag: Option<&str>, conf: &ProvisionerConfig) -> String {
    flag.map(str::to_string)
        .unwrap_or_else(|| conf.cluster.name.clone())
}

fn apply_properties(properties: &[String], conf: &mut ProvisionerConfig) -> anyhow::Result<()> {
    if properties.is_empty() {
        return Ok(());
    }
    let configs = parse_dynamic_configs(properties)
        .map_err(|e| anyhow::anyhow!("Failed to parse dynamic configs: {}", e))?;
    apply_overrides(&configs, conf)
}

fn lifecycle_error(action: &str, name: &str, err: ProvisionError) -> anyhow::Error {
    match err {
        ProvisionError::Cancelled => anyhow::anyhow!("Cancelled, cluster '{}' may be partially created", name),
        e if e.is_readiness_timeout() => anyhow::anyhow!(
            "{}\n\n  The node containers were left in place. Inspect them with `docker ps`\n  or remove them with: talos-kube delete -n {}",
            e,
            name
        ),
        e @ ProvisionError::ClusterNotFound(_) => anyhow::anyhow!(
            "{}\n\n  List existing clusters with: talos-kube list",
            e
        ),
        e => anyhow::anyhow!("Failed to {} cluster '{}': {}", action, name, e),
    }
}

/// Parse dynamic configuration properties from -D key=value format
pub fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();

    for config in configs {
        let parts: Vec<&str> = config.splitn(2, '=').collect();
        if parts.len() != 2 {
            return Err(format!(
                "Invalid config format: '{}'. Expected 'key=value'",
                config
            ));
        }

        let key = parts[0].trim();
        let value = parts[1].trim();

        if key.is_empty() {
            return Err(format!("Empty key in config: '{}'", config));
        }

        map.insert(key.to_string(), value.to_string());
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dynamic_configs() {
        let configs = parse_dynamic_configs(&[
            "cluster.workers=2".to_string(),
            "nodes.memory = 4GiB".to_string(),
        ])
        .unwrap();
        assert_eq!(configs.get("cluster.workers").map(String::as_str), Some("2"));
        assert_eq!(configs.get("nodes.memory").map(String::as_str), Some("4GiB"));

        assert!(parse_dynamic_configs(&["novalue".to_string()]).is_err());
        assert!(parse_dynamic_configs(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_properties_win_over_flags() {
        let mut conf = ProvisionerConfig::default();
        conf.cluster.workers = 1;
        apply_properties(&["cluster.workers=4".to_string()], &mut conf).unwrap();
        assert_eq!(conf.cluster.workers, 4);
    }

    #[test]
    fn test_timeout_message_mentions_delete() {
        let err = lifecycle_error(
            "create",
            "demo",
            ProvisionError::ReadinessTimeout {
                cluster: "demo".to_string(),
                timeout: std::time::Duration::from_secs(600),
                last_failure: "etcd: not healthy".to_string(),
            },
        );
        assert!(err.to_string().contains("talos-kube delete -n demo"));
    }
}
