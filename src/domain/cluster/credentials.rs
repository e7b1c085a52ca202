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

//! Writing and pruning the kubeconfig and talosconfig files.

use crate::domain::bundle::TalosConfig;
use crate::infrastructure::constants::CONTEXT_PREFIX;
use crate::shared::error::Result;
use kube::config::Kubeconfig;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Kubeconfig context (and user) name for a cluster.
pub fn context_name(cluster: &str) -> String {
    format!("{}{}", CONTEXT_PREFIX, cluster)
}

/// Point every cluster entry at `https://<endpoint>`.
pub fn rewrite_servers(kubeconfig: &mut Kubeconfig, endpoint: &str) {
    let server = format!("https://{}", endpoint);
    for named in &mut kubeconfig.clusters {
        if let Some(cluster) = named.cluster.as_mut() {
            cluster.server = Some(server.clone());
        }
    }
}

/// Merge the cluster's talosconfig into `path`, keeping unrelated contexts.
pub async fn write_talosconfig(path: &Path, talosconfig: &TalosConfig) -> Result<()> {
    let mut merged = match read_optional(path).await? {
        Some(content) => TalosConfig::from_yaml(&content)?,
        None => TalosConfig::default(),
    };
    merged.merge(talosconfig);

    write_private(path, &merged.to_yaml()?).await?;
    info!(path = %path.display(), "wrote talosconfig");
    Ok(())
}

/// Merge `kubeconfig` into `path`, replacing same-named entries and
/// switching the current context to the new cluster.
pub async fn write_kubeconfig(path: &Path, kubeconfig: &Kubeconfig) -> Result<()> {
    let mut merged = read_kubeconfig(path).await?;

    for cluster in &kubeconfig.clusters {
        merged.clusters.retain(|c| c.name != cluster.name);
        merged.clusters.push(cluster.clone());
    }
    for context in &kubeconfig.contexts {
        merged.contexts.retain(|c| c.name != context.name);
        merged.contexts.push(context.clone());
    }
    for auth_info in &kubeconfig.auth_infos {
        merged.auth_infos.retain(|a| a.name != auth_info.name);
        merged.auth_infos.push(auth_info.clone());
    }
    if kubeconfig.current_context.is_some() {
        merged.current_context = kubeconfig.current_context.clone();
    }
    merged.api_version = Some("v1".to_string());
    merged.kind = Some("Config".to_string());

    write_private(path, &serde_yaml::to_string(&merged)?).await?;
    info!(path = %path.display(), "wrote kubeconfig");
    Ok(())
}

/// Remove the cluster's entries from the kubeconfig at `path`.
///
/// Returns whether anything was removed. A missing file is left alone.
pub async fn prune_kubeconfig(path: &Path, cluster: &str) -> Result<bool> {
    if read_optional(path).await?.is_none() {
        debug!(path = %path.display(), "no kubeconfig to prune");
        return Ok(false);
    }
    let mut kubeconfig = read_kubeconfig(path).await?;
    let context = context_name(cluster);

    let before = kubeconfig.clusters.len() + kubeconfig.contexts.len() + kubeconfig.auth_infos.len();
    kubeconfig
        .clusters
        .retain(|c| c.name != cluster && c.name != context);
    kubeconfig.contexts.retain(|c| c.name != context);
    kubeconfig.auth_infos.retain(|a| a.name != context);
    let after = kubeconfig.clusters.len() + kubeconfig.contexts.len() + kubeconfig.auth_infos.len();

    if kubeconfig.current_context.as_deref() == Some(context.as_str()) {
        kubeconfig.current_context = None;
    }
    if before == after {
        return Ok(false);
    }

    write_private(path, &serde_yaml::to_string(&kubeconfig)?).await?;
    info!(path = %path.display(), context = %context, "pruned kubeconfig entries");
    Ok(true)
}

async fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    match read_optional(path).await? {
        Some(content) if !content.trim().is_empty() => Ok(Kubeconfig::from_yaml(&content)?),
        _ => Ok(Kubeconfig::default()),
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `content` readable by the owner only, creating parent directories.
async fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    // The mode only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
