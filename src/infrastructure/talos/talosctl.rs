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

//! `TalosSdk` backed by the `talosctl` binary.

use super::sdk::{GenerateInput, GeneratedConfig, TalosProbe, TalosSdk};
use crate::domain::bundle::TalosConfig;
use crate::shared::error::{ProvisionError, Result};
use serde_yaml::Value;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;
use tracing::debug;

const CONTROL_PLANE_FILE: &str = "controlplane.yaml";
const WORKER_FILE: &str = "worker.yaml";
const TALOSCONFIG_FILE: &str = "talosconfig";
const ALREADY_BOOTSTRAPPED: &str = "AlreadyExists";
const HEALTHY: &str = "OK";

pub struct TalosCtl {
    binary: PathBuf,
}

impl Default for TalosCtl {
    fn default() -> Self {
        Self::new("talosctl")
    }
}

impl TalosCtl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        let command_line = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %command_line, "running talosctl");

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProvisionError::Talos(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ProvisionError::Talos(format!(
                "talosctl {} failed: {}",
                command_line,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a management API command against `node` through the talosconfig endpoints.
    async fn run_against(
        &self,
        talosconfig: &TalosConfig,
        node: &str,
        command: &[&str],
    ) -> Result<String> {
        let endpoints = talosconfig.endpoints().join(",");
        if endpoints.is_empty() {
            return Err(ProvisionError::Talos(
                "talosconfig has no endpoints".to_string(),
            ));
        }

        let config_file = write_temp_talosconfig(talosconfig)?;
        let mut args: Vec<OsString> = vec![
            "--talosconfig".into(),
            config_file.path().into(),
            "--endpoints".into(),
            endpoints.into(),
            "--nodes".into(),
            node.into(),
        ];
        args.extend(command.iter().map(OsString::from));

        self.run(args).await
    }
}

#[async_trait::async_trait]
impl TalosSdk for TalosCtl {
    async fn generate_config(&self, input: &GenerateInput) -> Result<GeneratedConfig> {
        let out_dir = TempDir::new()?;
        let mut args: Vec<OsString> = vec![
            "gen".into(),
            "config".into(),
            input.cluster_name.as_str().into(),
            input.endpoint.as_str().into(),
            "--kubernetes-version".into(),
            input.kubernetes_version.as_str().into(),
            "--with-docs=false".into(),
            "--with-examples=false".into(),
            "--output".into(),
            out_dir.path().into(),
        ];
        for san in &input.additional_sans {
            args.push("--additional-sans".into());
            args.push(san.as_str().into());
        }
        self.run(args).await?;

        let control_plane = read_document(&out_dir.path().join(CONTROL_PLANE_FILE))?;
        let worker = read_document(&out_dir.path().join(WORKER_FILE))?;
        let mut talosconfig =
            TalosConfig::from_yaml(&read_file(&out_dir.path().join(TALOSCONFIG_FILE))?)?;
        talosconfig.set_endpoints(input.endpoints.clone())?;

        Ok(GeneratedConfig {
            control_plane,
            worker,
            talosconfig,
        })
    }

    async fn bootstrap(&self, talosconfig: &TalosConfig, node: &str) -> Result<()> {
        match self.run_against(talosconfig, node, &["bootstrap"]).await {
            Ok(_) => Ok(()),
            Err(ProvisionError::Talos(msg)) if msg.contains(ALREADY_BOOTSTRAPPED) => {
                debug!(node, "etcd already bootstrapped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn kubeconfig(&self, talosconfig: &TalosConfig, node: &str) -> Result<String> {
        // "-" streams the kubeconfig to stdout instead of merging into ~/.kube/config.
        self.run_against(talosconfig, node, &["kubeconfig", "-"])
            .await
    }

    async fn check(&self, talosconfig: &TalosConfig, node: &str, probe: TalosProbe) -> Result<()> {
        match probe {
            TalosProbe::Apid => {
                self.run_against(talosconfig, node, &["version"]).await?;
                Ok(())
            }
            TalosProbe::Etcd | TalosProbe::Kubelet => {
                let service = probe.to_string();
                let output = self
                    .run_against(talosconfig, node, &["service", service.as_str()])
                    .await?;
                match service_health(&output) {
                    Some(HEALTHY) => Ok(()),
                    health => Err(ProvisionError::Talos(format!(
                        "{} health is {}",
                        service,
                        health.unwrap_or("unknown")
                    ))),
                }
            }
        }
    }
}

fn write_temp_talosconfig(talosconfig: &TalosConfig) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(talosconfig.to_yaml()?.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ProvisionError::Talos(format!("failed to read {}: {}", path.display(), e))
    })
}

fn read_document(path: &Path) -> Result<Value> {
    Ok(serde_yaml::from_str(&read_file(path)?)?)
}

/// Extract the `HEALTH` column from `talosctl service <id>` output.
fn service_health(output: &str) -> Option<&str> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("HEALTH") => fields.next(),
            _ => None,
        }
    })
}
