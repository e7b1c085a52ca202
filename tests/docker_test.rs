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

//! Tests against a real Docker daemon and talosctl. Run with `cargo xtask test --docker`.

#[cfg(test)]
mod tests {
    use talos_kube::infrastructure::docker::{owned_labels, ContainerRuntime, DockerRuntime};
    use talos_kube::{ProvisionerConfig, TalosProvisioner};
    use tokio_util::sync::CancellationToken;

    fn docker_config(state_dir: &std::path::Path) -> ProvisionerConfig {
        let mut conf = ProvisionerConfig::default();
        conf.cluster.name = "talos-kube-it".to_string();
        conf.network.cidr = "10.213.0.0/24".to_string();
        conf.output.state_dir = state_dir.display().to_string();
        conf
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_ping() {
        let runtime = DockerRuntime::connect().unwrap();
        runtime.ping().await.unwrap();
        runtime.list_containers(&owned_labels()).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Docker and talosctl
    async fn test_create_and_delete_without_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = TalosProvisioner::new(docker_config(dir.path())).unwrap();
        let cancel = CancellationToken::new();

        let info = provisioner.create("talos-kube-it", &cancel).await.unwrap();
        assert_eq!(info.nodes.len(), 1);
        assert!(provisioner.exists("talos-kube-it").await.unwrap());

        let status = provisioner.get_cluster_status("talos-kube-it").await.unwrap();
        assert_eq!(status.nodes.len(), 1);

        provisioner.delete("talos-kube-it", &cancel).await.unwrap();
        assert!(!provisioner.exists("talos-kube-it").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Docker and talosctl, takes several minutes
    async fn test_full_cluster_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = docker_config(dir.path());
        conf.cluster.workers = 1;
        conf.output.kubeconfig = Some(dir.path().join("kubeconfig").display().to_string());
        conf.output.talosconfig = Some(dir.path().join("talosconfig").display().to_string());
        let provisioner = TalosProvisioner::new(conf).unwrap();
        let cancel = CancellationToken::new();

        let result = provisioner.create("talos-kube-it", &cancel).await;
        let cleanup = provisioner.delete("talos-kube-it", &cancel).await;

        result.unwrap();
        cleanup.unwrap();
        assert!(dir.path().join("talosconfig").exists());
    }
}
