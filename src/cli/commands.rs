// CLI command definitions

use super::cluster::{
    CreateCommand, DeleteCommand, ListCommand, StartCommand, StatusCommand, StopCommand,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "talos-kube",
    version,
    about = "Local Talos Kubernetes clusters in Docker",
    long_about = "A standalone CLI tool for creating and managing multi-node Talos Linux Kubernetes clusters, one Docker container per node"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create a new cluster (network, node containers, bootstrap, credentials)
    Create(CreateCommand),

    /// Delete a cluster and prune its kubeconfig entries
    Delete(DeleteCommand),

    /// Start the stopped node containers of a cluster
    Start(StartCommand),

    /// Stop the node containers of a cluster
    Stop(StopCommand),

    /// List all clusters
    List(ListCommand),

    /// Show cluster status
    Status(StatusCommand),
}
