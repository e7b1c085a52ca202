//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::cluster::{ClusterStatus, NodeRole};
use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, ContentArrangement, Table};

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    /// Create a new table renderer with default theme
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    fn status_color(status: &str) -> Color {
        match status {
            "Running" => Color::Green,
            "Degraded" => Color::Yellow,
            "Failed" => Color::Red,
            _ => Color::DarkGrey,
        }
    }

    /// Render clusters list as a formatted table
    pub fn render_clusters_list(&self, clusters: &[ClusterStatus], now: DateTime<Utc>) -> String {
        if clusters.is_empty() {
            return "No Talos clusters found".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("CLUSTER").set_alignment(CellAlignment::Left),
                Cell::new("CONTROL PLANES").set_alignment(CellAlignment::Center),
                Cell::new("WORKERS").set_alignment(CellAlignment::Center),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("AGE").set_alignment(CellAlignment::Right),
            ]);

        for cluster in clusters {
            let (cp_running, cp_total) = cluster.count(NodeRole::ControlPlane);
            let (worker_running, worker_total) = cluster.count(NodeRole::Worker);
            let status =
                StatusIcon::get_status_text(cluster.running(), cluster.failed(), cluster.nodes.len());

            table.add_row(vec![
                Cell::new(&cluster.name),
                Cell::new(format!(
                    "{} {}/{}",
                    StatusIcon::get_node_icon(cp_running, cp_total),
                    cp_running,
                    cp_total
                ))
                .fg(self.theme.get_node_color(cp_running, cp_total)),
                Cell::new(format!(
                    "{} {}/{}",
                    StatusIcon::get_node_icon(worker_running, worker_total),
                    worker_running,
                    worker_total
                ))
                .fg(self.theme.get_node_color(worker_running, worker_total)),
                Cell::new(format!("{} {}", StatusIcon::get_status_icon(status), status))
                    .fg(Self::status_color(status)),
                Cell::new(format_age(cluster.created, now)).fg(self.theme.muted),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Talos Clusters {} ─╮\n",
            format!("[{} clusters]", clusters.len()).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Legend: {} Running  {} Degraded  {} Failed  {} Stopped\n",
            StatusIcon::SUCCESS.green(),
            StatusIcon::WARNING.yellow(),
            StatusIcon::ERROR.red(),
            StatusIcon::STOPPED.bright_black()
        ));

        output
    }

    /// Render one cluster's node containers
    pub fn render_cluster_status(&self, cluster: &ClusterStatus, now: DateTime<Utc>) -> String {
        let status =
            StatusIcon::get_status_text(cluster.running(), cluster.failed(), cluster.nodes.len());

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("NODE").set_alignment(CellAlignment::Left),
                Cell::new("ROLE").set_alignment(CellAlignment::Left),
                Cell::new("STATE").set_alignment(CellAlignment::Center),
                Cell::new("STATUS").set_alignment(CellAlignment::Left),
            ]);

        for node in &cluster.nodes {
            let role = node
                .role
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            table.add_row(vec![
                Cell::new(&node.name),
                Cell::new(role),
                Cell::new(node.state.to_string()).fg(self
                    .theme
                    .get_state_color(node.state.is_running(), node.state.is_failed())),
                Cell::new(&node.status).fg(self.theme.info),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "📊 Cluster: {} | Status: {} | Age: {}\n",
            cluster.name,
            format!("{} {}", StatusIcon::get_status_icon(status), status),
            format_age(cluster.created, now)
        ));
        output.push_str(&table.to_string());
        output
    }
}

/// Compact age such as `45s`, `12m`, `3h` or `2d`.
pub fn format_age(created: Option<i64>, now: DateTime<Utc>) -> String {
    let Some(created) = created.and_then(|ts| DateTime::from_timestamp(ts, 0)) else {
        return "-".to_string();
    };
    let secs = (now - created).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}
