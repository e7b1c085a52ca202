//! Status icons for CLI output

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    /// Success icon (all nodes running)
    pub const SUCCESS: &'static str = "✓";

    /// Warning icon (some nodes running)
    pub const WARNING: &'static str = "⚠";

    /// Error icon (no nodes running)
    pub const ERROR: &'static str = "✗";

    /// Stopped icon
    pub const STOPPED: &'static str = "■";

    /// Unknown icon
    pub const UNKNOWN: &'static str = "?";

    /// Get status icon based on running/total nodes
    pub fn get_node_icon(running: usize, total: usize) -> &'static str {
        if total == 0 {
            Self::UNKNOWN
        } else if running == total {
            Self::SUCCESS
        } else if running > 0 {
            Self::WARNING
        } else {
            Self::ERROR
        }
    }

    /// Get cluster status text from running, failed and total node counts
    pub fn get_status_text(running: usize, failed: usize, total: usize) -> &'static str {
        if total == 0 {
            "Unknown"
        } else if running == total {
            "Running"
        } else if running > 0 {
            "Degraded"
        } else if failed > 0 {
            "Failed"
        } else {
            "Stopped"
        }
    }

    pub fn get_status_icon(status: &str) -> &'static str {
        match status {
            "Running" => Self::SUCCESS,
            "Degraded" => Self::WARNING,
            "Failed" => Self::ERROR,
            "Stopped" => Self::STOPPED,
            _ => Self::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_node_icon() {
        assert_eq!(StatusIcon::get_node_icon(3, 3), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::get_node_icon(2, 3), StatusIcon::WARNING);
        assert_eq!(StatusIcon::get_node_icon(0, 3), StatusIcon::ERROR);
        assert_eq!(StatusIcon::get_node_icon(0, 0), StatusIcon::UNKNOWN);
    }

    #[test]
    fn test_get_status_text() {
        assert_eq!(StatusIcon::get_status_text(3, 0, 3), "Running");
        assert_eq!(StatusIcon::get_status_text(2, 1, 3), "Degraded");
        assert_eq!(StatusIcon::get_status_text(0, 1, 3), "Failed");
        assert_eq!(StatusIcon::get_status_text(0, 0, 3), "Stopped");
        assert_eq!(StatusIcon::get_status_text(0, 0, 0), "Unknown");
    }

    #[test]
    fn test_get_status_icon() {
        assert_eq!(StatusIcon::get_status_icon("Stopped"), StatusIcon::STOPPED);
        assert_eq!(StatusIcon::get_status_icon("Running"), StatusIcon::SUCCESS);
    }
}
