//! Color theme for CLI output

use comfy_table::Color as TableColor;

/// Color theme for terminal output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: TableColor,
    pub warning: TableColor,
    pub error: TableColor,
    pub info: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: TableColor::Green,
            warning: TableColor::Yellow,
            error: TableColor::Red,
            info: TableColor::Cyan,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    /// Get color based on how many node containers are running
    pub fn get_node_color(&self, running: usize, total: usize) -> TableColor {
        if total == 0 {
            self.muted
        } else if running == total {
            self.success
        } else if running > 0 {
            self.warning
        } else {
            self.error
        }
    }

    /// Get color for a single container state
    pub fn get_state_color(&self, running: bool, failed: bool) -> TableColor {
        if running {
            self.success
        } else if failed {
            self.error
        } else {
            self.muted
        }
    }
}
