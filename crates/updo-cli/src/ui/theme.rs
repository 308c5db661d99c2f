//! UI Theme - colors and icons shared by every command's output

use crossterm::style::Color;

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
}

/// Color scheme for UI elements
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Application names
    pub app_name: Color,
    /// Resolved tags
    pub tag: Color,
    /// Reasons and timings
    pub secondary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    /// Dry-run prefix
    pub pending: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            app_name: Color::Cyan,
            tag: Color::White,
            secondary: Color::DarkGrey,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            pending: Color::Yellow,
        }
    }
}

/// Status icons
#[derive(Debug, Clone)]
pub struct Icons {
    /// Would change (○)
    pub pending: &'static str,
    /// Changed (✓)
    pub success: &'static str,
    /// Failed (✗)
    pub error: &'static str,
    /// Skipped (⚠)
    pub warning: &'static str,
    /// Resolved (ℹ)
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            pending: "○",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

/// Format a run duration for the summary line.
pub fn format_elapsed(secs: f64) -> String {
    if secs >= 60.0 {
        let whole = secs.floor();
        format!("{}m {:.0}s", (whole / 60.0).floor(), whole % 60.0)
    } else {
        format!("{secs:.1}s")
    }
}
