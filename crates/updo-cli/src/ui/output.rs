//! Line-oriented progress output.
//!
//! [`Output`] is the terminal [`Reporter`] handed to the orchestrator. Workers
//! call it concurrently, so every event is written as one whole line under the
//! stdout lock. Failures go to stderr.

use std::io::Write;

use crossterm::style::Stylize;
use updo_core::Reporter;
use updo_schema::Change;

use super::theme::{Theme, format_elapsed};

#[derive(Debug, Clone, Default)]
pub struct Output {
    theme: Theme,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints a hint in the secondary color.
    pub fn hint(&self, msg: &str) {
        self.line(&format!("{}", msg.with(self.theme.colors.secondary)));
    }

    /// Prints an error message to stderr.
    pub fn error(&self, msg: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error);
        let _ = writeln!(std::io::stderr().lock(), "{icon} {}", msg.with(self.theme.colors.error));
    }

    fn line(&self, text: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{text}");
    }

    fn name(&self, name: &str) -> String {
        format!("{}", name.with(self.theme.colors.app_name).bold())
    }
}

impl Reporter for Output {
    fn resolved(&self, name: &str, tag: &str) {
        tracing::info!(app = name, tag, "resolved");
    }

    fn change(&self, change: &Change, dry_run: bool) {
        let (icon, color, prefix) = if dry_run {
            (self.theme.icons.pending, self.theme.colors.pending, "would ")
        } else {
            (self.theme.icons.success, self.theme.colors.success, "")
        };
        self.line(&format!(
            "{} {} {}{}",
            icon.with(color),
            self.name(&change.name),
            prefix,
            change.detail.as_str().with(self.theme.colors.tag)
        ));
    }

    fn skipped(&self, name: &str, reason: &str) {
        self.line(&format!(
            "{} {} {}",
            self.theme.icons.warning.with(self.theme.colors.warning),
            self.name(name),
            format!("skipped ({reason})").with(self.theme.colors.secondary)
        ));
    }

    fn failed(&self, name: &str, reason: &str) {
        let _ = writeln!(
            std::io::stderr().lock(),
            "{} {} {}",
            self.theme.icons.error.with(self.theme.colors.error),
            self.name(name),
            reason.with(self.theme.colors.error)
        );
    }

    fn summary(&self, changes: usize, dry_run: bool, elapsed_secs: f64) {
        let verb = if dry_run { "pending" } else { "applied" };
        let noun = if changes == 1 { "change" } else { "changes" };
        self.line(&format!(
            "{} {changes} {noun} {verb} {}",
            self.theme.icons.info.with(self.theme.colors.secondary),
            format!("in {}", format_elapsed(elapsed_secs)).with(self.theme.colors.secondary)
        ));
    }
}
