//! Terminal output for updo commands

mod output;
mod theme;

pub use output::Output;
pub use theme::{ColorScheme, Icons, Theme, format_elapsed};
