//! Command implementations

pub mod completions;
pub mod purge;
pub mod run;
pub mod upgrade;
pub mod version;
