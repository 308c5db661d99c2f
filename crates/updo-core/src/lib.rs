//! Resolution and update engine behind the `updo` command.
//!
//! Fetch strategies turn an application's upstream into a [`resource::Resource`],
//! and the [`orchestrator::Orchestrator`] drives downloads, extraction,
//! build/deploy steps and purging across all configured applications.

pub mod backend;
pub mod config;
pub mod fetch;
pub mod filter;
pub mod index;
pub mod io;
pub mod lock;
pub mod orchestrator;
pub mod paths;
pub mod purge;
pub mod reporter;
pub mod resource;
pub mod steps;
pub mod template;

pub use backend::{HttpRetriever, ProcessRunner, Retriever, StepRunner};
pub use fetch::Strategy;
pub use orchestrator::{Mode, Orchestrator, RunError, RunReport};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("updo-core/", env!("CARGO_PKG_VERSION"));
