//! Shared data model for updo.
//!
//! Everything here is plain data: the validated configuration handed to the
//! engine, the change records it produces and the index it persists between
//! runs. No I/O happens in this crate.

pub mod arch;
pub mod index;
pub mod types;

// Re-exports
pub use arch::*;
pub use index::{IndexFile, IndexMode};
pub use types::*;

/// Program name used for lock and index file names.
pub const APP_NAME: &str = "updo";
