//! Reporter trait for dependency injection
//!
//! This trait allows the orchestrator to report progress and status without
//! being coupled to a specific terminal implementation.

use updo_schema::Change;

pub trait Reporter: Send + Sync {
    /// An application's upstream resolved to `tag`.
    fn resolved(&self, name: &str, tag: &str);

    /// A change was observed (or, in a dry run, would be made).
    fn change(&self, change: &Change, dry_run: bool);

    /// An application was not processed this run.
    fn skipped(&self, name: &str, reason: &str);

    /// An application failed.
    fn failed(&self, name: &str, reason: &str);

    /// Display a final summary.
    fn summary(&self, changes: usize, dry_run: bool, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn resolved(&self, name: &str, tag: &str) {
        (**self).resolved(name, tag)
    }
    fn change(&self, change: &Change, dry_run: bool) {
        (**self).change(change, dry_run)
    }
    fn skipped(&self, name: &str, reason: &str) {
        (**self).skipped(name, reason)
    }
    fn failed(&self, name: &str, reason: &str) {
        (**self).failed(name, reason)
    }
    fn summary(&self, changes: usize, dry_run: bool, elapsed_secs: f64) {
        (**self).summary(changes, dry_run, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn resolved(&self, _: &str, _: &str) {}
    fn change(&self, _: &Change, _: bool) {}
    fn skipped(&self, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str) {}
    fn summary(&self, _: usize, _: bool, _: f64) {}
}
