//! Persisted incremental run state.
//!
//! A dry run that observes changes records them here so the following
//! committing run only touches what the dry run predicted.

use serde::{Deserialize, Serialize};

/// Which pipeline an index file belongs to. Each mode has its own file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexMode {
    /// `upgrade` runs.
    Update,
    /// `purge` runs.
    Purge,
}

impl IndexMode {
    /// Lowercase mode name used in file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Purge => "purge",
        }
    }

    /// File name of the index for `app`: `.{app}.{mode}.index`.
    pub fn file_name(self, app: &str) -> String {
        format!(".{app}.{}.index", self.as_str())
    }
}

impl std::fmt::Display for IndexMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names and directories touched by a previous dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    /// Application names with observed changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    /// Managed-root directories that would be cleaned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirs: Vec<String>,
}

impl IndexFile {
    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.dirs.is_empty()
    }

    /// Whether `name` was recorded as a touched application.
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Whether `dir` was recorded as a touched directory.
    pub fn contains_dir(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }
}
