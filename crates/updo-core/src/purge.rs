//! Stale release and orphan directory removal.
//!
//! Both passes only compute candidates; what happens to each one is decided by
//! the caller, which is how dry runs stay read-only.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::resource::PlacedResource;

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("invalid pinned regex '{pattern}': {source}")]
    InvalidPinned {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("refusing to purge: current release {} has never been deployed", .unpack.display())]
    Undeployed { unpack: PathBuf },

    #[error("failed to scan {0}: {1}")]
    Scan(PathBuf, #[source] io::Error),

    #[error("failed to remove {0}: {1}")]
    Remove(PathBuf, #[source] io::Error),
}

/// Name patterns that are never purged.
#[derive(Debug, Clone, Default)]
pub struct PinnedNames {
    patterns: Vec<Regex>,
}

impl PinnedNames {
    pub fn new(patterns: &[String]) -> Result<Self, PurgeError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| PurgeError::InvalidPinned {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Entries of `work_dir` that belong to neither the current release nor a pinned pattern.
///
/// Fails with [`PurgeError::Undeployed`] when there is something to purge but
/// the current release has not been unpacked yet.
pub fn stale_entries(
    work_dir: &Path,
    current: &PlacedResource,
    pinned: &PinnedNames,
) -> Result<Vec<PathBuf>, PurgeError> {
    let keep: BTreeSet<String> = current.owned_names().into_iter().collect();
    let candidates = scan(work_dir, |name, _| !keep.contains(name) && !pinned.matches(name))?;

    if !candidates.is_empty() && !current.is_unpacked() {
        return Err(PurgeError::Undeployed {
            unpack: current.unpack.clone(),
        });
    }
    Ok(candidates)
}

/// Hand every stale entry of `work_dir` to `decide`, returning the entries.
pub fn purge_with<F>(
    work_dir: &Path,
    current: &PlacedResource,
    pinned: &PinnedNames,
    mut decide: F,
) -> Result<Vec<PathBuf>, PurgeError>
where
    F: FnMut(&Path) -> Result<(), PurgeError>,
{
    let stale = stale_entries(work_dir, current, pinned)?;
    for path in &stale {
        decide(path)?;
    }
    Ok(stale)
}

/// Directories under `root` that no configured application owns.
///
/// Hidden entries (the lock and index files live there) are never candidates.
pub fn orphan_dirs(
    root: &Path,
    owners: &BTreeSet<String>,
    pinned: &PinnedNames,
) -> Result<Vec<PathBuf>, PurgeError> {
    scan(root, |name, is_dir| {
        is_dir && !name.starts_with('.') && !owners.contains(name) && !pinned.matches(name)
    })
}

fn scan<F>(dir: &Path, mut keep_candidate: F) -> Result<Vec<PathBuf>, PurgeError>
where
    F: FnMut(&str, bool) -> bool,
{
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PurgeError::Scan(dir.to_path_buf(), e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PurgeError::Scan(dir.to_path_buf(), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if keep_candidate(&name, is_dir) {
            debug!(path = %entry.path().display(), "purge candidate");
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Delete a file or directory tree.
pub fn remove_path(path: &Path) -> Result<(), PurgeError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| PurgeError::Remove(path.to_path_buf(), e))
}
