//! Loading and persisting incremental run indices.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use updo_schema::{IndexFile, IndexMode};

use crate::paths::index_path;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("strict indexing is enabled but {0} does not exist")]
    Missing(PathBuf),

    #[error("failed to read index {0}: {1}")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to parse index {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("failed to write index {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
}

/// The index file of one mode under the managed root.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
    strict: bool,
}

impl IndexStore {
    pub fn new(root: &Path, mode: IndexMode, strict: bool) -> Self {
        Self {
            path: index_path(root, mode),
            strict,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the index left by a previous dry run.
    ///
    /// `None` means "process everything". In strict mode a missing file is an error.
    pub fn load(&self) -> Result<Option<IndexFile>, IndexError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.strict {
                    return Err(IndexError::Missing(self.path.clone()));
                }
                debug!(index = %self.path.display(), "no index, processing everything");
                return Ok(None);
            }
            Err(e) => return Err(IndexError::Read(self.path.clone(), e)),
        };
        let index = serde_json::from_str(&raw).map_err(|e| IndexError::Parse(self.path.clone(), e))?;
        Ok(Some(index))
    }

    pub fn write(&self, index: &IndexFile) -> Result<(), IndexError> {
        let json = serde_json::to_string_pretty(index).map_err(|e| IndexError::Write(self.path.clone(), io::Error::other(e)))?;
        std::fs::write(&self.path, json).map_err(|e| IndexError::Write(self.path.clone(), e))?;
        info!(index = %self.path.display(), names = index.names.len(), dirs = index.dirs.len(), "index written");
        Ok(())
    }

    /// Delete the index; a missing file is not an error.
    pub fn remove(&self) -> Result<(), IndexError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(index = %self.path.display(), "index removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::Write(self.path.clone(), e)),
        }
    }
}
