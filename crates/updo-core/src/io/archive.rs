//! Archive kind detection, member listing and the depth-stripping heuristic.
//!
//! Releases are frequently wrapped in a single top-level directory
//! (`tool-1.2.3/bin/tool`). When every path-bearing member shares exactly one
//! leading segment, that segment is stripped on extraction so the unpack
//! directory holds the payload directly. Archives that are not wrapped are
//! left alone.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;

use crate::backend::{BackendError, Retriever};

/// Flag appended to `tar` invocations when stripping.
pub const TAR_STRIP_FLAG: &str = "--strip-components=1";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Archive formats recognised by file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Uncompressed tar archive (`.tar`).
    Tar,
    /// Gzip-compressed tar archive (`.tar.gz`, `.tgz`).
    TarGz,
    /// XZ-compressed tar archive (`.tar.xz`, `.txz`).
    TarXz,
    /// Bzip2-compressed tar archive (`.tar.bz2`, `.tbz2`, `.tbz`).
    TarBz2,
    /// Zip archive (`.zip`).
    Zip,
}

impl ArchiveKind {
    /// Detect the archive kind from a file name (case-insensitive).
    #[allow(clippy::case_sensitive_file_extension_comparisons)]
    pub fn detect(file: &str) -> Option<Self> {
        let f = file.to_lowercase();
        if f.ends_with(".tar.gz") || f.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if f.ends_with(".tar.xz") || f.ends_with(".txz") {
            Some(Self::TarXz)
        } else if f.ends_with(".tar.bz2") || f.ends_with(".tbz2") || f.ends_with(".tbz") {
            Some(Self::TarBz2)
        } else if f.ends_with(".tar") {
            Some(Self::Tar)
        } else if f.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    pub fn is_tar(self) -> bool {
        !matches!(self, Self::Zip)
    }

    /// Extraction command template for this kind.
    pub fn default_command(self) -> Vec<String> {
        let argv: &[&str] = if self.is_tar() {
            &["tar", "-xf", "{{ input }}", "-C", "{{ output }}"]
        } else {
            &["unzip", "-q", "-o", "{{ input }}", "-d", "{{ output }}"]
        };
        argv.iter().map(ToString::to_string).collect()
    }
}

/// Whether all path-bearing entries share exactly one top-level segment.
///
/// Entries without a `/` carry no directory information and are ignored.
pub fn needs_strip<S: AsRef<str>>(entries: &[S]) -> bool {
    let tops: BTreeSet<&str> = entries
        .iter()
        .filter_map(|e| e.as_ref().trim().split_once('/').map(|(top, _)| top))
        .collect();
    tops.len() == 1
}

/// List member paths of an archive.
///
/// Plain and gzip tarballs and zips are read in-process; other tar variants
/// are listed with `tar -tf` through the retriever.
pub async fn list_entries(
    kind: ArchiveKind,
    path: &Path,
    retriever: &dyn Retriever,
) -> Result<Vec<String>, ArchiveError> {
    match kind {
        ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::Zip => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || list_local(kind, &path))
                .await
                .map_err(|e| ArchiveError::Archive(e.to_string()))?
        }
        ArchiveKind::TarXz | ArchiveKind::TarBz2 => {
            let args = vec!["-tf".to_string(), path.to_string_lossy().to_string()];
            let out = retriever.output("tar", &args).await?;
            Ok(String::from_utf8_lossy(&out)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(ToString::to_string)
                .collect())
        }
    }
}

fn list_local(kind: ArchiveKind, path: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(path)?;
    match kind {
        ArchiveKind::Tar => list_tar(BufReader::new(file)),
        ArchiveKind::TarGz => list_tar(flate2::read::GzDecoder::new(BufReader::new(file))),
        ArchiveKind::Zip => {
            let archive =
                ZipArchive::new(file).map_err(|e| ArchiveError::Archive(e.to_string()))?;
            Ok(archive.file_names().map(ToString::to_string).collect())
        }
        ArchiveKind::TarXz | ArchiveKind::TarBz2 => Err(ArchiveError::Archive(format!(
            "{} cannot be listed in-process",
            path.display()
        ))),
    }
}

fn list_tar<R: Read>(reader: R) -> Result<Vec<String>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().to_string());
    }
    Ok(names)
}

/// Move the contents of a single top-level directory up into `dir`.
///
/// Used for formats whose extractor has no strip option, and unpacks the same
/// tree `tar --strip-components=1` would: top-level files are dropped. Does
/// nothing unless `dir` holds exactly one directory.
pub fn hoist_single_root(dir: &Path) -> io::Result<()> {
    let mut roots = Vec::new();
    let mut loose = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            roots.push(entry.path());
        } else {
            loose.push(entry.path());
        }
    }
    let [root] = roots.as_slice() else {
        return Ok(());
    };
    for path in loose {
        fs::remove_file(path)?;
    }

    // Rename first so a child sharing the root's name cannot collide with it.
    let staging: PathBuf = dir.join(".updo-hoist");
    fs::rename(root, &staging)?;
    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(staging)
}
