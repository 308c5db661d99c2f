//! Single-instance PID lock for the managed root.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::lock_path;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another updo process (PID {pid}) holds the lock\n\
         If you're sure no updo process is running, remove the lock file:\n  {lock_path}"
    )]
    Held { pid: u32, lock_path: PathBuf },

    #[error(
        "lock file holds no PID\n\
         If you're sure no updo process is running, remove the lock file:\n  {lock_path}"
    )]
    Unreadable { lock_path: PathBuf },

    #[error("failed to create {0}: {1}")]
    CreateDir(PathBuf, #[source] io::Error),

    #[error("failed to write lock file {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
}

/// Held for the duration of a run; the lock file is removed on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Take the lock under `root`, reclaiming it if the recorded process is gone.
    ///
    /// The PID is written to a private file first and hard-linked into place,
    /// so the lock file never exists without its PID. A lock file whose
    /// content is not a PID is therefore never reclaimed.
    pub fn acquire(root: &Path) -> Result<Self, LockError> {
        let path = lock_path(root);
        fs::create_dir_all(root).map_err(|e| LockError::CreateDir(root.to_path_buf(), e))?;

        let mut staging = path.as_os_str().to_owned();
        staging.push(format!(".{}", std::process::id()));
        let staging = PathBuf::from(staging);
        let result = write_pid(&staging)
            .map_err(|e| LockError::Write(staging.clone(), e))
            .and_then(|()| link_into_place(&staging, &path));
        let _ = fs::remove_file(&staging);
        result?;

        debug!(lock = %path.display(), "lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_pid(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    write!(file, "{}", std::process::id())?;
    file.sync_all()
}

fn link_into_place(staging: &Path, path: &Path) -> Result<(), LockError> {
    for _ in 0..2 {
        match fs::hard_link(staging, path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match read_holder(path) {
                Some(pid) if process_alive(pid) => {
                    return Err(LockError::Held {
                        pid,
                        lock_path: path.to_path_buf(),
                    });
                }
                Some(pid) => {
                    warn!(lock = %path.display(), pid, "reclaiming stale lock");
                    let _ = fs::remove_file(path);
                }
                None => {
                    return Err(LockError::Unreadable {
                        lock_path: path.to_path_buf(),
                    });
                }
            },
            Err(e) => return Err(LockError::Write(path.to_path_buf(), e)),
        }
    }

    // Lost a race with another process reclaiming the same stale lock.
    match read_holder(path) {
        Some(pid) => Err(LockError::Held {
            pid,
            lock_path: path.to_path_buf(),
        }),
        None => Err(LockError::Unreadable {
            lock_path: path.to_path_buf(),
        }),
    }
}

fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "failed to remove lock file: {e}");
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id()
}
