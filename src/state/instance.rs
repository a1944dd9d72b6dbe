//! Single-instance guard
//!
//! The supervisor records its PID in `<state_dir>/supervisor.pid` and holds an
//! exclusive `flock` on that file for as long as it runs. The kernel drops the
//! lock when the process exits, so a leftover marker from a crashed supervisor
//! is simply reclaimed by the next one. The PID inside is informational.

use crate::error::{ControlError, Result, VigilError};
use crate::process::{self, Termination};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Held while this process owns the instance marker; released on drop
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
    pid: u32,
    file: Option<File>,
}

impl InstanceGuard {
    /// Claim the marker at `path` for the current process.
    ///
    /// Fails with `AlreadyRunning` while another guard holds the lock,
    /// including one held by this process.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pid = std::process::id();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // A releasing owner unlinks the marker; retry on the fresh inode
        for _ in 0..3 {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;

            if !try_lock_exclusive(&file)? {
                return Err(match process::read_pid_file(&path)? {
                    Some(Some(existing)) => VigilError::AlreadyRunning { pid: existing },
                    _ => VigilError::Internal(format!(
                        "instance marker {} is locked by another process",
                        path.display()
                    )),
                });
            }

            if !is_same_file(&file, &path)? {
                debug!("Instance marker {} was replaced, retrying", path.display());
                continue;
            }

            let mut previous = String::new();
            file.read_to_string(&mut previous)?;
            if let Some(stale) = process::parse_pid(&previous) {
                warn!(
                    "Replacing stale instance marker {} (PID: {})",
                    path.display(),
                    stale
                );
            }

            file.set_len(0)?;
            file.rewind()?;
            writeln!(file, "{}", pid)?;
            file.sync_all()?;

            info!("Acquired instance marker {} (PID: {})", path.display(), pid);
            return Ok(Self {
                path,
                pid,
                file: Some(file),
            });
        }

        Err(VigilError::Internal(format!(
            "could not claim instance marker {}",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the marker and drop the lock
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        // Unlink while still locked so a waiting claimant never sees our PID
        match is_same_file(&file, &self.path) {
            Ok(true) => {
                process::remove_pid_file(&self.path);
                debug!("Released instance marker {}", self.path.display());
            }
            Ok(false) => {
                warn!(
                    "Instance marker {} no longer ours, leaving it",
                    self.path.display()
                );
            }
            Err(e) => warn!("Failed to inspect instance marker {}: {}", self.path.display(), e),
        }
        drop(file);
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether the open `file` is still the one linked at `path`
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> std::io::Result<bool> {
    Ok(path.exists())
}

/// Non-blocking exclusive lock; `Ok(false)` when someone else holds it
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(e) if e == Errno::EWOULDBLOCK => Ok(false),
        Err(e) => Err(std::io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

/// PID of the live supervisor recorded at `path`, if any
pub fn read_instance(path: &Path) -> Option<u32> {
    match process::read_pid_file(path) {
        Ok(Some(Some(pid))) if process::is_process_alive(pid) => Some(pid),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read instance marker {}: {}", path.display(), e);
            None
        }
    }
}

/// Signal the supervisor recorded at `path` and remove its marker
pub async fn stop_instance(path: &Path, grace: Duration, force: bool) -> Result<(u32, Termination)> {
    let pid = match process::read_pid_file(path)? {
        Some(Some(pid)) => pid,
        Some(None) => {
            process::remove_pid_file(path);
            return Err(VigilError::NotRunning);
        }
        None => return Err(VigilError::NotRunning),
    };

    if !process::is_process_alive(pid) {
        process::remove_pid_file(path);
        return Err(VigilError::NotRunning);
    }

    let outcome = process::terminate(pid, grace, force)
        .await
        .map_err(|reason| ControlError::Signal { pid, reason })?;

    process::remove_pid_file(path);
    Ok((pid, outcome))
}
