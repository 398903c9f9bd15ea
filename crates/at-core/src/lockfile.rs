//! Single-writer lock on a storage root.
//!
//! Every process that mutates team state keeps its own in-memory copy and
//! persists whole snapshots, so two writers on one root would overwrite each
//! other. A writer holds `<root>/.agent-teams.lock` for as long as it may
//! persist; read-only callers never take it.
//!
//! `acquire` creates the file with `create_new`, so of two racing writers
//! exactly one wins. A lock whose PID is no longer running is stale and is
//! removed on the next attempt.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const LOCK_FILE: &str = ".agent-teams.lock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("storage root is in use by pid {} ({})", .0.pid, .0.command)]
    Held(LockOwner),
    #[error("lockfile I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contents of the lockfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    pub pid: u32,
    pub command: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }
}

/// Held lock; removed from disk on drop.
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Take the writer lock on `root`, creating the root if needed.
    /// `command` is recorded so a blocked caller can say who holds it.
    pub fn acquire(root: &Path, command: &str) -> Result<Self, LockError> {
        std::fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILE);
        let owner = LockOwner {
            pid: std::process::id(),
            command: command.to_string(),
            acquired_at: Utc::now(),
        };

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let json = serde_json::to_string_pretty(&owner)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                    file.write_all(json.as_bytes())?;
                    file.sync_all()?;
                    debug!(path = %path.display(), command, "root lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => match read_owner(&path) {
                    Some(existing) if existing.is_alive() => return Err(LockError::Held(existing)),
                    _ => {
                        info!(path = %path.display(), "removing stale root lock");
                        match std::fs::remove_file(&path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }
        // Someone else re-created it between our cleanup and retry.
        match read_owner(&path) {
            Some(existing) => Err(LockError::Held(existing)),
            None => Err(LockError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "lockfile contended",
            ))),
        }
    }

    /// Current holder of the lock on `root`, if any live process has it.
    pub fn owner(root: &Path) -> Option<LockOwner> {
        read_owner(&root.join(LOCK_FILE)).filter(LockOwner::is_alive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_owner(path: &Path) -> Option<LockOwner> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks that the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // Without a liveness check, never treat a lock as stale.
    true
}
