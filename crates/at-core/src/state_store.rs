use std::path::{Path, PathBuf};

use tracing::warn;

use crate::types::Team;

/// File name of a team's persisted snapshot inside its directory.
pub const STATE_FILE: &str = "state.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateStoreError>;

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encode a team into its on-disk form.
///
/// Process handles and the storage directory are never written; timestamps
/// become RFC 3339 strings and results an ordered list of `[key, value]`.
pub fn encode(team: &Team) -> Result<String> {
    Ok(serde_json::to_string_pretty(team)?)
}

/// Decode a persisted team. `config_dir` is the directory the state was read
/// from; every member comes back without a live process, and a team caught
/// mid-shutdown comes back `shutdown`.
pub fn decode(data: &str, config_dir: impl Into<PathBuf>) -> Result<Team> {
    let mut team: Team = serde_json::from_str(data)?;
    team.config_dir = config_dir.into();
    // Nothing is driving a shutdown that was interrupted by a restart.
    team.status = team.status.durable();
    for member in &mut team.members {
        member.process = None;
    }
    Ok(team)
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// File-system-backed team persistence.
///
/// Layout: `<root>/<team>/state.json` plus one `<member>.session` file per
/// member, owned by the worker process itself.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a given team name.
    pub fn team_dir(&self, team_name: &str) -> PathBuf {
        self.root.join(team_name)
    }

    /// Session file handed to a member's worker process.
    pub fn session_path(team_dir: &Path, member_name: &str) -> PathBuf {
        team_dir.join(format!("{member_name}.session"))
    }

    /// Ensure the root directory exists.
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Materialize a team's directory and return its path.
    pub async fn create_team_dir(&self, team_name: &str) -> Result<PathBuf> {
        let dir = self.team_dir(team_name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Save a team snapshot into its `config_dir`.
    ///
    /// The snapshot goes to a temporary file first and is renamed over
    /// `state.json`, so readers never observe a half-written file.
    pub async fn save(&self, team: &Team) -> Result<()> {
        let json = encode(team)?;
        let path = team.config_dir.join(STATE_FILE);
        let tmp = team.config_dir.join(format!("{STATE_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load the team persisted in `dir`.
    pub async fn load(&self, dir: &Path) -> Result<Team> {
        let data = tokio::fs::read_to_string(dir.join(STATE_FILE)).await?;
        decode(&data, dir)
    }

    /// Every subdirectory of the root (symlinks followed), in no particular
    /// order.
    ///
    /// Only failing to open the root is an error. An entry that cannot be
    /// inspected is logged and skipped, and a failed read stops the scan
    /// with whatever was found so far.
    pub async fn team_dirs(&self) -> Result<Vec<PathBuf>> {
        self.ensure_root().await?;
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "storage root scan interrupted");
                    break;
                }
            };
            let path = entry.path();
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => dirs.push(path),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable entry"),
            }
        }
        Ok(dirs)
    }

    /// Remove a team directory. Returns `true` if something was removed.
    pub async fn remove_team_dir(&self, dir: &Path) -> Result<bool> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
