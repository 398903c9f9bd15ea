use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::state_store::{StateStore, StateStoreError};
use crate::types::Team;

/// Shared, lockable team record. Every mutate-then-persist sequence on a
/// team runs while holding this lock, which serializes writes to its
/// `state.json`.
pub type TeamHandle = Arc<Mutex<Team>>;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Team '{0}' not found")]
    NotFound(String),

    #[error("invalid team name '{0}'")]
    InvalidName(String),

    #[error("state store error: {0}")]
    Store(#[from] StateStoreError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// TeamRegistry
// ---------------------------------------------------------------------------

/// In-memory map of team name to team record, backed by a [`StateStore`].
pub struct TeamRegistry {
    store: StateStore,
    teams: DashMap<String, TeamHandle>,
}

impl TeamRegistry {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            teams: DashMap::new(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Reconstruct every persisted team under the storage root.
    ///
    /// Directories without a readable, well-formed `state.json` are logged
    /// and skipped. Returns the number of teams loaded.
    pub async fn load_all(&self) -> Result<usize> {
        let dirs = self.store.team_dirs().await?;
        let mut loaded = 0;
        for dir in dirs {
            match self.store.load(&dir).await {
                Ok(team) => {
                    if dir.file_name().and_then(|n| n.to_str()) != Some(team.name.as_str()) {
                        warn!(
                            dir = %dir.display(),
                            team = %team.name,
                            "team name does not match its directory"
                        );
                    }
                    debug!(team = %team.name, members = team.members.len(), "team loaded");
                    self.teams
                        .insert(team.name.clone(), Arc::new(Mutex::new(team)));
                    loaded += 1;
                }
                Err(StateStoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(dir = %dir.display(), "no state file, skipping");
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to load team state, skipping");
                }
            }
        }
        info!(loaded, root = %self.store.root().display(), "teams loaded");
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<TeamHandle> {
        self.teams.get(name).map(|entry| entry.value().clone())
    }

    /// Like [`get`](Self::get) but unknown names are an error.
    pub fn require(&self, name: &str) -> Result<TeamHandle> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All known teams, in map iteration order.
    pub fn list(&self) -> Vec<TeamHandle> {
        self.teams.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.teams.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Return the existing team or create an empty active one, with its
    /// directory and an initial `state.json` in place, so a new team
    /// survives a restart even if nothing else is ever written.
    pub async fn get_or_create(&self, name: &str) -> Result<TeamHandle> {
        validate_team_name(name)?;
        if let Some(team) = self.get(name) {
            return Ok(team);
        }

        // Two racing creators both reach this point; creating the directory
        // is idempotent and the map entry decides which record wins.
        let dir = self.store.create_team_dir(name).await?;
        let mut created = false;
        let handle = self
            .teams
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Team::new(name, dir.clone())))
            })
            .value()
            .clone();

        if created {
            let guard = handle.lock().await;
            self.persist(&guard).await?;
            info!(team = %name, dir = %dir.display(), "team created");
        }
        Ok(handle)
    }

    /// Drop the in-memory record. Storage is left untouched.
    pub fn remove(&self, name: &str) -> Option<TeamHandle> {
        self.teams.remove(name).map(|(_, team)| team)
    }

    /// Persist a team snapshot. Callers hold the team lock.
    pub async fn persist(&self, team: &Team) -> Result<()> {
        self.store.save(team).await?;
        debug!(team = %team.name, "team state saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Team names double as directory names.
fn validate_team_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", "  ", ".", "..", "a/b", "a\\b"] {
            assert!(
                matches!(validate_team_name(bad), Err(RegistryError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_team_name("feature-x_2").is_ok());
    }

    #[test]
    fn not_found_message_names_the_team() {
        let err = RegistryError::NotFound("ghost".into());
        assert_eq!(err.to_string(), "Team 'ghost' not found");
    }
}
