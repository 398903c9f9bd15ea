use std::sync::Arc;

use at_core::config::ShutdownConfig;
use at_core::registry::{RegistryError, TeamRegistry};
use at_core::types::TeamStatus;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::AgentMessage;

// ---------------------------------------------------------------------------
// Error / report
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("protocol encoding error: {0}")]
    Protocol(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShutdownError>;

/// Outcome of one shutdown pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Members that were alive when the shutdown request went out.
    pub signalled: usize,
    /// Members that ignored the request and had to be killed.
    pub forced: usize,
    /// `false` when the team was unknown and nothing happened.
    pub found: bool,
}

// ---------------------------------------------------------------------------
// ShutdownCoordinator
// ---------------------------------------------------------------------------

/// Drives a team through `active -> shutting-down -> shutdown`.
///
/// 1. Mark the team `shutting-down` and send every live member a
///    `shutdown` line.
/// 2. Wait up to the grace window for voluntary exits.
/// 3. Kill whoever is left and wait for their exits to be recorded.
/// 4. Mark the team `shutdown` and persist.
pub struct ShutdownCoordinator {
    registry: Arc<TeamRegistry>,
    config: ShutdownConfig,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<TeamRegistry>, config: ShutdownConfig) -> Self {
        Self { registry, config }
    }

    /// Shut a team down. Unknown teams are a silent no-op, unlike every
    /// other team operation, which reports them as not found.
    pub async fn shutdown(&self, team_name: &str) -> Result<ShutdownReport> {
        let Some(team) = self.registry.get(team_name) else {
            debug!(team = %team_name, "shutdown requested for unknown team, ignoring");
            return Ok(ShutdownReport::default());
        };

        let live = {
            let mut guard = team.lock().await;
            if guard.status.can_transition_to(&TeamStatus::ShuttingDown) {
                guard.status = TeamStatus::ShuttingDown;
            }
            guard.live_processes()
        };
        info!(team = %team_name, live = live.len(), "shutting down team");

        // Delivering the request counts against the grace window, so a
        // member that stopped reading cannot hold off the kill.
        let deadline = Instant::now() + self.config.grace();
        let request = AgentMessage::Shutdown { save_results: true }.to_line()?;
        for process in &live {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(e) = process.send_line(&request, remaining).await {
                debug!(team = %team_name, pid = ?process.pid(), error = %e, "shutdown request not delivered");
            }
        }

        let voluntary = async {
            for process in &live {
                process.wait_exited().await;
            }
        };
        if tokio::time::timeout_at(deadline, voluntary).await.is_ok() {
            debug!(team = %team_name, "all members exited within grace window");
        }

        let stragglers: Vec<_> = live.iter().filter(|p| !p.has_exited()).collect();
        for process in &stragglers {
            warn!(team = %team_name, pid = ?process.pid(), "member ignored shutdown, killing");
            process.kill();
        }
        if !stragglers.is_empty() {
            let reaped = async {
                for process in &stragglers {
                    process.wait_exited().await;
                }
            };
            if tokio::time::timeout(self.config.kill_wait(), reaped).await.is_err() {
                warn!(team = %team_name, "killed members not reaped in time");
            }
        }

        {
            let mut guard = team.lock().await;
            guard.status = TeamStatus::Shutdown;
            self.registry.persist(&guard).await?;
        }
        info!(team = %team_name, forced = stragglers.len(), "team shut down");

        Ok(ShutdownReport {
            signalled: live.len(),
            forced: stragglers.len(),
            found: true,
        })
    }

    /// Shut a team down, then remove its storage and its in-memory record.
    ///
    /// Failures to shut down cleanly or to remove the directory are logged;
    /// the in-memory record is dropped regardless. Returns `false` for an
    /// unknown team.
    pub async fn delete(&self, team_name: &str) -> Result<bool> {
        if let Err(e) = self.shutdown(team_name).await {
            warn!(team = %team_name, error = %e, "shutdown before delete failed");
        }
        let Some(team) = self.registry.get(team_name) else {
            return Ok(false);
        };

        let dir = team.lock().await.config_dir.clone();
        match self.registry.store().remove_team_dir(&dir).await {
            Ok(_) => debug!(team = %team_name, dir = %dir.display(), "team directory removed"),
            Err(e) => warn!(team = %team_name, dir = %dir.display(), error = %e, "failed to delete team directory"),
        }
        self.registry.remove(team_name);
        info!(team = %team_name, "team deleted");
        Ok(true)
    }
}
