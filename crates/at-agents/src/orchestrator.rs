//! The object external callers hold: one registry, one event bus, and the
//! components that act on them.
//!
//! There is no global instance. Build a [`TeamOrchestrator`], call
//! [`init`](TeamOrchestrator::init) once, and share it by `Arc`.

use std::sync::Arc;

use at_core::config::Config;
use at_core::registry::{RegistryError, TeamRegistry};
use at_core::state_store::StateStore;
use at_core::types::{AgentRole, Team, TeamSummary};
use tracing::info;

use crate::event_bus::{EventBus, TeamEvent};
use crate::relay::{MessageRelay, RelayError};
use crate::shutdown::{ShutdownCoordinator, ShutdownError, ShutdownReport};
use crate::supervisor::{AgentSupervisor, SpawnedAgent, SupervisorError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl OrchestratorError {
    /// `true` when the error is an unknown team name, whichever component
    /// reported it.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Registry(RegistryError::NotFound(_))
                | OrchestratorError::Supervisor(SupervisorError::Registry(RegistryError::NotFound(_)))
                | OrchestratorError::Relay(RelayError::Registry(RegistryError::NotFound(_)))
                | OrchestratorError::Shutdown(ShutdownError::Registry(RegistryError::NotFound(_)))
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

// ---------------------------------------------------------------------------
// TeamOrchestrator
// ---------------------------------------------------------------------------

pub struct TeamOrchestrator {
    registry: Arc<TeamRegistry>,
    events: EventBus,
    supervisor: AgentSupervisor,
    relay: MessageRelay,
    coordinator: ShutdownCoordinator,
}

impl TeamOrchestrator {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(TeamRegistry::new(StateStore::new(
            config.storage.root.clone(),
        )));
        let events = EventBus::new();
        Self {
            supervisor: AgentSupervisor::new(
                registry.clone(),
                config.worker.clone(),
                events.clone(),
            ),
            relay: MessageRelay::new(
                registry.clone(),
                config.worker.lead_name.clone(),
                config.worker.write_timeout(),
            ),
            coordinator: ShutdownCoordinator::new(registry.clone(), config.shutdown.clone()),
            registry,
            events,
        }
    }

    /// Load every persisted team. Call once before serving callers.
    pub async fn init(&self) -> Result<usize> {
        let loaded = self.registry.load_all().await?;
        info!(loaded, "orchestrator initialised");
        Ok(loaded)
    }

    pub fn registry(&self) -> &Arc<TeamRegistry> {
        &self.registry
    }

    /// Subscribe to `agent-output`, `agent-error` and `agent-exit` events
    /// of this orchestrator only.
    pub fn subscribe(&self) -> flume::Receiver<TeamEvent> {
        self.events.subscribe()
    }

    pub async fn spawn(
        &self,
        team_name: &str,
        member_name: &str,
        role: AgentRole,
        system_prompt: &str,
        initial_task: &str,
    ) -> Result<SpawnedAgent> {
        Ok(self
            .supervisor
            .spawn(team_name, member_name, role, system_prompt, initial_task)
            .await?)
    }

    /// Unicast (`Some(name)`) or broadcast (`None`); returns matched members.
    pub async fn send(
        &self,
        team_name: &str,
        recipient: Option<&str>,
        message: &str,
    ) -> Result<usize> {
        Ok(self.relay.send(team_name, recipient, message).await?)
    }

    /// Snapshot of a team, live handles included.
    pub async fn team(&self, team_name: &str) -> Option<Team> {
        let team = self.registry.get(team_name)?;
        let snapshot = team.lock().await.clone();
        Some(snapshot)
    }

    pub async fn status(&self, team_name: &str) -> Result<TeamSummary> {
        let team = self.registry.require(team_name)?;
        let guard = team.lock().await;
        Ok(TeamSummary::from(&*guard))
    }

    /// Summaries of every known team, in no particular order.
    pub async fn list(&self) -> Vec<TeamSummary> {
        let mut summaries = Vec::new();
        for team in self.registry.list() {
            summaries.push(TeamSummary::from(&*team.lock().await));
        }
        summaries
    }

    /// Silent no-op for unknown teams; see [`ShutdownCoordinator::shutdown`].
    pub async fn shutdown(&self, team_name: &str) -> Result<ShutdownReport> {
        Ok(self.coordinator.shutdown(team_name).await?)
    }

    /// Shut down every known team, e.g. when the host process exits.
    pub async fn shutdown_all(&self) -> Vec<(String, Result<ShutdownReport>)> {
        let mut outcomes = Vec::new();
        for name in self.registry.names() {
            let outcome = self.shutdown(&name).await;
            outcomes.push((name, outcome));
        }
        outcomes
    }

    pub async fn delete(&self, team_name: &str) -> Result<bool> {
        Ok(self.coordinator.delete(team_name).await?)
    }

    /// Insert or replace a named result and persist the team.
    pub async fn add_result(
        &self,
        team_name: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let team = self.registry.require(team_name)?;
        let mut guard = team.lock().await;
        guard.set_result(key, value);
        self.registry.persist(&guard).await?;
        Ok(())
    }

    pub async fn results(&self, team_name: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let team = self.registry.require(team_name)?;
        let results = team.lock().await.results.clone();
        Ok(results)
    }
}
