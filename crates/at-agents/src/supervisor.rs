use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use at_core::config::WorkerConfig;
use at_core::process::{ProcessControl, ProcessHandle};
use at_core::registry::{RegistryError, TeamHandle, TeamRegistry};
use at_core::state_store::StateStore;
use at_core::types::{AgentRole, Member, Task, TeamStatus};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::event_bus::{EventBus, TeamEvent};
use crate::protocol::AgentMessage;

/// Environment variables identifying a member to its own process.
pub const ENV_ROLE: &str = "AGENT_TEAMS_ROLE";
pub const ENV_NAME: &str = "AGENT_TEAMS_NAME";
pub const ENV_TEAM: &str = "AGENT_TEAMS_TEAM";

/// How long the exit watcher waits for trailing output before reporting the
/// exit. Bounded because a grandchild may keep the pipes open.
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("team '{0}' is shutting down")]
    TeamShuttingDown(String),

    #[error("protocol encoding error: {0}")]
    Protocol(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

// ---------------------------------------------------------------------------
// SpawnedAgent
// ---------------------------------------------------------------------------

/// What a successful spawn hands back to the caller.
#[derive(Debug, Clone)]
pub struct SpawnedAgent {
    pub session_id: String,
    pub process: ProcessHandle,
}

// ---------------------------------------------------------------------------
// AgentSupervisor
// ---------------------------------------------------------------------------

/// Launches one worker process per member and keeps the member's record in
/// step with that process until it exits.
pub struct AgentSupervisor {
    registry: Arc<TeamRegistry>,
    worker: WorkerConfig,
    events: EventBus,
}

impl AgentSupervisor {
    pub fn new(registry: Arc<TeamRegistry>, worker: WorkerConfig, events: EventBus) -> Self {
        Self {
            registry,
            worker,
            events,
        }
    }

    /// Spawn a worker as member `member_name` of `team_name`, creating the
    /// team if needed.
    ///
    /// The member and its task are registered only once the process is
    /// running; a launch failure leaves the team untouched.
    pub async fn spawn(
        &self,
        team_name: &str,
        member_name: &str,
        role: AgentRole,
        system_prompt: &str,
        initial_task: &str,
    ) -> Result<SpawnedAgent> {
        let team = self.registry.get_or_create(team_name).await?;
        let mut guard = team.lock().await;
        if guard.status == TeamStatus::ShuttingDown {
            return Err(SupervisorError::TeamShuttingDown(team_name.to_string()));
        }

        let session_id = format!("{team_name}-{member_name}-{}", Uuid::new_v4().simple());
        let task_id = format!("task-{}", Uuid::new_v4().simple());
        let session_file = StateStore::session_path(&guard.config_dir, member_name);
        let setup = AgentMessage::AgentSetup {
            system_prompt: system_prompt.to_string(),
            task: initial_task.to_string(),
            role,
        }
        .to_line()?;

        let mut child = Command::new(&self.worker.program)
            .args(self.worker.args_for(&session_file))
            .env(ENV_ROLE, role.as_str())
            .env(ENV_NAME, member_name)
            .env(ENV_TEAM, team_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                program: self.worker.program.clone(),
                source,
            })?;

        let (process, control) = ProcessHandle::new(child.id(), child.stdin.take());
        // Bounded: the team lock is held here.
        if let Err(e) = process.send_line(&setup, self.worker.write_timeout()).await {
            // The exit watcher will still record whatever the process does.
            warn!(
                team = %team_name,
                member = %member_name,
                error = %e,
                "failed to deliver setup handshake"
            );
        }

        let mut member = Member::new(&session_id, member_name, role);
        member.process = Some(process.clone());
        guard.members.push(member);
        guard.tasks.push(Task::new(&task_id, &session_id, initial_task));
        if guard.status == TeamStatus::Shutdown
            && guard.status.can_transition_to(&TeamStatus::Active)
        {
            info!(team = %team_name, "reactivating team for new member");
            guard.status = TeamStatus::Active;
        }

        let ctx = ExitContext {
            team: team.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            team_name: team_name.to_string(),
            session_id: session_id.clone(),
            member_name: member_name.to_string(),
            task_id,
        };
        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_stream(stdout, ctx.clone(), Stream::Stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_stream(stderr, ctx.clone(), Stream::Stderr)));
        }
        // The watcher blocks on the team lock we still hold, so the member is
        // always registered before its exit can be recorded.
        tokio::spawn(watch_exit(ctx, child, control, forwarders));

        if let Err(e) = self.registry.persist(&guard).await {
            error!(team = %team_name, error = %e, "failed to persist team after spawn");
        }

        info!(
            team = %team_name,
            member = %member_name,
            role = %role,
            session_id = %session_id,
            pid = ?process.pid(),
            "agent spawned"
        );
        Ok(SpawnedAgent {
            session_id,
            process,
        })
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct ExitContext {
    team: TeamHandle,
    registry: Arc<TeamRegistry>,
    events: EventBus,
    team_name: String,
    session_id: String,
    member_name: String,
    task_id: String,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Re-publish every chunk read from `reader` until EOF.
async fn forward_stream<R>(mut reader: R, ctx: ExitContext, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(session_id = %ctx.session_id, ?stream, error = %e, "stream read failed");
                break;
            }
        };
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        let event = match stream {
            Stream::Stdout => TeamEvent::AgentOutput {
                team: ctx.team_name.clone(),
                session_id: ctx.session_id.clone(),
                member_name: ctx.member_name.clone(),
                output: text,
            },
            Stream::Stderr => TeamEvent::AgentError {
                team: ctx.team_name.clone(),
                session_id: ctx.session_id.clone(),
                member_name: ctx.member_name.clone(),
                error: text,
            },
        };
        ctx.events.publish(event);
    }
}

/// Own the child until it exits, then record the outcome on the member and
/// its task, persist, and announce the exit.
async fn watch_exit(
    ctx: ExitContext,
    mut child: Child,
    mut control: ProcessControl,
    forwarders: Vec<tokio::task::JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = control.kill_requested() => {
            warn!(session_id = %ctx.session_id, "force-killing agent");
            if let Err(e) = child.start_kill() {
                debug!(session_id = %ctx.session_id, error = %e, "kill failed, process already gone");
            }
            child.wait().await
        }
    };
    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            error!(session_id = %ctx.session_id, error = %e, "failed to wait on agent process");
            None
        }
    };
    let success = code == Some(0);

    let drain = async {
        for handle in forwarders {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(OUTPUT_DRAIN, drain).await.is_err() {
        debug!(session_id = %ctx.session_id, "output still open after exit");
    }

    {
        let mut team = ctx.team.lock().await;
        if let Some(member) = team.member_by_session_mut(&ctx.session_id) {
            member.record_exit(success);
        }
        if let Some(task) = team.task_by_id_mut(&ctx.task_id) {
            task.record_exit(success);
        }
        if let Err(e) = ctx.registry.persist(&team).await {
            error!(team = %ctx.team_name, error = %e, "failed to persist team after agent exit");
        }
    }
    control.mark_exited();

    info!(
        team = %ctx.team_name,
        member = %ctx.member_name,
        code = ?code,
        "agent exited"
    );
    ctx.events.publish(TeamEvent::AgentExit {
        team: ctx.team_name,
        session_id: ctx.session_id,
        member_name: ctx.member_name,
        code,
    });
}
