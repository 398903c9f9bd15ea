use std::io::Write;

use at_agents::event_bus::TeamEvent;
use at_agents::TeamOrchestrator;
use at_core::types::AgentRole;
use tracing::info;

/// Spawn one member and relay its output until it exits. Ctrl-C shuts the
/// team down instead.
pub async fn run(
    orchestrator: &TeamOrchestrator,
    team: &str,
    name: &str,
    role: AgentRole,
    prompt: &str,
    task: &str,
) -> anyhow::Result<()> {
    let events = orchestrator.subscribe();
    let spawned = orchestrator.spawn(team, name, role, prompt, task).await?;
    eprintln!("spawned {name} ({role}) as {}", spawned.session_id);

    loop {
        tokio::select! {
            event = events.recv_async() => {
                let Ok(event) = event else { break };
                if event.session_id() != spawned.session_id {
                    continue;
                }
                match event {
                    TeamEvent::AgentOutput { output, .. } => {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(output.as_bytes())?;
                        stdout.flush()?;
                    }
                    TeamEvent::AgentError { error, .. } => eprint!("{error}"),
                    TeamEvent::AgentExit { code, .. } => {
                        match code {
                            Some(code) => eprintln!("{name} exited with code {code}"),
                            None => eprintln!("{name} was terminated"),
                        }
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(team = %team, "interrupted, shutting team down");
                let report = orchestrator.shutdown(team).await?;
                eprintln!(
                    "{team}: shut down ({} signalled, {} killed)",
                    report.signalled, report.forced
                );
                break;
            }
        }
    }
    Ok(())
}
