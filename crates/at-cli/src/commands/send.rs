use at_agents::TeamOrchestrator;

pub async fn run(
    orchestrator: &TeamOrchestrator,
    team: &str,
    to: Option<&str>,
    message: &str,
) -> anyhow::Result<()> {
    let matched = orchestrator.send(team, to, message).await?;
    println!("{matched}");
    // Processes belong to the invocation that spawned them.
    if matched > 0 && orchestrator.team(team).await.is_some_and(|t| t.live_processes().is_empty()) {
        eprintln!("note: no member of '{team}' is running in this process; nothing was delivered");
    }
    Ok(())
}
