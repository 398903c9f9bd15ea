use at_agents::TeamOrchestrator;

pub async fn shutdown(orchestrator: &TeamOrchestrator, team: &str) -> anyhow::Result<()> {
    let report = orchestrator.shutdown(team).await?;
    if !report.found {
        println!("No team named '{team}'.");
    } else {
        println!(
            "{team}: shut down ({} signalled, {} killed)",
            report.signalled, report.forced
        );
    }
    Ok(())
}

pub async fn delete(orchestrator: &TeamOrchestrator, team: &str) -> anyhow::Result<()> {
    if orchestrator.delete(team).await? {
        println!("{team}: deleted");
    } else {
        println!("No team named '{team}'.");
    }
    Ok(())
}
