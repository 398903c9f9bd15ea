use at_agents::TeamOrchestrator;

/// Print one team's report, or a line per known team.
pub async fn run(orchestrator: &TeamOrchestrator, team: Option<&str>, json: bool) -> anyhow::Result<()> {
    match team {
        Some(name) => {
            let summary = orchestrator.status(name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }
        }
        None => {
            let mut summaries = orchestrator.list().await;
            summaries.sort_by(|a, b| a.name.cmp(&b.name));
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No teams.");
            } else {
                for summary in &summaries {
                    println!("{}", summary.one_line());
                }
            }
        }
    }
    Ok(())
}
