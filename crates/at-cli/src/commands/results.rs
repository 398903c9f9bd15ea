use anyhow::bail;
use at_agents::TeamOrchestrator;

pub async fn run(
    orchestrator: &TeamOrchestrator,
    team: &str,
    set: Option<Vec<String>>,
) -> anyhow::Result<()> {
    if let Some(pair) = set {
        let [key, raw] = pair.as_slice() else {
            bail!("--set takes exactly KEY VALUE");
        };
        let value = parse_value(raw);
        orchestrator.add_result(team, key, value).await?;
        println!("{key} recorded");
        return Ok(());
    }

    let results = orchestrator.results(team).await?;
    if results.is_empty() {
        println!("No results for '{team}'.");
    }
    for (key, value) in &results {
        println!("{key}: {value}");
    }
    Ok(())
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
