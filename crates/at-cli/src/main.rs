mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context;
use at_agents::TeamOrchestrator;
use at_core::config::Config;
use at_core::lockfile::RootLock;
use at_core::types::AgentRole;
use at_telemetry::logging::{self, LogFormat};
use clap::{Parser, Subcommand};

/// agent-teams -- run and inspect teams of cooperating agent processes.
///
/// One process at a time may write to a storage root: `spawn` holds it for
/// as long as it runs, and `results --set`, `shutdown` and `delete` refuse
/// to run meanwhile.
#[derive(Parser)]
#[command(name = "agent-teams", version, about)]
struct Cli {
    /// Config file (default: ~/.agent-teams/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage root holding one directory per team.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every team, or show one team in detail (default).
    Status {
        team: Option<String>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Spawn a member and stream its output until it exits.
    ///
    /// Ctrl-C shuts the whole team down.
    Spawn {
        team: String,
        name: String,
        /// lead, reviewer, debugger or implementer.
        #[arg(long)]
        role: AgentRole,
        /// System prompt sent in the setup handshake.
        #[arg(long)]
        prompt: String,
        /// Initial task.
        #[arg(long)]
        task: String,
    },

    /// Relay a message to one member, or to everyone without --to.
    Send {
        team: String,
        message: String,
        #[arg(long)]
        to: Option<String>,
    },

    /// Show a team's results, or record one with --set KEY VALUE.
    Results {
        team: String,
        /// VALUE is parsed as JSON, falling back to a plain string.
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
        set: Option<Vec<String>>,
    },

    /// Ask every member to stop, killing stragglers after the grace window.
    Shutdown { team: String },

    /// Shut a team down and remove its directory.
    Delete { team: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    logging::init_logging("agent-teams", format, &config.general.log_level);

    // Writers take the root lock before loading, so the snapshot they
    // persist later cannot clobber another writer's.
    let _lock = match &cli.command {
        Some(Commands::Spawn { .. }) => Some(writer_lock(&config.storage.root, "spawn")?),
        Some(Commands::Results { set: Some(_), .. }) => {
            Some(writer_lock(&config.storage.root, "results --set")?)
        }
        Some(Commands::Shutdown { .. }) => Some(writer_lock(&config.storage.root, "shutdown")?),
        Some(Commands::Delete { .. }) => Some(writer_lock(&config.storage.root, "delete")?),
        _ => None,
    };

    let orchestrator = TeamOrchestrator::new(&config);
    orchestrator.init().await.context("loading teams")?;

    match cli.command {
        None => commands::status::run(&orchestrator, None, false).await?,
        Some(Commands::Status { team, json }) => {
            commands::status::run(&orchestrator, team.as_deref(), json).await?
        }
        Some(Commands::Spawn {
            team,
            name,
            role,
            prompt,
            task,
        }) => commands::spawn::run(&orchestrator, &team, &name, role, &prompt, &task).await?,
        Some(Commands::Send { team, message, to }) => {
            commands::send::run(&orchestrator, &team, to.as_deref(), &message).await?
        }
        Some(Commands::Results { team, set }) => {
            commands::results::run(&orchestrator, &team, set).await?
        }
        Some(Commands::Shutdown { team }) => {
            commands::lifecycle::shutdown(&orchestrator, &team).await?
        }
        Some(Commands::Delete { team }) => commands::lifecycle::delete(&orchestrator, &team).await?,
    }

    Ok(())
}

fn writer_lock(root: &Path, command: &str) -> anyhow::Result<RootLock> {
    RootLock::acquire(root, command)
        .with_context(|| format!("`{command}` needs exclusive write access to {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_parses_role_and_globals() {
        let cli = Cli::try_parse_from([
            "agent-teams", "--root", "/tmp/teams", "spawn", "demo", "alice", "--role", "reviewer",
            "--prompt", "Be strict.", "--task", "Review lib.rs",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/teams")));
        match cli.command {
            Some(Commands::Spawn { team, name, role, .. }) => {
                assert_eq!(team, "demo");
                assert_eq!(name, "alice");
                assert_eq!(role, AgentRole::Reviewer);
            }
            _ => panic!("expected spawn"),
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = Cli::try_parse_from([
            "agent-teams", "spawn", "demo", "alice", "--role", "manager", "--prompt", "p",
            "--task", "t",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn results_set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["agent-teams", "results", "demo", "--set", "k", "42"]).unwrap();
        match cli.command {
            Some(Commands::Results { set, .. }) => {
                assert_eq!(set, Some(vec!["k".to_string(), "42".to_string()]))
            }
            _ => panic!("expected results"),
        }
    }

    #[test]
    fn second_writer_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _spawn = writer_lock(dir.path(), "spawn").unwrap();

        let err = writer_lock(dir.path(), "results --set").unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("results --set"));
        assert!(rendered.contains(&format!("pid {}", std::process::id())));
        assert!(rendered.contains("(spawn)"));
    }

    #[test]
    fn no_subcommand_means_status() {
        let cli = Cli::try_parse_from(["agent-teams"]).unwrap();
        assert!(cli.command.is_none());
    }
}
