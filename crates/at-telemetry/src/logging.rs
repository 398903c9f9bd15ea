use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the configured log level.
pub const LOG_ENV: &str = "AGENT_TEAMS_LOG";

/// Level used when neither the environment nor the caller gives a usable one.
pub const FALLBACK_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" | "pretty" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Build the filter: `AGENT_TEAMS_LOG` wins, then `RUST_LOG`, then
/// `default_level`. An unparsable `default_level` degrades to `info`.
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Install the global subscriber, writing to stderr so stdout stays free for
/// command output and relayed agent output.
///
/// Safe to call more than once (tests do); later calls are no-ops.
pub fn init_logging(service_name: &str, format: LogFormat, default_level: &str) {
    let filter = build_filter(default_level);

    let installed = match format {
        LogFormat::Human => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(service = service_name, ?format, "logging initialised");
    }
}
