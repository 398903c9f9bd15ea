use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder in `worker.args` replaced by the member's session file path.
pub const SESSION_PLACEHOLDER: &str = "{session}";

/// Top-level configuration loaded from `~/.agent-teams/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Load config from `~/.agent-teams/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.worker.validate()?;
        self.shutdown.validate()?;
        Ok(())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agent-teams")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per team.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".pi")
        .join("teams")
}

/// How a member's worker process is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_program")]
    pub program: String,
    /// Arguments; every occurrence of `{session}` is replaced by the
    /// member's session file path.
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    /// Sender name stamped on relayed messages.
    #[serde(default = "default_lead_name")]
    pub lead_name: String,
    /// Limit on writing one line to a member's stdin. A member that stops
    /// reading has its stdin closed once a line exceeds this.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            args: default_worker_args(),
            lead_name: default_lead_name(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    /// Build a worker config for an arbitrary command line.
    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            lead_name: default_lead_name(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker.program must not be empty".into(),
            ));
        }
        if self.lead_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker.lead_name must not be empty".into(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "worker.write_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_timeout_ms)
    }

    /// Arguments with the session placeholder substituted.
    pub fn args_for(&self, session_file: &std::path::Path) -> Vec<String> {
        let session = session_file.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(SESSION_PLACEHOLDER, &session))
            .collect()
    }
}

fn default_worker_program() -> String {
    "pi".into()
}
fn default_worker_args() -> Vec<String> {
    vec!["--session".into(), SESSION_PLACEHOLDER.into()]
}
fn default_lead_name() -> String {
    "lead".into()
}
fn default_write_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Cooperative grace window before members are force-killed.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Upper bound on waiting for a force-killed process to be reaped.
    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            kill_wait_ms: default_kill_wait_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_ms == 0 {
            return Err(ConfigError::Validation(
                "shutdown.grace_ms must be greater than 0".into(),
            ));
        }
        if self.kill_wait_ms == 0 {
            return Err(ConfigError::Validation(
                "shutdown.kill_wait_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.grace_ms)
    }

    pub fn kill_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.kill_wait_ms)
    }
}

fn default_grace_ms() -> u64 {
    1000
}
fn default_kill_wait_ms() -> u64 {
    5000
}
