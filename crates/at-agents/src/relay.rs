use std::sync::Arc;
use std::time::Duration;

use at_core::registry::{RegistryError, TeamRegistry};
use tracing::{debug, warn};

use crate::protocol::AgentMessage;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("protocol encoding error: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Delivers `message` lines to team members over their stdin.
pub struct MessageRelay {
    registry: Arc<TeamRegistry>,
    from: String,
    write_timeout: Duration,
}

impl MessageRelay {
    /// `from` is the sender name stamped on every relayed message;
    /// `write_timeout` bounds each write to a member's stdin.
    pub fn new(
        registry: Arc<TeamRegistry>,
        from: impl Into<String>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            from: from.into(),
            write_timeout,
        }
    }

    /// Send `content` to the members named `recipient`, or to every member
    /// when `recipient` is `None`.
    ///
    /// Returns the number of *matched* members. Members without a live
    /// process are counted but skipped, so the count does not say how many
    /// processes actually received the line.
    pub async fn send(
        &self,
        team_name: &str,
        recipient: Option<&str>,
        content: &str,
    ) -> Result<usize, RelayError> {
        let team = self.registry.require(team_name)?;
        // Snapshot the targets so a slow reader never holds the team lock.
        let targets: Vec<_> = {
            let guard = team.lock().await;
            guard
                .recipients(recipient)
                .map(|m| (m.name.clone(), m.process.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (name, process) in &targets {
            let Some(process) = process else {
                continue;
            };
            let line = AgentMessage::Message {
                from: self.from.clone(),
                to: name.clone(),
                content: content.to_string(),
            }
            .to_line()?;
            match process.send_line(&line, self.write_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(team = %team_name, member = %name, error = %e, "message delivery failed"),
            }
        }

        debug!(
            team = %team_name,
            recipient = recipient.unwrap_or("*"),
            matched = targets.len(),
            delivered,
            "message relayed"
        );
        Ok(targets.len())
    }
}
