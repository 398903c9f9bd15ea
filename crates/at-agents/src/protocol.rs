//! Line-delimited JSON messages written to a member's stdin.
//!
//! ```text
//! {"type":"agent-setup","systemPrompt":"...","task":"...","role":"team-lead"}
//! {"type":"message","from":"lead","to":"alice","content":"..."}
//! {"type":"shutdown","save_results":true}
//! ```

use at_core::types::AgentRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMessage {
    /// Sent exactly once, right after spawn.
    AgentSetup {
        #[serde(rename = "systemPrompt")]
        system_prompt: String,
        task: String,
        role: AgentRole,
    },
    Message {
        from: String,
        to: String,
        content: String,
    },
    /// Sent once at the start of a team shutdown.
    Shutdown { save_results: bool },
}

impl AgentMessage {
    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
