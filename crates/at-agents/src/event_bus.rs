use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TeamEvent
// ---------------------------------------------------------------------------

/// Something observable happened to a member's process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TeamEvent {
    /// A chunk of the member's stdout, uninterpreted.
    AgentOutput {
        team: String,
        session_id: String,
        member_name: String,
        output: String,
    },
    /// A chunk of the member's stderr, uninterpreted.
    AgentError {
        team: String,
        session_id: String,
        member_name: String,
        error: String,
    },
    /// The member's process exited; `code` is `None` when killed by a signal.
    AgentExit {
        team: String,
        session_id: String,
        member_name: String,
        code: Option<i32>,
    },
}

impl TeamEvent {
    pub fn session_id(&self) -> &str {
        match self {
            TeamEvent::AgentOutput { session_id, .. }
            | TeamEvent::AgentError { session_id, .. }
            | TeamEvent::AgentExit { session_id, .. } => session_id,
        }
    }

    pub fn member_name(&self) -> &str {
        match self {
            TeamEvent::AgentOutput { member_name, .. }
            | TeamEvent::AgentError { member_name, .. }
            | TeamEvent::AgentExit { member_name, .. } => member_name,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, TeamEvent::AgentExit { .. })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A broadcast-style event bus built on top of flume channels.
///
/// Each orchestrator owns its own bus, so independent instances never see
/// each other's events. Each call to [`subscribe`](Self::subscribe) creates a
/// new receiver that gets every event published after the subscription was
/// created. Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<TeamEvent>>>>,
}

impl EventBus {
    /// Create a new, empty event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<TeamEvent> {
        let (tx, rx) = flume::unbounded();
        self.senders().push(tx);
        rx
    }

    /// Publish an event to all current subscribers.
    ///
    /// Disconnected subscribers (whose receivers have been dropped) are
    /// automatically pruned.
    pub fn publish(&self, event: TeamEvent) {
        self.senders().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Return the number of currently active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }

    fn senders(&self) -> MutexGuard<'_, Vec<flume::Sender<TeamEvent>>> {
        // A panicking subscriber cannot leave the sender list half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
