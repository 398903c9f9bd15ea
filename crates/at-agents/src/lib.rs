//! Process supervision and messaging for agent teams.
//!
//! ```text
//! TeamOrchestrator
//!   ├── TeamRegistry (at-core)      team records + state.json
//!   ├── AgentSupervisor             spawn, stream forwarding, exit bookkeeping
//!   ├── MessageRelay                unicast / broadcast over stdin
//!   ├── ShutdownCoordinator         cooperative request, grace, kill
//!   └── EventBus                    agent-output / agent-error / agent-exit
//! ```

pub mod event_bus;
pub mod orchestrator;
pub mod protocol;
pub mod relay;
pub mod shutdown;
pub mod supervisor;

pub use orchestrator::{OrchestratorError, TeamOrchestrator};
