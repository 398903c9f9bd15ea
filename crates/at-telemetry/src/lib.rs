//! Logging setup shared by the agent-teams binaries.
//!
//! Everything in the workspace logs through `tracing`; this crate only
//! decides where those events go and how they are rendered.

pub mod logging;
