//! Core data model and durable state for agent teams.
//!
//! - [`types`]: teams, members, tasks and their status enums.
//! - [`process`]: the shared handle to a member's live worker process.
//! - [`state_store`]: `state.json` codec and on-disk layout.
//! - [`registry`]: the in-memory team map, loaded from the state store.
//! - [`config`]: `config.toml` loading and validation.
//! - [`lockfile`]: the single-writer lock on a storage root.

pub mod config;
pub mod lockfile;
pub mod process;
pub mod registry;
pub mod state_store;
pub mod types;
