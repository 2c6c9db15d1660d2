//! Application-level orchestration.
//!
//! This module owns command handling for the interactive session: busy
//! gating, stage transitions, rollback on failure, and discarding responses
//! that raced a start-over. Presentation layers send commands and consume
//! events; they never touch the session store directly.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
