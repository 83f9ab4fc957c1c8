//! Worker system: claims queued jobs and runs them to a terminal state.
//!
//! Core components:
//! - `state` — Job state machine (Queued → Running → Done/Failed)
//! - `executor` — Input resolution and dispatch by job kind
//! - `side_effects` — Completion notifications
//! - `worker` — The poll/claim/execute loop

pub mod executor;
pub mod side_effects;
pub mod state;
pub mod worker;

pub use executor::Executor;
pub use side_effects::SideEffectDispatcher;
pub use state::JobStatus;
pub use worker::Worker;
