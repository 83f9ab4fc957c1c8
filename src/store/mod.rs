//! Persistence layer: libSQL-backed job table plus host-table adapters.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Deal, JobStore, NotificationSink, OutcomeMemory, Post, PriorOutcome, TargetStore,
};
