//! AI Jobs: durable, multi-worker queue for summarization and deal analysis.

pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod store;
pub mod worker;
