//! The decision and generation pipeline.
//!
//! Every step that calls the [`Gateway`](crate::gateway::Gateway) has a
//! deterministic fallback and reports which path produced its result.
//! [`Assistant`] sequences the steps per turn.

pub mod clarify;
pub mod codebase;
mod error;
pub mod extract;
mod machine;
pub mod summary;
pub mod sufficiency;
pub mod tickets;

pub use error::TurnError;
pub use machine::{Assistant, EngineSettings, HealthReport, HealthStatus, TurnRequest};
