//! ClaritaPM: a conversational assistant that turns natural-language feature
//! requests into work-tracking tickets.
//!
//! Each turn runs through [`engine::Assistant`]: extraction, a sufficiency
//! check, then either clarifying questions or ticket synthesis. Every step
//! that uses the text-generation [`gateway`] has a deterministic fallback.

pub mod api;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod mcp;
pub mod models;
pub mod store;
