//! Application pipeline state machine and stage aggregation for job postings.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
