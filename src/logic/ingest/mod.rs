//! Ingest Module
//!
//! ## Structure
//! - `types`: Observation, IngestOutcome, IngestError
//! - `locks`: per-identity serialization
//! - `pipeline`: IngestPipeline (ingest, rescore)
//! - `moderation`: whitelist / flag / alert decisions on the pipeline
//! - `backlog`: bounded queue of observations waiting out a store outage

pub mod types;
pub mod locks;
pub mod pipeline;
pub mod backlog;
mod moderation;

pub use types::{IngestError, IngestOutcome, Observation};
pub use locks::DeviceLocks;
pub use pipeline::IngestPipeline;
pub use backlog::{RetryBacklog, RetryReport};

#[cfg(test)]
mod tests;
