//! Duplicate lookups against an external companion library server.
//!
//! The companion server indexes works by the numeric suffix of their code.
//! Lookups never fail an ingest: auth failures, timeouts, and transport
//! errors are recorded in the result's `source` field and the pipeline
//! carries on.

mod client;

pub use client::{CompanionCheck, CompanionClient};
