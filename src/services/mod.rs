//! Service layer for the ingest pipeline.
//!
//! Domain logic separated from UI concerns, usable from the CLI or other
//! interfaces.

pub mod ingest;

pub use ingest::{IngestService, IngestStats};
