//! Incremental extractor for the debian-devel-changes upload archive.
//!
//! Fetches monthly index pages and upload notifications through a persistent
//! URL cache, parses them into typed records, and stores them idempotently
//! in SQLite keyed by message id.

pub mod archive;
pub mod cli;
pub mod config;
pub mod models;
pub mod parser;
pub mod repository;
pub mod services;
