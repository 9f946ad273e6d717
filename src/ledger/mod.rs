//! Ledger facts, ingestion and the per-loan write path.

pub mod clock;
pub mod ingest;
pub mod query;
pub mod store;
