//! Dated officer and branch snapshots and their read-only query surface.

pub mod query;
pub mod store;
