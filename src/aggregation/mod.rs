//! Periodic officer and branch aggregation over derived loan state.

pub mod collector;
pub mod portfolio;
pub mod scheduler;
