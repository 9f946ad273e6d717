//! Per-loan recomputation of derived state from ledger facts.

pub mod allocation;
pub mod derived;
pub mod recalc;
