//! # loan-metrics-engine
//!
//! Loan metrics computation engine for a microlending portfolio.
//!
//! Ledger writes (loans, schedules, repayments, reversals) synchronously
//! recompute each loan's derived state: DPD, outstanding balances and
//! delinquency tags. A periodic aggregation pass turns derived state into
//! dated officer and branch snapshots of portfolio-quality metrics (FIMR,
//! slippage, roll, FRR, AYR, DQI, risk score) with their bands.
//!
//! ## Architecture
//!
//! - **core**: Ledger facts such as loans, repayments and schedules, plus amounts and errors
//! - **engine**: Per-loan recalculation into derived state
//! - **ledger**: In-memory ledger store, ingestion batches, loan drilldown queries
//! - **metrics**: Pure formula library and banding
//! - **aggregation**: Officer/branch aggregation runs and portfolio summary
//! - **snapshot**: Dated snapshot store and dashboard queries
//! - **simulation**: Synthetic loan books
//! - **config**: TOML engine configuration

pub mod aggregation;
pub mod config;
pub mod core;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod simulation;
pub mod snapshot;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::aggregation::portfolio::PortfolioSummary;
    pub use crate::aggregation::scheduler::{AggregationRun, AggregationScheduler, RunStatus};
    pub use crate::config::EngineConfig;
    pub use crate::core::amount::Components;
    pub use crate::core::error::{ErrorCode, LedgerError};
    pub use crate::core::ids::{BranchId, CustomerId, LoanId, OfficerId, RepaymentId};
    pub use crate::core::loan::{Loan, LoanStatus, Officer};
    pub use crate::core::repayment::Repayment;
    pub use crate::core::schedule::ScheduleInstallment;
    pub use crate::engine::derived::DerivedLoanState;
    pub use crate::engine::recalc::RecalculationEngine;
    pub use crate::ledger::ingest::{BatchReport, LedgerBatch, RepaymentInput};
    pub use crate::ledger::store::{LedgerStore, LoanView};
    pub use crate::metrics::formulas::{MetricSet, OfficerInputs};
    pub use crate::snapshot::store::SnapshotStore;
}
