use crate::core::ids::{LoanId, RepaymentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes surfaced to batch and query callers.
///
/// Callers outside the crate see these instead of the error's internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ReferentialError,
    DuplicateIdentifier,
    ComputationDefect,
    RunInProgress,
    AggregationFailed,
    NotFound,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ReferentialError => "REFERENTIAL_ERROR",
            ErrorCode::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            ErrorCode::ComputationDefect => "COMPUTATION_DEFECT",
            ErrorCode::RunInProgress => "RUN_IN_PROGRESS",
            ErrorCode::AggregationFailed => "AGGREGATION_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of ledger record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Officer,
    Loan,
    Repayment,
    Installment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Officer => "officer",
            EntityKind::Loan => "loan",
            EntityKind::Repayment => "repayment",
            EntityKind::Installment => "installment",
        };
        f.write_str(s)
    }
}

/// Malformed ledger facts detected while recomputing a loan.
///
/// Any of these is fatal for the single loan update that triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecalcError {
    #[error("repayment {repayment} on loan {loan}: amount {amount} != component sum {components}")]
    ComponentSumMismatch {
        loan: LoanId,
        repayment: RepaymentId,
        amount: Decimal,
        components: Decimal,
    },
    #[error("loan {loan}: negative amount in {context}")]
    NegativeAmount { loan: LoanId, context: String },
    #[error("loan {loan}: record {record} belongs to loan {owner}")]
    ForeignRecord {
        loan: LoanId,
        record: String,
        owner: LoanId,
    },
    #[error("loan {loan}: installment sequence {sequence} appears more than once")]
    DuplicateInstallment { loan: LoanId, sequence: u32 },
    #[error("loan {loan}: invalid terms: {reason}")]
    InvalidTerms { loan: LoanId, reason: String },
}

impl RecalcError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ComputationDefect
    }
}

/// Errors raised by ledger ingestion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("invalid {entity} {id}: {reason}")]
    Validation {
        entity: EntityKind,
        id: String,
        reason: String,
    },
    #[error("repayment {id}: amount {amount} != sum of components ({components})")]
    ComponentSumMismatch {
        id: RepaymentId,
        amount: Decimal,
        components: Decimal,
    },
    #[error("{entity} {id} references unknown {target} {target_id}")]
    Referential {
        entity: EntityKind,
        id: String,
        target: EntityKind,
        target_id: String,
    },
    #[error("{entity} {id} already exists with different content")]
    DuplicateIdentifier { entity: EntityKind, id: String },
    #[error("recalculation rejected the write: {0}")]
    Recalculation(#[from] RecalcError),
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation { .. } | LedgerError::ComponentSumMismatch { .. } => {
                ErrorCode::ValidationError
            }
            LedgerError::Referential { .. } => ErrorCode::ReferentialError,
            LedgerError::DuplicateIdentifier { .. } => ErrorCode::DuplicateIdentifier,
            LedgerError::Recalculation(e) => e.code(),
        }
    }

    pub(crate) fn validation(
        entity: EntityKind,
        id: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        LedgerError::Validation {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
