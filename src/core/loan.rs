use crate::core::amount::Components;
use crate::core::ids::{BranchId, CustomerId, LoanId, OfficerId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

const DAYS_PER_YEAR: i64 = 365;

/// Lifecycle status of a loan. Loans are never deleted; closed loans stay for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Closed,
    WrittenOff,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Active => "active",
            LoanStatus::Closed => "closed",
            LoanStatus::WrittenOff => "written_off",
        };
        f.write_str(s)
    }
}

/// One disbursed credit extension: the base facts delivered by ledger ingestion.
///
/// Derived fields (DPD, outstanding, tags) are not stored here; they live in
/// [`DerivedLoanState`](crate::engine::derived::DerivedLoanState) and are owned by
/// the recalculation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub customer_id: CustomerId,
    pub officer_id: OfficerId,
    pub branch_id: BranchId,
    /// Disbursed principal.
    pub principal: Decimal,
    pub fee_amount: Decimal,
    /// Nominal annual rate as a decimal (0.25 = 25%).
    pub interest_rate: Decimal,
    pub disbursement_date: NaiveDate,
    pub term_days: u32,
    pub status: LoanStatus,
    /// Disbursement channel reported upstream, if any.
    #[serde(default)]
    pub channel: Option<String>,
    /// First due date recorded upstream, used when no schedule has been ingested.
    #[serde(default)]
    pub first_payment_due_date: Option<NaiveDate>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// `principal × rate × term_days / 365`.
    pub fn expected_interest(&self) -> Decimal {
        self.principal * self.interest_rate * Decimal::from(self.term_days)
            / Decimal::from(DAYS_PER_YEAR)
    }

    /// Contractual totals the loan must repay, by component.
    pub fn expected_components(&self) -> Components {
        Components::new(
            self.principal,
            self.expected_interest(),
            self.fee_amount,
            Decimal::ZERO,
        )
    }

    pub fn maturity_date(&self) -> NaiveDate {
        self.disbursement_date + chrono::Duration::days(i64::from(self.term_days))
    }

    pub fn is_closed(&self) -> bool {
        self.status == LoanStatus::Closed
    }

    /// Compare base facts, ignoring the audit timestamp.
    pub fn same_facts(&self, other: &Loan) -> bool {
        Loan {
            updated_at: other.updated_at,
            ..self.clone()
        } == *other
    }
}

/// A loan officer. Officers roll up into branches, branches into regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    pub id: OfficerId,
    pub name: String,
    pub branch_id: BranchId,
    pub region: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
