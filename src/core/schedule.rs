use crate::core::amount::Components;
use crate::core::ids::LoanId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment status of a single installment, derived from the repayments applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Partial => "partial",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Overdue => "overdue",
        };
        f.write_str(s)
    }
}

/// One expected payment obligation of a loan.
///
/// `amount_paid` and `status` are derived and are overwritten by the ledger
/// store after every recomputation of the owning loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInstallment {
    pub loan_id: LoanId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub due: Components,
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default = "pending")]
    pub status: InstallmentStatus,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn pending() -> InstallmentStatus {
    InstallmentStatus::Pending
}

impl ScheduleInstallment {
    pub fn new(loan_id: LoanId, sequence: u32, due_date: NaiveDate, due: Components) -> Self {
        Self {
            loan_id,
            sequence,
            due_date,
            due,
            amount_paid: Decimal::ZERO,
            status: InstallmentStatus::Pending,
            updated_at: Utc::now(),
        }
    }

    pub fn total_due(&self) -> Decimal {
        self.due.scheduled_total()
    }

    /// Unpaid remainder, never negative.
    pub fn remaining(&self) -> Decimal {
        crate::core::amount::floor_zero(self.total_due() - self.amount_paid)
    }

    /// Compare the contractual facts, ignoring derived fields.
    pub fn same_facts(&self, other: &ScheduleInstallment) -> bool {
        self.loan_id == other.loan_id
            && self.sequence == other.sequence
            && self.due_date == other.due_date
            && self.due == other.due
    }
}
