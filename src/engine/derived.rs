use crate::core::amount::Components;
use crate::core::schedule::InstallmentStatus;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Delinquency tags carried on a loan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyTags {
    /// First installment paid late beyond the grace period, or never paid.
    pub first_installment_miss: bool,
    /// Current DPD in 1..=6.
    pub early_indicator: bool,
}

/// Derived payment progress of one installment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentProgress {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub total_due: Decimal,
    pub amount_paid: Decimal,
    pub status: InstallmentStatus,
}

impl InstallmentProgress {
    pub fn remaining(&self) -> Decimal {
        crate::core::amount::floor_zero(self.total_due - self.amount_paid)
    }
}

/// Everything the recalculation engine derives for one loan.
///
/// Produced as a whole and written back as a whole; no field is ever updated
/// incrementally, so recomputing from unchanged facts reproduces the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedLoanState {
    /// The date the state was computed for.
    pub as_of: NaiveDate,
    pub current_dpd: u32,
    /// Never decreases across recomputations.
    pub max_dpd_ever: u32,
    pub first_payment_missed: bool,
    pub first_payment_due_date: Option<NaiveDate>,
    pub first_payment_received_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    /// Cumulative paid per component over non-reversed repayments.
    pub paid: Components,
    /// Outstanding per component, each floored at zero.
    pub outstanding: Components,
    pub total_outstanding: Decimal,
    pub total_repaid: Decimal,
    pub waived_total: Decimal,
    pub days_since_last_repayment: Option<u32>,
    pub loan_age_days: u32,
    pub tags: DelinquencyTags,
    pub installments: Vec<InstallmentProgress>,
}

impl DerivedLoanState {
    /// Excess paid over the contractual total. Outstanding stays at zero; the
    /// overpayment is only visible here.
    pub fn overpayment(&self, expected: &Components) -> Decimal {
        crate::core::amount::floor_zero(self.paid.scheduled_total() - expected.scheduled_total())
    }

    /// Unpaid amount of installments due in `(after, until]`.
    pub fn amount_due_between(&self, after: NaiveDate, until: NaiveDate) -> Decimal {
        self.installments
            .iter()
            .filter(|i| i.due_date > after && i.due_date <= until)
            .map(InstallmentProgress::remaining)
            .sum()
    }
}

impl std::fmt::Display for DerivedLoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "As of:                {}", self.as_of)?;
        writeln!(f, "Current DPD:          {}", self.current_dpd)?;
        writeln!(f, "Max DPD ever:         {}", self.max_dpd_ever)?;
        writeln!(f, "First payment missed: {}", self.first_payment_missed)?;
        if let Some(due) = self.first_payment_due_date {
            writeln!(f, "First due:            {}", due)?;
        }
        if let Some(received) = self.first_payment_received_date {
            writeln!(f, "First received:       {}", received)?;
        }
        writeln!(
            f,
            "Outstanding:          {} (P {} / I {} / F {})",
            self.total_outstanding,
            self.outstanding.principal,
            self.outstanding.interest,
            self.outstanding.fee
        )?;
        writeln!(f, "Repaid:               {}", self.total_repaid)?;
        writeln!(
            f,
            "Tags:                 fimr={} early={}",
            self.tags.first_installment_miss, self.tags.early_indicator
        )
    }
}
