//! Ingestion payloads and batch reporting.
//!
//! Batch variants never fail as a whole: each record is accepted or rejected
//! on its own and the [`BatchReport`] itemizes the rejections with their
//! error codes.

use crate::core::amount::Components;
use crate::core::error::{EntityKind, ErrorCode, LedgerError};
use crate::core::ids::{LoanId, RepaymentId};
use crate::core::loan::{Loan, Officer};
use crate::core::repayment::Repayment;
use crate::core::schedule::ScheduleInstallment;
use crate::engine::allocation::estimate_components;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an accepted write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Created,
    /// Identical re-submission, or a state change that was already in effect.
    Unchanged,
    Updated,
}

/// A repayment as delivered upstream. The component breakdown is optional;
/// when missing it is estimated from the loan's terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentInput {
    pub id: RepaymentId,
    pub loan_id: LoanId,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub components: Option<Components>,
    #[serde(default)]
    pub waiver_amount: Decimal,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub is_backdated: bool,
    #[serde(default)]
    pub recorded_on: Option<NaiveDate>,
}

impl RepaymentInput {
    /// Build the ledger record. `loan` supplies the terms used for estimation.
    pub fn into_repayment(self, loan: &Loan) -> Repayment {
        let (components, estimated) = match self.components {
            Some(c) => (c, false),
            None => (estimate_components(loan, self.amount), true),
        };
        let mut repayment = Repayment::new(self.id, self.loan_id, self.payment_date, components)
            .with_amount(self.amount)
            .with_waiver(self.waiver_amount)
            .with_backdated(self.is_backdated);
        if estimated {
            repayment = repayment.with_estimated_components();
        }
        if let Some(channel) = self.channel {
            repayment = repayment.with_channel(channel);
        }
        if let Some(recorded_on) = self.recorded_on {
            repayment = repayment.with_recorded_on(recorded_on);
        }
        repayment
    }
}

impl From<&Repayment> for RepaymentInput {
    fn from(r: &Repayment) -> Self {
        Self {
            id: r.id().clone(),
            loan_id: r.loan_id().clone(),
            payment_date: r.payment_date(),
            amount: r.amount(),
            components: (!r.components_estimated()).then(|| *r.components()),
            waiver_amount: r.waiver_amount(),
            channel: r.channel().map(str::to_string),
            is_backdated: r.is_backdated(),
            recorded_on: (r.recorded_on() != r.payment_date()).then(|| r.recorded_on()),
        }
    }
}

/// Request to reverse a previously ingested repayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalInput {
    pub repayment_id: RepaymentId,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A bulk ledger delivery. Sections are applied in field order so that loans
/// can reference officers and repayments can reference loans in the same batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerBatch {
    #[serde(default)]
    pub officers: Vec<Officer>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub schedule: Vec<ScheduleInstallment>,
    #[serde(default)]
    pub repayments: Vec<RepaymentInput>,
    #[serde(default)]
    pub reversals: Vec<ReversalInput>,
}

impl LedgerBatch {
    pub fn len(&self) -> usize {
        self.officers.len()
            + self.loans.len()
            + self.schedule.len()
            + self.repayments.len()
            + self.reversals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Error,
}

/// One rejected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub entity: EntityKind,
    pub id: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Itemized result of a batch ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Accepted repayments whose components were estimated.
    pub estimated_components: usize,
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.processed - self.failed()
    }

    /// `Error` only when every record failed; an empty batch is a success.
    pub fn status(&self) -> BatchStatus {
        if self.failures.is_empty() {
            BatchStatus::Success
        } else if self.succeeded() == 0 {
            BatchStatus::Error
        } else {
            BatchStatus::PartialSuccess
        }
    }

    pub(crate) fn record(
        &mut self,
        entity: EntityKind,
        id: impl fmt::Display,
        result: Result<IngestOutcome, LedgerError>,
    ) {
        self.processed += 1;
        match result {
            Ok(IngestOutcome::Created) => self.created += 1,
            Ok(IngestOutcome::Updated) => self.updated += 1,
            Ok(IngestOutcome::Unchanged) => self.unchanged += 1,
            Err(err) => self.failures.push(RecordFailure {
                entity,
                id: id.to_string(),
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status() {
            BatchStatus::Success => "success",
            BatchStatus::PartialSuccess => "partial_success",
            BatchStatus::Error => "error",
        };
        writeln!(f, "Batch status:   {}", status)?;
        writeln!(
            f,
            "Records:        {} processed, {} created, {} updated, {} unchanged, {} failed",
            self.processed,
            self.created,
            self.updated,
            self.unchanged,
            self.failed()
        )?;
        if self.estimated_components > 0 {
            writeln!(
                f,
                "Estimated:      {} repayments with proportional component split",
                self.estimated_components
            )?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  ✗ {} {} [{}] {}",
                failure.entity, failure.id, failure.code, failure.message
            )?;
        }
        Ok(())
    }
}
