use crate::core::ids::{BranchId, LoanId, OfficerId};
use crate::metrics::formulas::{MetricSet, OfficerInputs};
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Dated metrics for one officer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficerMetricSnapshot {
    pub officer_id: OfficerId,
    pub officer_name: String,
    pub branch_id: BranchId,
    pub region: String,
    pub calculation_date: NaiveDate,
    pub period_start: NaiveDate,
    pub run_id: Uuid,
    pub inputs: OfficerInputs,
    pub metrics: MetricSet,
    pub created_at: DateTime<Utc>,
}

/// Dated metrics for one branch, computed from the summed inputs of its officers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMetricSnapshot {
    pub branch_id: BranchId,
    pub region: String,
    pub calculation_date: NaiveDate,
    pub period_start: NaiveDate,
    pub run_id: Uuid,
    pub officer_count: usize,
    pub inputs: OfficerInputs,
    pub metrics: MetricSet,
    pub created_at: DateTime<Utc>,
}

/// A loan's delinquency position as observed by one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanMark {
    pub dpd: u32,
    pub principal_outstanding: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Inserted,
    /// A snapshot for the same entity and date existed and was replaced whole.
    Replaced,
}

/// Append-only snapshot tables keyed by `(entity, calculation_date)`.
///
/// There is at most one row per key. Re-running a date replaces that date's
/// row wholesale; rows of other dates are never touched.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    officers: RwLock<BTreeMap<(OfficerId, NaiveDate), OfficerMetricSnapshot>>,
    branches: RwLock<BTreeMap<(BranchId, NaiveDate), BranchMetricSnapshot>>,
    loan_marks: RwLock<BTreeMap<NaiveDate, BTreeMap<LoanId, LoanMark>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_officer(&self, snapshot: OfficerMetricSnapshot) -> WriteOutcome {
        let key = (snapshot.officer_id.clone(), snapshot.calculation_date);
        let outcome = match self.officers.write().insert(key, snapshot) {
            Some(_) => WriteOutcome::Replaced,
            None => WriteOutcome::Inserted,
        };
        debug!("officer snapshot write: {:?}", outcome);
        outcome
    }

    pub fn record_branch(&self, snapshot: BranchMetricSnapshot) -> WriteOutcome {
        let key = (snapshot.branch_id.clone(), snapshot.calculation_date);
        match self.branches.write().insert(key, snapshot) {
            Some(_) => WriteOutcome::Replaced,
            None => WriteOutcome::Inserted,
        }
    }

    /// Replace the per-loan marks of `date`.
    pub fn record_loan_marks(&self, date: NaiveDate, marks: BTreeMap<LoanId, LoanMark>) {
        self.loan_marks.write().insert(date, marks);
    }

    pub fn officer_snapshot(
        &self,
        officer: &OfficerId,
        date: NaiveDate,
    ) -> Option<OfficerMetricSnapshot> {
        self.officers.read().get(&(officer.clone(), date)).cloned()
    }

    pub fn branch_snapshot(
        &self,
        branch: &BranchId,
        date: NaiveDate,
    ) -> Option<BranchMetricSnapshot> {
        self.branches.read().get(&(branch.clone(), date)).cloned()
    }

    /// Most recent officer snapshot strictly before `date`.
    pub fn previous_officer_snapshot(
        &self,
        officer: &OfficerId,
        date: NaiveDate,
    ) -> Option<OfficerMetricSnapshot> {
        self.officers
            .read()
            .range((officer.clone(), NaiveDate::MIN)..(officer.clone(), date))
            .next_back()
            .map(|(_, s)| s.clone())
    }

    pub fn latest_for_officer(&self, officer: &OfficerId) -> Option<OfficerMetricSnapshot> {
        self.officers
            .read()
            .range((officer.clone(), NaiveDate::MIN)..=(officer.clone(), NaiveDate::MAX))
            .next_back()
            .map(|(_, s)| s.clone())
    }

    /// All snapshots of one officer, oldest first.
    pub fn history_for_officer(&self, officer: &OfficerId) -> Vec<OfficerMetricSnapshot> {
        self.officers
            .read()
            .range((officer.clone(), NaiveDate::MIN)..=(officer.clone(), NaiveDate::MAX))
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn officer_snapshots_on(&self, date: NaiveDate) -> Vec<OfficerMetricSnapshot> {
        self.officers
            .read()
            .values()
            .filter(|s| s.calculation_date == date)
            .cloned()
            .collect()
    }

    pub fn branch_snapshots_on(&self, date: NaiveDate) -> Vec<BranchMetricSnapshot> {
        self.branches
            .read()
            .values()
            .filter(|s| s.calculation_date == date)
            .cloned()
            .collect()
    }

    pub fn all_officer_snapshots(&self) -> Vec<OfficerMetricSnapshot> {
        self.officers.read().values().cloned().collect()
    }

    pub fn all_branch_snapshots(&self) -> Vec<BranchMetricSnapshot> {
        self.branches.read().values().cloned().collect()
    }

    /// Marks of the latest run strictly before `date`, with that run's date.
    pub fn loan_marks_before(
        &self,
        date: NaiveDate,
    ) -> Option<(NaiveDate, BTreeMap<LoanId, LoanMark>)> {
        self.loan_marks
            .read()
            .range(..date)
            .next_back()
            .map(|(d, m)| (*d, m.clone()))
    }

    /// Marks of the latest run on or before `date`.
    pub fn loan_marks_at_or_before(
        &self,
        date: NaiveDate,
    ) -> Option<(NaiveDate, BTreeMap<LoanId, LoanMark>)> {
        self.loan_marks
            .read()
            .range(..=date)
            .next_back()
            .map(|(d, m)| (*d, m.clone()))
    }

    pub fn officer_row_count(&self) -> usize {
        self.officers.read().len()
    }

    pub fn branch_row_count(&self) -> usize {
        self.branches.read().len()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::metrics::formulas::{compute, RiskWeights};

    pub(crate) fn officer_snapshot(
        officer: &str,
        branch: &str,
        date: NaiveDate,
        inputs: OfficerInputs,
    ) -> OfficerMetricSnapshot {
        let metrics = compute(&inputs, &RiskWeights::default());
        OfficerMetricSnapshot {
            officer_id: officer.into(),
            officer_name: officer.to_lowercase(),
            branch_id: branch.into(),
            region: if branch == "WUSE" { "Abuja".into() } else { "Lagos".into() },
            calculation_date: date,
            period_start: date - chrono::Duration::days(29),
            run_id: Uuid::new_v4(),
            inputs,
            metrics,
            created_at: Utc::now(),
        }
    }
}
