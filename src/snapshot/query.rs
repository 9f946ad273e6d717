use crate::core::error::ErrorCode;
use crate::core::ids::{BranchId, OfficerId};
use crate::ledger::query::SortOrder;
use crate::metrics::bands::RiskBand;
use crate::metrics::formulas::{MetricSet, OfficerInputs};
use crate::snapshot::store::{BranchMetricSnapshot, OfficerMetricSnapshot, SnapshotStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("no snapshot for {entity} {id}")]
    NotFound { entity: &'static str, id: String },
}

impl QueryError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::NotFound
    }
}

/// Sortable snapshot columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotColumn {
    #[default]
    CalculationDate,
    EntityId,
    Region,
    LoansDisbursed,
    TotalPortfolio,
    Fimr,
    Slippage,
    Roll,
    Frr,
    Ayr,
    Porr,
    Dqi,
    RiskScore,
}

/// Fields shared by officer and branch snapshots, so one query type serves both.
pub trait SnapshotRow {
    fn entity_id(&self) -> &str;
    fn branch_id(&self) -> &BranchId;
    fn region(&self) -> &str;
    fn calculation_date(&self) -> NaiveDate;
    fn inputs(&self) -> &OfficerInputs;
    fn metrics(&self) -> &MetricSet;
}

impl SnapshotRow for OfficerMetricSnapshot {
    fn entity_id(&self) -> &str {
        self.officer_id.as_str()
    }
    fn branch_id(&self) -> &BranchId {
        &self.branch_id
    }
    fn region(&self) -> &str {
        &self.region
    }
    fn calculation_date(&self) -> NaiveDate {
        self.calculation_date
    }
    fn inputs(&self) -> &OfficerInputs {
        &self.inputs
    }
    fn metrics(&self) -> &MetricSet {
        &self.metrics
    }
}

impl SnapshotRow for BranchMetricSnapshot {
    fn entity_id(&self) -> &str {
        self.branch_id.as_str()
    }
    fn branch_id(&self) -> &BranchId {
        &self.branch_id
    }
    fn region(&self) -> &str {
        &self.region
    }
    fn calculation_date(&self) -> NaiveDate {
        self.calculation_date
    }
    fn inputs(&self) -> &OfficerInputs {
        &self.inputs
    }
    fn metrics(&self) -> &MetricSet {
        &self.metrics
    }
}

impl SnapshotColumn {
    fn compare<R: SnapshotRow>(self, a: &R, b: &R) -> Ordering {
        let (ma, mb) = (a.metrics(), b.metrics());
        let (ia, ib) = (a.inputs(), b.inputs());
        match self {
            SnapshotColumn::CalculationDate => a.calculation_date().cmp(&b.calculation_date()),
            SnapshotColumn::EntityId => a.entity_id().cmp(b.entity_id()),
            SnapshotColumn::Region => a.region().cmp(b.region()),
            SnapshotColumn::LoansDisbursed => ia.loans_disbursed.cmp(&ib.loans_disbursed),
            SnapshotColumn::TotalPortfolio => ia.total_portfolio.cmp(&ib.total_portfolio),
            SnapshotColumn::Fimr => ma.fimr.cmp(&mb.fimr),
            SnapshotColumn::Slippage => ma.slippage.cmp(&mb.slippage),
            SnapshotColumn::Roll => ma.roll.cmp(&mb.roll),
            SnapshotColumn::Frr => ma.frr.cmp(&mb.frr),
            SnapshotColumn::Ayr => ma.ayr.cmp(&mb.ayr),
            SnapshotColumn::Porr => ma.porr.cmp(&mb.porr),
            SnapshotColumn::Dqi => ma.dqi.cmp(&mb.dqi),
            SnapshotColumn::RiskScore => ma.risk_score.cmp(&mb.risk_score),
        }
    }
}

/// Filtered, sorted and paged read over the snapshot tables.
#[derive(Debug, Clone, Default)]
pub struct SnapshotQuery {
    officer: Option<OfficerId>,
    branch: Option<BranchId>,
    region: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    risk_bands: Vec<RiskBand>,
    sort: SnapshotColumn,
    order: SortOrder,
    limit: Option<usize>,
    offset: usize,
}

impl SnapshotQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only applies to officer rows.
    pub fn officer(mut self, officer: impl Into<OfficerId>) -> Self {
        self.officer = Some(officer.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<BranchId>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.between(date, date)
    }

    /// Match any of the given bands. Repeatable.
    pub fn risk_band(mut self, band: RiskBand) -> Self {
        self.risk_bands.push(band);
        self
    }

    pub fn sort_by(mut self, column: SnapshotColumn, order: SortOrder) -> Self {
        self.sort = column;
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn officers(&self, store: &SnapshotStore) -> Vec<OfficerMetricSnapshot> {
        let rows = store
            .all_officer_snapshots()
            .into_iter()
            .filter(|s| self.officer.as_ref().map_or(true, |o| *o == s.officer_id))
            .collect();
        self.finish(rows)
    }

    pub fn branches(&self, store: &SnapshotStore) -> Vec<BranchMetricSnapshot> {
        self.finish(store.all_branch_snapshots())
    }

    fn finish<R: SnapshotRow>(&self, rows: Vec<R>) -> Vec<R> {
        let mut rows: Vec<R> = rows.into_iter().filter(|r| self.matches(r)).collect();
        rows.sort_by(|a, b| {
            self.order
                .apply(self.sort.compare(a, b))
                .then_with(|| a.entity_id().cmp(b.entity_id()))
                .then_with(|| a.calculation_date().cmp(&b.calculation_date()))
        });
        rows.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn matches<R: SnapshotRow>(&self, row: &R) -> bool {
        self.branch.as_ref().map_or(true, |b| b == row.branch_id())
            && self.region.as_deref().map_or(true, |r| r == row.region())
            && self.from.map_or(true, |f| row.calculation_date() >= f)
            && self.to.map_or(true, |t| row.calculation_date() <= t)
            && (self.risk_bands.is_empty() || self.risk_bands.contains(&row.metrics().bands.risk))
    }
}

/// Latest snapshot of an officer, or a typed not-found error.
pub fn latest_officer_snapshot(
    store: &SnapshotStore,
    officer: &OfficerId,
) -> Result<OfficerMetricSnapshot, QueryError> {
    store
        .latest_for_officer(officer)
        .ok_or_else(|| QueryError::NotFound {
            entity: "officer",
            id: officer.to_string(),
        })
}
