use crate::core::ids::{BranchId, OfficerId};
use crate::core::loan::LoanStatus;
use crate::ledger::store::{LedgerStore, LoanView};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Sortable columns of the loan drilldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanColumn {
    #[default]
    LoanId,
    OfficerId,
    BranchId,
    Principal,
    DisbursementDate,
    CurrentDpd,
    MaxDpdEver,
    TotalOutstanding,
    TotalRepaid,
}

impl LoanColumn {
    fn compare(self, a: &LoanView, b: &LoanView) -> Ordering {
        match self {
            LoanColumn::LoanId => a.loan.id.cmp(&b.loan.id),
            LoanColumn::OfficerId => a.loan.officer_id.cmp(&b.loan.officer_id),
            LoanColumn::BranchId => a.loan.branch_id.cmp(&b.loan.branch_id),
            LoanColumn::Principal => a.loan.principal.cmp(&b.loan.principal),
            LoanColumn::DisbursementDate => a.loan.disbursement_date.cmp(&b.loan.disbursement_date),
            LoanColumn::CurrentDpd => a.derived.current_dpd.cmp(&b.derived.current_dpd),
            LoanColumn::MaxDpdEver => a.derived.max_dpd_ever.cmp(&b.derived.max_dpd_ever),
            LoanColumn::TotalOutstanding => {
                a.derived.total_outstanding.cmp(&b.derived.total_outstanding)
            }
            LoanColumn::TotalRepaid => a.derived.total_repaid.cmp(&b.derived.total_repaid),
        }
    }
}

/// Read-only drilldown over loans and their derived state.
///
/// ```
/// use loan_metrics_engine::ledger::query::{LoanColumn, LoanQuery, SortOrder};
/// use loan_metrics_engine::ledger::store::LedgerStore;
///
/// let store = LedgerStore::default();
/// let rows = LoanQuery::new()
///     .dpd_range(1..=6)
///     .sort_by(LoanColumn::CurrentDpd, SortOrder::Descending)
///     .run(&store);
/// assert!(rows.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoanQuery {
    officer: Option<OfficerId>,
    branch: Option<BranchId>,
    region: Option<String>,
    status: Option<LoanStatus>,
    fimr_tagged: Option<bool>,
    early_indicator: Option<bool>,
    dpd: Option<RangeInclusive<u32>>,
    disbursed_from: Option<NaiveDate>,
    disbursed_to: Option<NaiveDate>,
    sort: LoanColumn,
    order: SortOrder,
    limit: Option<usize>,
    offset: usize,
}

impl LoanQuery {
    pub fn new() -> Self {
        Self::default()
    }

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

    pub fn status(mut self, status: LoanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn fimr_tagged(mut self, tagged: bool) -> Self {
        self.fimr_tagged = Some(tagged);
        self
    }

    pub fn early_indicator(mut self, tagged: bool) -> Self {
        self.early_indicator = Some(tagged);
        self
    }

    pub fn dpd_range(mut self, range: RangeInclusive<u32>) -> Self {
        self.dpd = Some(range);
        self
    }

    pub fn disbursed_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.disbursed_from = Some(from);
        self.disbursed_to = Some(to);
        self
    }

    pub fn sort_by(mut self, column: LoanColumn, order: SortOrder) -> Self {
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

    pub fn run(&self, store: &LedgerStore) -> Vec<LoanView> {
        let mut rows: Vec<LoanView> = store
            .loan_views()
            .into_iter()
            .filter(|v| self.matches(store, v))
            .collect();
        rows.sort_by(|a, b| {
            self.order
                .apply(self.sort.compare(a, b))
                .then_with(|| a.loan.id.cmp(&b.loan.id))
        });
        rows.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn matches(&self, store: &LedgerStore, view: &LoanView) -> bool {
        let loan = &view.loan;
        let derived = &view.derived;
        if self.officer.as_ref().is_some_and(|o| *o != loan.officer_id) {
            return false;
        }
        if self.branch.as_ref().is_some_and(|b| *b != loan.branch_id) {
            return false;
        }
        if let Some(region) = &self.region {
            let in_region = store
                .officer(&loan.officer_id)
                .is_some_and(|o| o.region == *region);
            if !in_region {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != loan.status) {
            return false;
        }
        if self
            .fimr_tagged
            .is_some_and(|t| t != derived.tags.first_installment_miss)
        {
            return false;
        }
        if self
            .early_indicator
            .is_some_and(|t| t != derived.tags.early_indicator)
        {
            return false;
        }
        if self.dpd.as_ref().is_some_and(|r| !r.contains(&derived.current_dpd)) {
            return false;
        }
        if self.disbursed_from.is_some_and(|f| loan.disbursement_date < f) {
            return false;
        }
        if self.disbursed_to.is_some_and(|t| loan.disbursement_date > t) {
            return false;
        }
        true
    }
}
