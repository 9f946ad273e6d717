use crate::aggregation::collector::{collect_officer_inputs, loan_marks, PeriodContext};
use crate::aggregation::portfolio::PortfolioSummary;
use crate::config::EngineConfig;
use crate::core::error::{ErrorCode, RecalcError};
use crate::core::ids::{BranchId, LoanId, OfficerId};
use crate::core::loan::Officer;
use crate::ledger::store::{LedgerStore, LoanView};
use crate::metrics::formulas::{self, OfficerInputs};
use crate::snapshot::store::{BranchMetricSnapshot, LoanMark, OfficerMetricSnapshot, SnapshotStore};
use chrono::{DateTime, NaiveDate, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("an aggregation pass for {0} is already running")]
    RunInProgress(NaiveDate),
    #[error("officer {officer}: loan {loan} has no derived state as of {date}: {source}")]
    MissingDerivedState {
        officer: OfficerId,
        loan: LoanId,
        date: NaiveDate,
        #[source]
        source: RecalcError,
    },
    #[error("loan references unregistered officer {0}")]
    UnknownOfficer(OfficerId),
    #[error("branch {0} has no active officers")]
    EmptyBranch(BranchId),
    #[error("branch {branch}: officers {failed:?} failed")]
    IncompleteBranch {
        branch: BranchId,
        failed: Vec<OfficerId>,
    },
}

impl AggregationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AggregationError::RunInProgress(_) => ErrorCode::RunInProgress,
            _ => ErrorCode::AggregationFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartiallyCompleted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::PartiallyCompleted
        )
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Running, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::PartiallyCompleted => "partially_completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotEntity {
    Officer,
    Branch,
}

/// One entity that could not be aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity: SnapshotEntity,
    pub id: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Record of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRun {
    pub id: Uuid,
    pub calculation_date: NaiveDate,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub officers_succeeded: Vec<OfficerId>,
    pub branches_succeeded: Vec<BranchId>,
    pub failures: Vec<EntityFailure>,
    /// True when the pass took longer than the configured threshold.
    pub overran: bool,
}

impl AggregationRun {
    fn new(calculation_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            calculation_date,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            officers_succeeded: Vec::new(),
            branches_succeeded: Vec::new(),
            failures: Vec::new(),
            overran: false,
        }
    }

    fn transition(&mut self, next: RunStatus) {
        if self.status.can_transition_to(next) {
            self.status = next;
        } else {
            error!(
                "run {} rejected transition {} -> {}",
                self.id, self.status, next
            );
        }
    }

    fn fail(&mut self, entity: SnapshotEntity, id: impl fmt::Display, err: &AggregationError) {
        self.failures.push(EntityFailure {
            entity,
            id: id.to_string(),
            code: err.code(),
            message: err.to_string(),
        });
    }

    pub fn succeeded(&self) -> usize {
        self.officers_succeeded.len() + self.branches_succeeded.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|f| f - self.started_at)
    }
}

impl fmt::Display for AggregationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Aggregation Run {} ===", self.id)?;
        writeln!(f, "Date:      {}", self.calculation_date)?;
        writeln!(f, "Status:    {}", self.status)?;
        writeln!(
            f,
            "Entities:  {} officers, {} branches succeeded; {} failed",
            self.officers_succeeded.len(),
            self.branches_succeeded.len(),
            self.failed()
        )?;
        if let Some(duration) = self.duration() {
            writeln!(f, "Duration:  {} ms", duration.num_milliseconds())?;
        }
        if self.overran {
            writeln!(f, "Overran:   yes")?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  ✗ {:?} {} [{}] {}",
                failure.entity, failure.id, failure.code, failure.message
            )?;
        }
        Ok(())
    }
}

/// Holds a calculation date for the lifetime of one pass. Dropping the guard
/// releases the date, also when the pass unwinds.
pub struct DateRunGuard<'a> {
    registry: &'a Mutex<HashSet<NaiveDate>>,
    date: NaiveDate,
}

impl<'a> DateRunGuard<'a> {
    fn acquire(
        registry: &'a Mutex<HashSet<NaiveDate>>,
        date: NaiveDate,
    ) -> Result<Self, AggregationError> {
        if !registry.lock().insert(date) {
            return Err(AggregationError::RunInProgress(date));
        }
        Ok(Self { registry, date })
    }
}

impl Drop for DateRunGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.date);
    }
}

/// Computes and persists officer and branch snapshots for a calculation date.
///
/// Passes for different dates may run concurrently; a second pass for a date
/// that is already running is refused with [`AggregationError::RunInProgress`].
/// Re-running a finished date replaces that date's rows.
pub struct AggregationScheduler {
    ledger: Arc<LedgerStore>,
    snapshots: Arc<SnapshotStore>,
    config: EngineConfig,
    in_flight: Mutex<HashSet<NaiveDate>>,
    runs: RwLock<Vec<AggregationRun>>,
}

impl AggregationScheduler {
    pub fn new(
        ledger: Arc<LedgerStore>,
        snapshots: Arc<SnapshotStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            snapshots,
            config,
            in_flight: Mutex::new(HashSet::new()),
            runs: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Run one pass for `date`.
    pub fn run(&self, date: NaiveDate) -> Result<AggregationRun, AggregationError> {
        let _guard = DateRunGuard::acquire(&self.in_flight, date)?;
        let started = Instant::now();
        let mut run = AggregationRun::new(date);
        run.transition(RunStatus::Running);
        info!("aggregation run {} started for {}", run.id, date);

        let previous = self.snapshots.loan_marks_before(date);
        let mid_period = self
            .snapshots
            .loan_marks_at_or_before(self.config.mid_period(date));
        let mut ctx = PeriodContext::new(&self.config, date);
        ctx.previous_marks = previous.as_ref().map(|(_, m)| m);
        ctx.mid_period_marks = mid_period.as_ref().map(|(_, m)| m);

        let mut books: BTreeMap<OfficerId, Result<Vec<LoanView>, AggregationError>> = self
            .ledger
            .officer_views()
            .into_par_iter()
            .map(|(officer, views)| {
                let book = self.book_as_of(&officer, &views, date);
                (officer, book)
            })
            .collect();
        let marks: BTreeMap<LoanId, LoanMark> = books
            .values()
            .filter_map(|book| book.as_ref().ok())
            .flat_map(|views| loan_marks(views))
            .collect();
        for officer_id in books.keys() {
            if self.ledger.officer(officer_id).is_none() {
                let err = AggregationError::UnknownOfficer(officer_id.clone());
                run.fail(SnapshotEntity::Officer, officer_id, &err);
            }
        }

        let work: Vec<(Officer, Result<Vec<LoanView>, AggregationError>)> = self
            .ledger
            .officers()
            .into_iter()
            .filter(|o| o.active)
            .map(|o| {
                let book = books.remove(&o.id).unwrap_or_else(|| Ok(Vec::new()));
                (o, book)
            })
            .collect();

        let results: Vec<(Officer, Result<OfficerMetricSnapshot, AggregationError>)> = work
            .into_par_iter()
            .map(|(officer, book)| {
                let snapshot =
                    book.and_then(|loans| self.officer_snapshot(&officer, &loans, &ctx, run.id));
                (officer, snapshot)
            })
            .collect();

        let mut by_branch: BTreeMap<BranchId, Vec<(Officer, Option<OfficerInputs>)>> =
            BTreeMap::new();
        for (officer, result) in results {
            match result {
                Ok(snapshot) => {
                    let inputs = snapshot.inputs.clone();
                    self.snapshots.record_officer(snapshot);
                    run.officers_succeeded.push(officer.id.clone());
                    by_branch
                        .entry(officer.branch_id.clone())
                        .or_default()
                        .push((officer, Some(inputs)));
                }
                Err(err) => {
                    warn!("officer {} failed for {}: {}", officer.id, date, err);
                    run.fail(SnapshotEntity::Officer, &officer.id, &err);
                    by_branch.entry(officer.branch_id.clone()).or_default().push((officer, None));
                }
            }
        }

        for (branch, members) in by_branch {
            match self.branch_snapshot(&branch, &members, &ctx, run.id) {
                Ok(snapshot) => {
                    self.snapshots.record_branch(snapshot);
                    run.branches_succeeded.push(branch);
                }
                Err(err) => {
                    warn!("branch {} failed for {}: {}", branch, date, err);
                    run.fail(SnapshotEntity::Branch, &branch, &err);
                }
            }
        }

        self.snapshots.record_loan_marks(date, marks);

        let status = if run.failures.is_empty() {
            RunStatus::Completed
        } else if run.succeeded() == 0 {
            RunStatus::Failed
        } else {
            RunStatus::PartiallyCompleted
        };
        run.transition(status);
        run.finished_at = Some(Utc::now());
        run.overran = started.elapsed() > self.config.scheduler.overrun_threshold();
        if run.overran {
            warn!(
                "aggregation run {} for {} exceeded {}s",
                run.id, date, self.config.scheduler.overrun_threshold_secs
            );
        }
        info!(
            "aggregation run {} finished for {}: {} ({} ok, {} failed)",
            run.id,
            date,
            run.status,
            run.succeeded(),
            run.failed()
        );

        self.runs.write().push(run.clone());
        Ok(run)
    }

    /// Point-in-time copies of an officer's loans. The live derived state in
    /// the ledger is left as it is.
    fn book_as_of(
        &self,
        officer: &OfficerId,
        views: &[LoanView],
        date: NaiveDate,
    ) -> Result<Vec<LoanView>, AggregationError> {
        let engine = self.ledger.engine();
        views
            .iter()
            .map(|view| {
                view.as_of(engine, date)
                    .map_err(|source| AggregationError::MissingDerivedState {
                        officer: officer.clone(),
                        loan: view.loan.id.clone(),
                        date,
                        source,
                    })
            })
            .collect()
    }

    fn officer_snapshot(
        &self,
        officer: &Officer,
        loans: &[LoanView],
        ctx: &PeriodContext<'_>,
        run_id: Uuid,
    ) -> Result<OfficerMetricSnapshot, AggregationError> {
        let prev_dpd1to6 = self
            .snapshots
            .previous_officer_snapshot(&officer.id, ctx.calculation_date)
            .map(|s| s.inputs.dpd1to6_balance)
            .unwrap_or(Decimal::ZERO);
        let inputs = collect_officer_inputs(loans, ctx, prev_dpd1to6);
        let metrics = formulas::compute(&inputs, &self.config.risk_weights);

        Ok(OfficerMetricSnapshot {
            officer_id: officer.id.clone(),
            officer_name: officer.name.clone(),
            branch_id: officer.branch_id.clone(),
            region: officer.region.clone(),
            calculation_date: ctx.calculation_date,
            period_start: ctx.period_start,
            run_id,
            inputs,
            metrics,
            created_at: Utc::now(),
        })
    }

    /// Ratio of sums over the branch's officers; any failed officer fails the branch.
    fn branch_snapshot(
        &self,
        branch: &BranchId,
        members: &[(Officer, Option<OfficerInputs>)],
        ctx: &PeriodContext<'_>,
        run_id: Uuid,
    ) -> Result<BranchMetricSnapshot, AggregationError> {
        let Some((first, _)) = members.first() else {
            return Err(AggregationError::EmptyBranch(branch.clone()));
        };
        let failed: Vec<OfficerId> = members
            .iter()
            .filter(|(_, inputs)| inputs.is_none())
            .map(|(o, _)| o.id.clone())
            .collect();
        if !failed.is_empty() {
            return Err(AggregationError::IncompleteBranch {
                branch: branch.clone(),
                failed,
            });
        }

        let mut inputs = OfficerInputs::default();
        for (_, officer_inputs) in members {
            if let Some(i) = officer_inputs {
                inputs += i;
            }
        }
        let metrics = formulas::compute(&inputs, &self.config.risk_weights);

        Ok(BranchMetricSnapshot {
            branch_id: branch.clone(),
            region: first.region.clone(),
            calculation_date: ctx.calculation_date,
            period_start: ctx.period_start,
            run_id,
            officer_count: members.len(),
            inputs,
            metrics,
            created_at: Utc::now(),
        })
    }

    pub fn runs(&self) -> Vec<AggregationRun> {
        self.runs.read().clone()
    }

    pub fn runs_for(&self, date: NaiveDate) -> Vec<AggregationRun> {
        self.runs
            .read()
            .iter()
            .filter(|r| r.calculation_date == date)
            .cloned()
            .collect()
    }

    pub fn last_run(&self) -> Option<AggregationRun> {
        self.runs.read().last().cloned()
    }

    pub fn portfolio_summary(&self, date: NaiveDate) -> PortfolioSummary {
        PortfolioSummary::from_snapshots(date, &self.snapshots.officer_snapshots_on(date))
    }

    /// Run a pass for the ledger's current date every `interval` on a
    /// background thread, until the returned handle is stopped or dropped.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> PeriodicHandle {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || loop {
            let date = self.ledger.today();
            // Roll live loan state forward to today; passes themselves never write it.
            self.ledger.recalculate_all(date);
            match self.run(date) {
                Ok(run) if run.status != RunStatus::Completed => {
                    warn!("periodic run for {} ended {}", date, run.status)
                }
                Ok(_) => {}
                Err(err) => warn!("periodic run for {} skipped: {}", date, err),
            }
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        PeriodicHandle {
            stop: Some(stop_tx),
            thread: Some(handle),
        }
    }
}

/// Handle to a background aggregation loop.
pub struct PeriodicHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicHandle {
    /// Signal the loop and wait for the in-flight pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("periodic aggregation thread panicked");
            }
        }
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::Components;
    use crate::core::loan::{Loan, LoanStatus};
    use crate::core::repayment::Repayment;
    use crate::engine::recalc::RecalculationEngine;
    use crate::metrics::formulas::RollDirection;
    use crate::ledger::clock::FixedClock;
    use rust_decimal_macros::dec;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn setup() -> (Arc<LedgerStore>, AggregationScheduler) {
        let ledger = Arc::new(LedgerStore::with_clock(
            RecalculationEngine::new(4),
            Arc::new(FixedClock::at_date(d(6, 30))),
        ));
        for (id, branch) in [("OFF-1", "IKEJA"), ("OFF-2", "IKEJA"), ("OFF-3", "WUSE")] {
            ledger
                .register_officer(Officer {
                    id: id.into(),
                    name: id.to_lowercase(),
                    branch_id: branch.into(),
                    region: "Lagos".into(),
                    active: true,
                })
                .unwrap();
        }
        for (loan, officer, branch, due) in [
            ("LN-1", "OFF-1", "IKEJA", d(6, 27)),
            ("LN-2", "OFF-2", "IKEJA", d(6, 10)),
            ("LN-3", "OFF-3", "WUSE", d(6, 29)),
        ] {
            ledger
                .create_loan(Loan {
                    id: loan.into(),
                    customer_id: "C".into(),
                    officer_id: officer.into(),
                    branch_id: branch.into(),
                    principal: dec!(10000),
                    fee_amount: dec!(200),
                    interest_rate: dec!(0.3),
                    disbursement_date: d(6, 1),
                    term_days: 60,
                    status: LoanStatus::Active,
                    channel: None,
                    first_payment_due_date: Some(due),
                    updated_at: Utc::now(),
                })
                .unwrap();
        }
        let scheduler = AggregationScheduler::new(
            ledger.clone(),
            Arc::new(SnapshotStore::new()),
            EngineConfig::default(),
        );
        (ledger, scheduler)
    }

    #[test]
    fn test_run_completes_and_records_snapshots() {
        let (_, scheduler) = setup();
        let run = scheduler.run(d(6, 30)).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.officers_succeeded.len(), 3);
        assert_eq!(run.branches_succeeded.len(), 2);
        assert!(run.finished_at.is_some());

        let ikeja = scheduler
            .snapshots()
            .branch_snapshot(&"IKEJA".into(), d(6, 30))
            .unwrap();
        assert_eq!(ikeja.officer_count, 2);
        assert_eq!(ikeja.inputs.loans_disbursed, 2);
        assert_eq!(ikeja.metrics.fimr, dec!(0.5));
    }

    #[test]
    fn test_rerun_same_date_overwrites() {
        let (_, scheduler) = setup();
        scheduler.run(d(6, 30)).unwrap();
        scheduler.run(d(6, 30)).unwrap();
        assert_eq!(scheduler.snapshots().officer_row_count(), 3);
        assert_eq!(scheduler.snapshots().branch_row_count(), 2);
        assert_eq!(scheduler.runs_for(d(6, 30)).len(), 2);
    }

    #[test]
    fn test_date_guard_blocks_concurrent_pass() {
        let (_, scheduler) = setup();
        let guard = DateRunGuard::acquire(&scheduler.in_flight, d(6, 30)).unwrap();
        assert_eq!(
            scheduler.run(d(6, 30)).unwrap_err(),
            AggregationError::RunInProgress(d(6, 30))
        );
        // Other dates are unaffected.
        assert!(scheduler.run(d(6, 29)).is_ok());
        drop(guard);
        assert!(scheduler.run(d(6, 30)).is_ok());
    }

    #[test]
    fn test_roll_between_runs() {
        let (_, scheduler) = setup();
        // LN-1 is at DPD 3 on 30 June and DPD 10 on 7 July.
        scheduler.run(d(6, 30)).unwrap();
        scheduler.run(d(7, 7)).unwrap();
        let snap = scheduler
            .snapshots()
            .officer_snapshot(&"OFF-1".into(), d(7, 7))
            .unwrap();
        assert_eq!(snap.inputs.prev_dpd1to6_balance, dec!(10000));
        assert_eq!(snap.inputs.moved_to_7to30, dec!(10000));
        assert_eq!(snap.metrics.roll, Decimal::ONE);
        assert_eq!(snap.inputs.loans_worsening, 1);
        assert_eq!(snap.metrics.roll_trend, RollDirection::Worsening);
    }

    #[test]
    fn test_status_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::PartiallyCompleted));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn test_periodic_handle_stops() {
        let (_, scheduler) = setup();
        let scheduler = Arc::new(scheduler);
        let handle = scheduler.clone().spawn_periodic(Duration::from_secs(3600));
        handle.stop();
        assert_eq!(scheduler.runs().len(), 1);
    }

    fn corrupt(ledger: &LedgerStore, id: &str, loan: &str) {
        let bad = Repayment::new(
            id.into(),
            loan.into(),
            d(6, 20),
            Components::new(dec!(500), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        )
        .with_amount(dec!(900));
        ledger.push_unchecked_repayment(bad);
    }

    #[test]
    fn test_past_date_leaves_live_state_alone() {
        let (ledger, scheduler) = setup();
        ledger
            .create_repayment(
                Repayment::new(
                    "RP-1".into(),
                    "LN-3".into(),
                    d(6, 29),
                    Components::new(dec!(1000), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
                )
                .with_channel("card"),
            )
            .unwrap();
        let live = ledger.loan_view(&"LN-2".into()).unwrap();
        assert_eq!(live.derived.as_of, d(6, 30));
        assert_eq!(live.derived.current_dpd, 20);

        // Retrying an earlier date twice, as after a partial run.
        scheduler.run(d(6, 15)).unwrap();
        scheduler.run(d(6, 15)).unwrap();

        let after = ledger.loan_view(&"LN-2".into()).unwrap();
        assert_eq!(after.derived.as_of, d(6, 30));
        assert_eq!(after.derived.current_dpd, 20);
        assert_eq!(after.derived, live.derived);

        let snapshots = scheduler.snapshots();
        let off2 = snapshots.officer_snapshot(&"OFF-2".into(), d(6, 15)).unwrap();
        assert_eq!(off2.inputs.dpd1to6_balance, dec!(10000));
        // A repayment dated after the calculation date is not counted.
        let off3 = snapshots.officer_snapshot(&"OFF-3".into(), d(6, 15)).unwrap();
        assert_eq!(off3.inputs.total_collected, Decimal::ZERO);
        assert_eq!(off3.inputs.total_portfolio, dec!(10000));
    }

    #[test]
    fn test_failed_officer_gives_partial_run() {
        let (ledger, scheduler) = setup();
        corrupt(&ledger, "RP-BAD", "LN-1");

        let run = scheduler.run(d(6, 30)).unwrap();
        assert_eq!(run.status, RunStatus::PartiallyCompleted);
        let expected: Vec<OfficerId> = vec!["OFF-2".into(), "OFF-3".into()];
        assert_eq!(run.officers_succeeded, expected);
        assert_eq!(run.branches_succeeded, vec![BranchId::from("WUSE")]);
        assert_eq!(run.failed(), 2);

        let officer = &run.failures[0];
        assert_eq!(officer.entity, SnapshotEntity::Officer);
        assert_eq!(officer.id, "OFF-1");
        assert_eq!(officer.code, ErrorCode::AggregationFailed);
        assert!(officer.message.contains("LN-1"));
        let branch = &run.failures[1];
        assert_eq!(branch.entity, SnapshotEntity::Branch);
        assert_eq!(branch.id, "IKEJA");
        assert_eq!(branch.code, ErrorCode::AggregationFailed);

        let snapshots = scheduler.snapshots();
        assert!(snapshots.officer_snapshot(&"OFF-1".into(), d(6, 30)).is_none());
        assert!(snapshots.branch_snapshot(&"IKEJA".into(), d(6, 30)).is_none());
        assert!(snapshots.branch_snapshot(&"WUSE".into(), d(6, 30)).is_some());

        // Reversing the bad record and re-running the date completes it.
        ledger
            .reverse_repayment(&"RP-BAD".into(), d(6, 21), Some("bad posting".into()))
            .unwrap();
        let retry = scheduler.run(d(6, 30)).unwrap();
        assert_eq!(retry.status, RunStatus::Completed);
        assert!(snapshots.branch_snapshot(&"IKEJA".into(), d(6, 30)).is_some());
        assert_eq!(snapshots.officer_row_count(), 3);
    }

    #[test]
    fn test_every_officer_failing_fails_the_run() {
        let (ledger, scheduler) = setup();
        for (id, loan) in [("RP-B1", "LN-1"), ("RP-B2", "LN-2"), ("RP-B3", "LN-3")] {
            corrupt(&ledger, id, loan);
        }
        let run = scheduler.run(d(6, 30)).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.succeeded(), 0);
        assert_eq!(run.failed(), 5);
        assert_eq!(scheduler.snapshots().officer_row_count(), 0);
        assert_eq!(scheduler.last_run().unwrap().status, RunStatus::Failed);
    }
}
