use crate::core::error::{EntityKind, LedgerError, RecalcError};
use crate::core::ids::{LoanId, OfficerId, RepaymentId};
use crate::core::loan::{Loan, LoanStatus, Officer};
use crate::core::repayment::{Repayment, Reversal};
use crate::core::schedule::ScheduleInstallment;
use crate::engine::derived::DerivedLoanState;
use crate::engine::recalc::{LoanFacts, RecalculationEngine};
use crate::ledger::clock::{Clock, SystemClock};
use crate::ledger::ingest::{BatchReport, IngestOutcome, LedgerBatch, RepaymentInput, ReversalInput};
use chrono::NaiveDate;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// All ledger facts of one loan together with the derived state computed from them.
#[derive(Debug, Clone)]
struct LoanRecord {
    loan: Loan,
    repayments: Vec<Repayment>,
    schedule: Vec<ScheduleInstallment>,
    derived: DerivedLoanState,
}

impl LoanRecord {
    fn facts(&self) -> LoanFacts<'_> {
        LoanFacts::new(&self.loan, &self.repayments, &self.schedule)
    }

    fn view(&self) -> LoanView {
        LoanView {
            loan: self.loan.clone(),
            derived: self.derived.clone(),
            schedule: self.schedule.clone(),
            repayments: self.repayments.clone(),
        }
    }
}

/// Read-only copy of one loan, its facts and its derived state, taken under
/// the loan's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanView {
    pub loan: Loan,
    pub derived: DerivedLoanState,
    pub schedule: Vec<ScheduleInstallment>,
    pub repayments: Vec<Repayment>,
}

impl LoanView {
    /// Non-reversed repayments dated within `[from, to]`.
    pub fn repayments_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Iterator<Item = &Repayment> {
        self.repayments
            .iter()
            .filter(move |r| !r.is_reversed() && r.payment_date() >= from && r.payment_date() <= to)
    }

    pub fn principal_outstanding(&self) -> Decimal {
        self.derived.outstanding.principal
    }

    /// The loan as it stood at the end of `date`, recomputed from the
    /// repayments and reversals known by then. The ledger is not touched.
    pub fn as_of(
        &self,
        engine: &RecalculationEngine,
        date: NaiveDate,
    ) -> Result<LoanView, RecalcError> {
        let repayments: Vec<Repayment> =
            self.repayments.iter().filter_map(|r| r.as_of(date)).collect();
        let previous = (self.derived.as_of <= date).then_some(&self.derived);
        let derived = engine.recompute(
            LoanFacts::new(&self.loan, &repayments, &self.schedule),
            previous,
            date,
        )?;
        Ok(LoanView {
            loan: self.loan.clone(),
            derived,
            schedule: self.schedule.clone(),
            repayments,
        })
    }
}

/// The ledger store.
///
/// Holds officers, loans, schedules and repayments, and is the only writer of
/// derived loan state. Every mutating write stages the new fact, recomputes the
/// loan through the [`RecalculationEngine`] and commits fact and state together
/// only when recomputation succeeds.
///
/// Each loan sits behind its own mutex, so writes to the same loan are
/// serialized while writes to different loans proceed in parallel.
pub struct LedgerStore {
    engine: RecalculationEngine,
    clock: Arc<dyn Clock>,
    officers: RwLock<BTreeMap<OfficerId, Officer>>,
    loans: RwLock<BTreeMap<LoanId, Arc<Mutex<LoanRecord>>>>,
    repayment_index: RwLock<HashMap<RepaymentId, LoanId>>,
}

impl LedgerStore {
    pub fn new(engine: RecalculationEngine) -> Self {
        Self::with_clock(engine, Arc::new(SystemClock))
    }

    pub fn with_clock(engine: RecalculationEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            officers: RwLock::new(BTreeMap::new()),
            loans: RwLock::new(BTreeMap::new()),
            repayment_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &RecalculationEngine {
        &self.engine
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // --- Writes ---

    pub fn register_officer(&self, officer: Officer) -> Result<IngestOutcome, LedgerError> {
        if officer.id.as_str().trim().is_empty() {
            return Err(LedgerError::validation(
                EntityKind::Officer,
                &officer.id,
                "empty identifier",
            ));
        }
        if officer.branch_id.as_str().trim().is_empty() {
            return Err(LedgerError::validation(EntityKind::Officer, &officer.id, "missing branch"));
        }

        let mut officers = self.officers.write();
        if let Some(existing) = officers.get(&officer.id) {
            return if *existing == officer {
                Ok(IngestOutcome::Unchanged)
            } else {
                Err(LedgerError::DuplicateIdentifier {
                    entity: EntityKind::Officer,
                    id: officer.id.to_string(),
                })
            };
        }
        debug!("registered officer {} ({})", officer.id, officer.branch_id);
        officers.insert(officer.id.clone(), officer);
        Ok(IngestOutcome::Created)
    }

    pub fn create_loan(&self, mut loan: Loan) -> Result<IngestOutcome, LedgerError> {
        validate_loan(&loan)?;
        match self.officers.read().get(&loan.officer_id) {
            None => {
                return Err(LedgerError::Referential {
                    entity: EntityKind::Loan,
                    id: loan.id.to_string(),
                    target: EntityKind::Officer,
                    target_id: loan.officer_id.to_string(),
                })
            }
            Some(officer) if officer.branch_id != loan.branch_id => {
                return Err(LedgerError::validation(
                    EntityKind::Loan,
                    &loan.id,
                    format!(
                        "branch {} does not match officer {} branch {}",
                        loan.branch_id, officer.id, officer.branch_id
                    ),
                ))
            }
            Some(_) => {}
        }

        let mut loans = self.loans.write();
        if let Some(existing) = loans.get(&loan.id) {
            return if existing.lock().loan.same_facts(&loan) {
                Ok(IngestOutcome::Unchanged)
            } else {
                Err(LedgerError::DuplicateIdentifier {
                    entity: EntityKind::Loan,
                    id: loan.id.to_string(),
                })
            };
        }

        loan.updated_at = self.clock.now();
        let derived = self
            .engine
            .recompute(LoanFacts::new(&loan, &[], &[]), None, self.clock.today())?;
        debug!("created loan {} for officer {}", loan.id, loan.officer_id);
        loans.insert(
            loan.id.clone(),
            Arc::new(Mutex::new(LoanRecord {
                loan,
                repayments: Vec::new(),
                schedule: Vec::new(),
                derived,
            })),
        );
        Ok(IngestOutcome::Created)
    }

    pub fn create_schedule_installment(
        &self,
        installment: ScheduleInstallment,
    ) -> Result<IngestOutcome, LedgerError> {
        let id = format!("{}#{}", installment.loan_id, installment.sequence);
        if installment.due.has_negative() {
            let reason = "negative amount due";
            return Err(LedgerError::validation(EntityKind::Installment, &id, reason));
        }
        let handle = self.loan_handle(&installment.loan_id).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Installment,
            id: id.clone(),
            target: EntityKind::Loan,
            target_id: installment.loan_id.to_string(),
        })?;

        let mut record = handle.lock();
        if let Some(existing) = record
            .schedule
            .iter()
            .find(|i| i.sequence == installment.sequence)
        {
            return if existing.same_facts(&installment) {
                Ok(IngestOutcome::Unchanged)
            } else {
                Err(LedgerError::DuplicateIdentifier {
                    entity: EntityKind::Installment,
                    id,
                })
            };
        }

        let mut schedule = record.schedule.clone();
        schedule.push(installment);
        schedule.sort_by_key(|i| i.sequence);
        self.commit(&mut record, None, Some(schedule))?;
        Ok(IngestOutcome::Created)
    }

    /// Ingest a repayment with a reported component breakdown.
    pub fn create_repayment(&self, repayment: Repayment) -> Result<IngestOutcome, LedgerError> {
        validate_repayment(&repayment)?;
        let handle = self.loan_handle(repayment.loan_id()).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Repayment,
            id: repayment.id().to_string(),
            target: EntityKind::Loan,
            target_id: repayment.loan_id().to_string(),
        })?;

        let mut record = handle.lock();
        {
            let mut index = self.repayment_index.write();
            if let Some(owner) = index.get(repayment.id()) {
                let identical = owner == repayment.loan_id()
                    && record
                        .repayments
                        .iter()
                        .any(|r| r.id() == repayment.id() && r.same_facts(&repayment));
                return if identical {
                    Ok(IngestOutcome::Unchanged)
                } else {
                    Err(LedgerError::DuplicateIdentifier {
                        entity: EntityKind::Repayment,
                        id: repayment.id().to_string(),
                    })
                };
            }
            // Reserve the id; released below if recomputation rejects the write.
            index.insert(repayment.id().clone(), repayment.loan_id().clone());
        }

        let id = repayment.id().clone();
        let mut repayments = record.repayments.clone();
        repayments.push(repayment);
        if let Err(err) = self.commit(&mut record, Some(repayments), None) {
            self.repayment_index.write().remove(&id);
            return Err(err);
        }
        Ok(IngestOutcome::Created)
    }

    /// Ingest a repayment as delivered upstream, estimating the component
    /// split when it is missing. Returns whether the split was estimated.
    pub fn ingest_repayment(
        &self,
        input: RepaymentInput,
    ) -> Result<(IngestOutcome, bool), LedgerError> {
        let handle = self.loan_handle(&input.loan_id).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Repayment,
            id: input.id.to_string(),
            target: EntityKind::Loan,
            target_id: input.loan_id.to_string(),
        })?;
        let loan = handle.lock().loan.clone();
        let repayment = input.into_repayment(&loan);
        let estimated = repayment.components_estimated();
        let outcome = self.create_repayment(repayment)?;
        Ok((outcome, estimated && outcome == IngestOutcome::Created))
    }

    /// Flag a repayment as reversed and recompute its loan. The repayment's
    /// amounts are left untouched. Reversing twice is a no-op.
    pub fn reverse_repayment(
        &self,
        repayment_id: &RepaymentId,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<IngestOutcome, LedgerError> {
        let loan_id = self
            .repayment_index
            .read()
            .get(repayment_id)
            .cloned()
            .ok_or_else(|| LedgerError::Referential {
                entity: EntityKind::Repayment,
                id: repayment_id.to_string(),
                target: EntityKind::Repayment,
                target_id: repayment_id.to_string(),
            })?;
        let handle = self.loan_handle(&loan_id).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Repayment,
            id: repayment_id.to_string(),
            target: EntityKind::Loan,
            target_id: loan_id.to_string(),
        })?;

        let mut record = handle.lock();
        let mut repayments = record.repayments.clone();
        let Some(target) = repayments.iter_mut().find(|r| r.id() == repayment_id) else {
            return Err(LedgerError::Referential {
                entity: EntityKind::Repayment,
                id: repayment_id.to_string(),
                target: EntityKind::Loan,
                target_id: loan_id.to_string(),
            });
        };
        if target.is_reversed() {
            return Ok(IngestOutcome::Unchanged);
        }
        target.mark_reversed(Reversal { date, reason });
        self.commit(&mut record, Some(repayments), None)?;
        info!("reversed repayment {} on loan {}", repayment_id, loan_id);
        Ok(IngestOutcome::Updated)
    }

    pub fn set_loan_status(
        &self,
        loan_id: &LoanId,
        status: LoanStatus,
    ) -> Result<IngestOutcome, LedgerError> {
        let handle = self.loan_handle(loan_id).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Loan,
            id: loan_id.to_string(),
            target: EntityKind::Loan,
            target_id: loan_id.to_string(),
        })?;
        let mut record = handle.lock();
        if record.loan.status == status {
            return Ok(IngestOutcome::Unchanged);
        }

        let mut staged = record.loan.clone();
        staged.status = status;
        let derived = self.engine.recompute(
            LoanFacts::new(&staged, &record.repayments, &record.schedule),
            Some(&record.derived),
            self.clock.today(),
        )?;
        staged.updated_at = self.clock.now();
        record.loan = staged;
        apply_derived(&mut record, derived, self.clock.now());
        Ok(IngestOutcome::Updated)
    }

    /// Recompute one loan as of today.
    pub fn recalculate_loan(&self, loan_id: &LoanId) -> Result<DerivedLoanState, LedgerError> {
        let handle = self.loan_handle(loan_id).ok_or_else(|| LedgerError::Referential {
            entity: EntityKind::Loan,
            id: loan_id.to_string(),
            target: EntityKind::Loan,
            target_id: loan_id.to_string(),
        })?;
        self.recalculate_record(&handle, self.clock.today())
    }

    /// Recompute every loan as of `as_of`, in parallel across loans.
    ///
    /// A loan whose facts fail recomputation keeps its prior state; its error
    /// is returned alongside its id.
    pub fn recalculate_all(&self, as_of: NaiveDate) -> Vec<(LoanId, LedgerError)> {
        let handles: Vec<(LoanId, Arc<Mutex<LoanRecord>>)> = self
            .loans
            .read()
            .iter()
            .map(|(id, h)| (id.clone(), Arc::clone(h)))
            .collect();

        let failures: Vec<(LoanId, LedgerError)> = handles
            .par_iter()
            .filter_map(|(id, handle)| {
                self.recalculate_record(handle, as_of)
                    .err()
                    .map(|e| (id.clone(), e))
            })
            .collect();

        for (id, err) in &failures {
            warn!("recalculation of loan {} failed: {}", id, err);
        }
        info!(
            "recalculated {} loans as of {} ({} failed)",
            handles.len(),
            as_of,
            failures.len()
        );
        failures
    }

    /// Apply a batch, record by record. Sections run in dependency order.
    pub fn ingest_batch(&self, batch: LedgerBatch) -> BatchReport {
        let mut report = BatchReport::default();

        for officer in batch.officers {
            let id = officer.id.clone();
            report.record(EntityKind::Officer, id, self.register_officer(officer));
        }
        for loan in batch.loans {
            let id = loan.id.clone();
            report.record(EntityKind::Loan, id, self.create_loan(loan));
        }
        for installment in batch.schedule {
            let id = format!("{}#{}", installment.loan_id, installment.sequence);
            let outcome = self.create_schedule_installment(installment);
            report.record(EntityKind::Installment, id, outcome);
        }
        for input in batch.repayments {
            let id = input.id.clone();
            let result = self.ingest_repayment(input).map(|(outcome, estimated)| {
                if estimated {
                    report.estimated_components += 1;
                }
                outcome
            });
            report.record(EntityKind::Repayment, id, result);
        }
        for ReversalInput {
            repayment_id,
            date,
            reason,
        } in batch.reversals
        {
            let result = self.reverse_repayment(&repayment_id, date, reason);
            report.record(EntityKind::Repayment, repayment_id, result);
        }

        for failure in &report.failures {
            warn!(
                "rejected {} {}: {} ({})",
                failure.entity, failure.id, failure.message, failure.code
            );
        }
        info!(
            "ingested batch: {} processed, {} failed",
            report.processed,
            report.failed()
        );
        report
    }

    pub fn ingest_loans(&self, loans: Vec<Loan>) -> BatchReport {
        self.ingest_batch(LedgerBatch {
            loans,
            ..Default::default()
        })
    }

    pub fn ingest_schedule(&self, schedule: Vec<ScheduleInstallment>) -> BatchReport {
        self.ingest_batch(LedgerBatch {
            schedule,
            ..Default::default()
        })
    }

    pub fn ingest_repayments(&self, repayments: Vec<RepaymentInput>) -> BatchReport {
        self.ingest_batch(LedgerBatch {
            repayments,
            ..Default::default()
        })
    }

    // --- Reads ---

    pub fn officers(&self) -> Vec<Officer> {
        self.officers.read().values().cloned().collect()
    }

    pub fn officer(&self, id: &OfficerId) -> Option<Officer> {
        self.officers.read().get(id).cloned()
    }

    pub fn loan_count(&self) -> usize {
        self.loans.read().len()
    }

    pub fn loan_view(&self, id: &LoanId) -> Option<LoanView> {
        self.loan_handle(id).map(|h| h.lock().view())
    }

    /// Every loan, each copied under its own lock.
    pub fn loan_views(&self) -> Vec<LoanView> {
        self.handles().iter().map(|h| h.lock().view()).collect()
    }

    /// Loans grouped by officer.
    pub fn officer_views(&self) -> BTreeMap<OfficerId, Vec<LoanView>> {
        let mut grouped: BTreeMap<OfficerId, Vec<LoanView>> = BTreeMap::new();
        for view in self.loan_views() {
            grouped.entry(view.loan.officer_id.clone()).or_default().push(view);
        }
        grouped
    }

    pub fn loans_for_officer(&self, officer: &OfficerId) -> Vec<LoanView> {
        self.handles()
            .iter()
            .filter_map(|h| {
                let record = h.lock();
                (record.loan.officer_id == *officer).then(|| record.view())
            })
            .collect()
    }

    /// Append a repayment without validation or recomputation, standing in
    /// for a record corrupted in storage.
    #[cfg(test)]
    pub(crate) fn push_unchecked_repayment(&self, repayment: Repayment) {
        if let Some(handle) = self.loan_handle(repayment.loan_id()) {
            self.repayment_index
                .write()
                .insert(repayment.id().clone(), repayment.loan_id().clone());
            handle.lock().repayments.push(repayment);
        }
    }

    // --- Internals ---

    fn loan_handle(&self, id: &LoanId) -> Option<Arc<Mutex<LoanRecord>>> {
        self.loans.read().get(id).map(Arc::clone)
    }

    fn handles(&self) -> Vec<Arc<Mutex<LoanRecord>>> {
        self.loans.read().values().map(Arc::clone).collect()
    }

    fn recalculate_record(
        &self,
        handle: &Mutex<LoanRecord>,
        as_of: NaiveDate,
    ) -> Result<DerivedLoanState, LedgerError> {
        let mut record = handle.lock();
        let derived = self
            .engine
            .recompute(record.facts(), Some(&record.derived), as_of)?;
        apply_derived(&mut record, derived.clone(), self.clock.now());
        Ok(derived)
    }

    /// Recompute with staged facts and commit them only on success.
    fn commit(
        &self,
        record: &mut LoanRecord,
        repayments: Option<Vec<Repayment>>,
        schedule: Option<Vec<ScheduleInstallment>>,
    ) -> Result<(), LedgerError> {
        let derived = {
            let staged_repayments = repayments.as_deref().unwrap_or(&record.repayments);
            let staged_schedule = schedule.as_deref().unwrap_or(&record.schedule);
            self.engine.recompute(
                LoanFacts::new(&record.loan, staged_repayments, staged_schedule),
                Some(&record.derived),
                self.clock.today(),
            )?
        };

        if let Some(r) = repayments {
            record.repayments = r;
        }
        if let Some(s) = schedule {
            record.schedule = s;
        }
        let now = self.clock.now();
        record.loan.updated_at = now;
        apply_derived(record, derived, now);
        Ok(())
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(RecalculationEngine::default())
    }
}

/// Write derived state back, including per-installment progress.
fn apply_derived(
    record: &mut LoanRecord,
    derived: DerivedLoanState,
    now: chrono::DateTime<chrono::Utc>,
) {
    for inst in record.schedule.iter_mut() {
        if let Some(progress) = derived.installments.iter().find(|p| p.sequence == inst.sequence) {
            if inst.amount_paid != progress.amount_paid || inst.status != progress.status {
                inst.amount_paid = progress.amount_paid;
                inst.status = progress.status;
                inst.updated_at = now;
            }
        }
    }
    record.derived = derived;
}

fn validate_loan(loan: &Loan) -> Result<(), LedgerError> {
    let fail = |reason: &str| Err(LedgerError::validation(EntityKind::Loan, &loan.id, reason));
    if loan.id.as_str().trim().is_empty() {
        return fail("empty identifier");
    }
    if loan.principal <= Decimal::ZERO {
        return fail("principal must be positive");
    }
    if loan.fee_amount < Decimal::ZERO || loan.interest_rate < Decimal::ZERO {
        return fail("fee and interest rate must be non-negative");
    }
    if loan.term_days == 0 {
        return fail("term_days must be positive");
    }
    Ok(())
}

fn validate_repayment(repayment: &Repayment) -> Result<(), LedgerError> {
    let fail = |reason: &str| {
        Err(LedgerError::validation(
            EntityKind::Repayment,
            repayment.id(),
            reason,
        ))
    };
    if repayment.id().as_str().trim().is_empty() {
        return fail("empty identifier");
    }
    if repayment.is_reversed() {
        return fail("a new repayment cannot arrive reversed; reverse the original instead");
    }
    if repayment.amount() <= Decimal::ZERO {
        return fail("amount must be positive");
    }
    if repayment.components().has_negative() || repayment.waiver_amount() < Decimal::ZERO {
        return fail("negative component");
    }
    if !repayment.is_component_sum_valid() {
        return Err(LedgerError::ComponentSumMismatch {
            id: repayment.id().clone(),
            amount: repayment.amount(),
            components: repayment.components().total(),
        });
    }
    Ok(())
}
