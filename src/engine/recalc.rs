use crate::core::amount::{floor_zero, Components};
use crate::core::error::RecalcError;
use crate::core::loan::Loan;
use crate::core::repayment::Repayment;
use crate::core::schedule::{InstallmentStatus, ScheduleInstallment};
use crate::engine::derived::{DelinquencyTags, DerivedLoanState, InstallmentProgress};
use chrono::{Duration, NaiveDate};
use log::debug;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Ledger facts of one loan, as seen by a single recomputation.
///
/// `repayments` may include reversed repayments; they are skipped.
#[derive(Debug, Clone, Copy)]
pub struct LoanFacts<'a> {
    pub loan: &'a Loan,
    pub repayments: &'a [Repayment],
    pub schedule: &'a [ScheduleInstallment],
}

impl<'a> LoanFacts<'a> {
    pub fn new(
        loan: &'a Loan,
        repayments: &'a [Repayment],
        schedule: &'a [ScheduleInstallment],
    ) -> Self {
        Self {
            loan,
            repayments,
            schedule,
        }
    }

    fn active_repayments(&self) -> impl Iterator<Item = &'a Repayment> {
        self.repayments.iter().filter(|r| !r.is_reversed())
    }
}

/// The recalculation engine.
///
/// Turns a loan's ledger facts into a complete [`DerivedLoanState`]. The
/// engine keeps no state between calls: the only carried-over value is the
/// previous `max_dpd_ever`, which the caller passes back in.
#[derive(Debug, Clone, Copy)]
pub struct RecalculationEngine {
    grace_period_days: u32,
}

impl Default for RecalculationEngine {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GRACE_PERIOD_DAYS)
    }
}

impl RecalculationEngine {
    pub fn new(grace_period_days: u32) -> Self {
        Self { grace_period_days }
    }

    pub fn grace_period_days(&self) -> u32 {
        self.grace_period_days
    }

    /// Recompute the derived state of one loan as of `as_of`.
    ///
    /// Fails without producing any state when the facts are malformed.
    pub fn recompute(
        &self,
        facts: LoanFacts<'_>,
        previous: Option<&DerivedLoanState>,
        as_of: NaiveDate,
    ) -> Result<DerivedLoanState, RecalcError> {
        validate(&facts)?;
        let loan = facts.loan;

        let paid: Components = facts.active_repayments().map(|r| *r.components()).sum();
        let expected = loan.expected_components();
        let outstanding = expected.outstanding_after(&paid);
        let total_outstanding = outstanding.scheduled_total();

        let first_due = facts
            .schedule
            .iter()
            .map(|i| i.due_date)
            .min()
            .or(loan.first_payment_due_date);
        let first_received = facts.active_repayments().map(|r| r.payment_date()).min();
        let last_payment = facts.active_repayments().map(|r| r.payment_date()).max();

        let first_payment_missed = self.first_payment_missed(first_due, first_received, as_of);
        let installments = apply_to_schedule(facts.schedule, paid.scheduled_total(), as_of);

        let current_dpd = if loan.is_closed() || total_outstanding.is_zero() {
            0
        } else if !installments.is_empty() {
            installments
                .iter()
                .find(|i| i.status == InstallmentStatus::Overdue)
                .map(|i| days_between(i.due_date, as_of))
                .unwrap_or(0)
        } else {
            match first_due {
                Some(due) => {
                    let since = last_payment.map_or(due, |paid_on| paid_on.max(due));
                    days_between(since, as_of)
                }
                None => 0,
            }
        };

        let max_dpd_ever = previous
            .map(|p| p.max_dpd_ever)
            .unwrap_or(0)
            .max(current_dpd);

        let state = DerivedLoanState {
            as_of,
            current_dpd,
            max_dpd_ever,
            first_payment_missed,
            first_payment_due_date: first_due,
            first_payment_received_date: first_received,
            last_payment_date: last_payment,
            paid,
            outstanding,
            total_outstanding,
            total_repaid: facts.active_repayments().map(Repayment::amount).sum(),
            waived_total: facts.active_repayments().map(Repayment::waiver_amount).sum(),
            days_since_last_repayment: last_payment.map(|d| days_between(d, as_of)),
            loan_age_days: days_between(loan.disbursement_date, as_of),
            tags: DelinquencyTags {
                first_installment_miss: first_payment_missed,
                early_indicator: (1..=6).contains(&current_dpd),
            },
            installments,
        };

        debug!(
            "recomputed loan {} as of {}: dpd={} max={} outstanding={}",
            loan.id, as_of, state.current_dpd, state.max_dpd_ever, state.total_outstanding
        );
        Ok(state)
    }

    /// Missed when nothing arrived within the grace period after the first due
    /// date, or the first payment arrived after it. No due date means no miss.
    fn first_payment_missed(
        &self,
        first_due: Option<NaiveDate>,
        first_received: Option<NaiveDate>,
        as_of: NaiveDate,
    ) -> bool {
        let Some(due) = first_due else {
            return false;
        };
        let grace = Duration::days(i64::from(self.grace_period_days));
        let Some(deadline) = due.checked_add_signed(grace) else {
            return false;
        };
        match first_received {
            Some(received) => received > deadline,
            None => as_of > deadline,
        }
    }
}

/// Apply the paid total to installments in sequence order, each capped at its
/// total due.
fn apply_to_schedule(
    schedule: &[ScheduleInstallment],
    paid_total: Decimal,
    as_of: NaiveDate,
) -> Vec<InstallmentProgress> {
    let mut ordered: Vec<&ScheduleInstallment> = schedule.iter().collect();
    ordered.sort_by_key(|i| i.sequence);

    let mut pool = floor_zero(paid_total);
    ordered
        .into_iter()
        .map(|inst| {
            let total_due = inst.total_due();
            let applied = pool.min(total_due);
            pool -= applied;

            let status = if applied >= total_due {
                InstallmentStatus::Paid
            } else if inst.due_date < as_of {
                InstallmentStatus::Overdue
            } else if applied > Decimal::ZERO {
                InstallmentStatus::Partial
            } else {
                InstallmentStatus::Pending
            };

            InstallmentProgress {
                sequence: inst.sequence,
                due_date: inst.due_date,
                total_due,
                amount_paid: applied,
                status,
            }
        })
        .collect()
}

fn days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    u32::try_from((to - from).num_days().max(0)).unwrap_or(u32::MAX)
}

fn validate(facts: &LoanFacts<'_>) -> Result<(), RecalcError> {
    let loan = facts.loan;
    if loan.principal < Decimal::ZERO
        || loan.fee_amount < Decimal::ZERO
        || loan.interest_rate < Decimal::ZERO
    {
        return Err(RecalcError::InvalidTerms {
            loan: loan.id.clone(),
            reason: "principal, fee and rate must be non-negative".into(),
        });
    }
    if loan.term_days == 0 {
        return Err(RecalcError::InvalidTerms {
            loan: loan.id.clone(),
            reason: "term_days must be positive".into(),
        });
    }

    for r in facts.repayments {
        if r.loan_id() != &loan.id {
            return Err(RecalcError::ForeignRecord {
                loan: loan.id.clone(),
                record: r.id().to_string(),
                owner: r.loan_id().clone(),
            });
        }
    }

    for r in facts.active_repayments() {
        if r.components().has_negative()
            || r.amount() < Decimal::ZERO
            || r.waiver_amount() < Decimal::ZERO
        {
            return Err(RecalcError::NegativeAmount {
                loan: loan.id.clone(),
                context: format!("repayment {}", r.id()),
            });
        }
        if !r.is_component_sum_valid() {
            return Err(RecalcError::ComponentSumMismatch {
                loan: loan.id.clone(),
                repayment: r.id().clone(),
                amount: r.amount(),
                components: r.components().total(),
            });
        }
    }

    let mut sequences = BTreeSet::new();
    for inst in facts.schedule {
        if inst.loan_id != loan.id {
            return Err(RecalcError::ForeignRecord {
                loan: loan.id.clone(),
                record: format!("installment #{}", inst.sequence),
                owner: inst.loan_id.clone(),
            });
        }
        if inst.due.has_negative() {
            return Err(RecalcError::NegativeAmount {
                loan: loan.id.clone(),
                context: format!("installment #{}", inst.sequence),
            });
        }
        if !sequences.insert(inst.sequence) {
            return Err(RecalcError::DuplicateInstallment {
                loan: loan.id.clone(),
                sequence: inst.sequence,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{LoanId, RepaymentId};
    use crate::core::loan::LoanStatus;
    use crate::core::repayment::Reversal;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn loan() -> Loan {
        Loan {
            id: LoanId::new("LN-1"),
            customer_id: "C-1".into(),
            officer_id: "OFF-1".into(),
            branch_id: "B-1".into(),
            principal: dec!(100000),
            fee_amount: dec!(2000),
            interest_rate: dec!(0.365),
            disbursement_date: d(2025, 4, 1),
            term_days: 60,
            status: LoanStatus::Active,
            channel: None,
            first_payment_due_date: None,
            updated_at: Utc::now(),
        }
    }

    fn repayment(id: &str, date: NaiveDate, principal: Decimal) -> Repayment {
        Repayment::new(
            RepaymentId::new(id),
            LoanId::new("LN-1"),
            date,
            Components::new(principal, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        )
    }

    fn installment(seq: u32, due: NaiveDate, principal: Decimal) -> ScheduleInstallment {
        ScheduleInstallment::new(
            LoanId::new("LN-1"),
            seq,
            due,
            Components::new(principal, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        )
    }

    #[test]
    fn test_overpayment_floors_outstanding() {
        let l = loan();
        let reps = vec![
            repayment("RP-1", d(2025, 4, 20), dec!(80000)),
            repayment("RP-2", d(2025, 5, 1), dec!(50000)),
        ];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &[]), None, d(2025, 5, 2))
            .unwrap();
        assert_eq!(state.paid.principal, dec!(130000));
        assert_eq!(state.outstanding.principal, Decimal::ZERO);
        let due = Components::new(dec!(100000), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(state.overpayment(&due), dec!(30000));
    }

    #[test]
    fn test_no_due_date_means_zero_dpd() {
        let l = loan();
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &[], &[]), None, d(2026, 1, 1))
            .unwrap();
        assert_eq!(state.current_dpd, 0);
        assert!(!state.first_payment_missed);
        assert!(state.first_payment_due_date.is_none());
    }

    #[test]
    fn test_late_first_payment_is_missed() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 4, 26), dec!(50000))];
        let reps = vec![repayment("RP-1", d(2025, 9, 26), dec!(1000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &schedule), None, d(2025, 10, 1))
            .unwrap();
        assert!(state.first_payment_missed);
        assert!(state.tags.first_installment_miss);
    }

    #[test]
    fn test_payment_within_grace_is_not_missed() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 4, 26), dec!(50000))];
        let reps = vec![repayment("RP-1", d(2025, 4, 30), dec!(50000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &schedule), None, d(2025, 5, 5))
            .unwrap();
        assert!(!state.first_payment_missed);
        assert_eq!(state.current_dpd, 0);
        assert_eq!(state.installments[0].status, InstallmentStatus::Paid);
    }

    #[test]
    fn test_unpaid_past_grace_is_missed() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 4, 26), dec!(50000))];
        let engine = RecalculationEngine::default();
        let within = engine
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2025, 4, 30))
            .unwrap();
        assert!(!within.first_payment_missed);
        let after = engine
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2025, 5, 1))
            .unwrap();
        assert!(after.first_payment_missed);
    }

    #[test]
    fn test_unbounded_grace_never_misses() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 4, 26), dec!(50000))];
        let state = RecalculationEngine::new(u32::MAX)
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2026, 4, 26))
            .unwrap();
        assert!(!state.first_payment_missed);
        assert_eq!(state.current_dpd, 365);
    }

    #[test]
    fn test_dpd_from_oldest_overdue_installment() {
        let l = loan();
        let schedule = vec![
            installment(1, d(2025, 5, 1), dec!(50000)),
            installment(2, d(2025, 5, 31), dec!(50000)),
        ];
        let reps = vec![repayment("RP-1", d(2025, 5, 1), dec!(50000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &schedule), None, d(2025, 6, 4))
            .unwrap();
        assert_eq!(state.installments[0].status, InstallmentStatus::Paid);
        assert_eq!(state.installments[1].status, InstallmentStatus::Overdue);
        assert_eq!(state.current_dpd, 4);
        assert!(state.tags.early_indicator);
    }

    #[test]
    fn test_partial_installment_not_yet_due() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 5, 1), dec!(50000))];
        let reps = vec![repayment("RP-1", d(2025, 4, 20), dec!(10000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &schedule), None, d(2025, 4, 25))
            .unwrap();
        assert_eq!(state.installments[0].status, InstallmentStatus::Partial);
        assert_eq!(state.installments[0].remaining(), dec!(40000));
        assert_eq!(state.current_dpd, 0);
    }

    #[test]
    fn test_dpd_without_schedule_uses_last_payment() {
        let mut l = loan();
        l.first_payment_due_date = Some(d(2025, 5, 1));
        let reps = vec![repayment("RP-1", d(2025, 5, 10), dec!(1000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &[]), None, d(2025, 5, 20))
            .unwrap();
        assert_eq!(state.current_dpd, 10);
    }

    #[test]
    fn test_closed_loan_has_zero_dpd() {
        let mut l = loan();
        l.status = LoanStatus::Closed;
        let schedule = vec![installment(1, d(2025, 5, 1), dec!(50000))];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2025, 7, 1))
            .unwrap();
        assert_eq!(state.current_dpd, 0);
    }

    #[test]
    fn test_max_dpd_never_decreases() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 5, 1), dec!(100000))];
        let engine = RecalculationEngine::default();
        let late = engine
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2025, 5, 21))
            .unwrap();
        assert_eq!(late.max_dpd_ever, 20);

        let reps = vec![repayment("RP-1", d(2025, 5, 22), dec!(100000))];
        let cured = engine
            .recompute(LoanFacts::new(&l, &reps, &schedule), Some(&late), d(2025, 5, 23))
            .unwrap();
        assert_eq!(cured.current_dpd, 0);
        assert_eq!(cured.max_dpd_ever, 20);
    }

    #[test]
    fn test_reversed_repayments_ignored() {
        let l = loan();
        let reps = vec![repayment("RP-1", d(2025, 4, 20), dec!(10000)).with_reversal(Reversal {
            date: d(2025, 4, 21),
            reason: None,
        })];
        let state = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &[]), None, d(2025, 5, 1))
            .unwrap();
        assert_eq!(state.total_repaid, Decimal::ZERO);
        assert!(state.first_payment_received_date.is_none());
    }

    #[test]
    fn test_idempotent() {
        let l = loan();
        let schedule = vec![installment(1, d(2025, 5, 1), dec!(50000))];
        let reps = vec![repayment("RP-1", d(2025, 5, 3), dec!(20000))];
        let engine = RecalculationEngine::default();
        let facts = LoanFacts::new(&l, &reps, &schedule);
        let a = engine.recompute(facts, None, d(2025, 5, 10)).unwrap();
        let b = engine.recompute(facts, Some(&a), d(2025, 5, 10)).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_rejects_component_mismatch() {
        let l = loan();
        let reps = vec![repayment("RP-1", d(2025, 4, 20), dec!(100)).with_amount(dec!(150))];
        let err = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &reps, &[]), None, d(2025, 5, 1))
            .unwrap_err();
        assert!(matches!(err, RecalcError::ComponentSumMismatch { .. }));
    }

    #[test]
    fn test_rejects_duplicate_sequence() {
        let l = loan();
        let schedule = vec![
            installment(1, d(2025, 5, 1), dec!(50000)),
            installment(1, d(2025, 5, 31), dec!(50000)),
        ];
        let err = RecalculationEngine::default()
            .recompute(LoanFacts::new(&l, &[], &schedule), None, d(2025, 5, 1))
            .unwrap_err();
        assert_eq!(
            err,
            RecalcError::DuplicateInstallment {
                loan: LoanId::new("LN-1"),
                sequence: 1
            }
        );
    }
}
