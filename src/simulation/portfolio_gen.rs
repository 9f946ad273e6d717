//! Synthetic loan books for demos, benchmarks and load testing.
//!
//! Each generated loan follows one repayment behaviour drawn at random, so a
//! book mixes healthy officers with ones that trip FIMR, PAR and channel
//! penalties. A fixed seed yields the same book every time.

use crate::core::amount::Components;
use crate::core::ids::{LoanId, OfficerId, RepaymentId};
use crate::core::loan::{Loan, LoanStatus, Officer};
use crate::core::schedule::ScheduleInstallment;
use crate::ledger::ingest::{LedgerBatch, RepaymentInput, ReversalInput};
use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const CHANNELS: [&str; 5] = ["ussd", "card", "bank_transfer", "wallet", "cash"];
const INSTALLMENT_DAYS: u32 = 30;

/// Configuration for generating a synthetic book.
#[derive(Debug, Clone)]
pub struct PortfolioConfig {
    pub officer_count: usize,
    pub loans_per_officer: usize,
    /// `(branch, region)` pairs officers are spread across.
    pub branches: Vec<(String, String)>,
    /// Repayments dated after this day are not generated.
    pub as_of: NaiveDate,
    /// Oldest disbursement, in days before `as_of`.
    pub max_loan_age_days: u32,
    /// Share of loans delivered with an installment schedule.
    pub scheduled_share: f64,
    pub seed: Option<u64>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            officer_count: 10,
            loans_per_officer: 20,
            branches: [("IKEJA", "Lagos"), ("YABA", "Lagos"), ("WUSE", "Abuja"), ("GARKI", "Abuja")]
                .iter()
                .map(|(b, r)| (b.to_string(), r.to_string()))
                .collect(),
            as_of: Utc::now().date_naive(),
            max_loan_age_days: 120,
            scheduled_share: 0.7,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    OnTime,
    Late,
    Partial,
    Silent,
}

impl Behaviour {
    fn draw(rng: &mut StdRng) -> Self {
        match rng.gen_range(0..100) {
            0..=59 => Behaviour::OnTime,
            60..=79 => Behaviour::Late,
            80..=89 => Behaviour::Partial,
            _ => Behaviour::Silent,
        }
    }
}

/// Generate a complete ledger batch: officers, loans, schedules, repayments
/// and a few reversals.
pub fn generate_portfolio(config: &PortfolioConfig) -> LedgerBatch {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut batch = LedgerBatch::default();

    for o in 0..config.officer_count {
        let (branch, region) = config
            .branches
            .get(o % config.branches.len().max(1))
            .cloned()
            .unwrap_or_else(|| ("HQ".to_string(), "Lagos".to_string()));
        let officer_id = OfficerId::new(format!("OFF-{:03}", o));
        batch.officers.push(Officer {
            id: officer_id.clone(),
            name: format!("Officer {}", o),
            branch_id: branch.as_str().into(),
            region,
            active: true,
        });

        for l in 0..config.loans_per_officer {
            let loan_id = LoanId::new(format!("LN-{:03}-{:04}", o, l));
            generate_loan(&mut rng, config, &mut batch, loan_id, &officer_id, &branch);
        }
    }
    batch
}

fn generate_loan(
    rng: &mut StdRng,
    config: &PortfolioConfig,
    batch: &mut LedgerBatch,
    loan_id: LoanId,
    officer_id: &OfficerId,
    branch: &str,
) {
    let age = rng.gen_range(1..=config.max_loan_age_days.max(1));
    let disbursed = config.as_of - Duration::days(i64::from(age));
    let term_days = [60u32, 90, 120][rng.gen_range(0..3)];
    let principal = Decimal::from(rng.gen_range(50..=500) * 1000);
    let fee_amount = (principal * Decimal::new(rng.gen_range(1..=3), 2)).round_dp(2);
    let scheduled = rng.gen_bool(config.scheduled_share.clamp(0.0, 1.0));

    let loan = Loan {
        id: loan_id.clone(),
        customer_id: format!("CUS-{}", loan_id).as_str().into(),
        officer_id: officer_id.clone(),
        branch_id: branch.into(),
        principal,
        fee_amount,
        interest_rate: dec!(0.30),
        disbursement_date: disbursed,
        term_days,
        status: LoanStatus::Active,
        channel: Some("bank_transfer".to_string()),
        first_payment_due_date: (!scheduled)
            .then(|| disbursed + Duration::days(i64::from(INSTALLMENT_DAYS))),
        updated_at: Utc::now(),
    };

    let installments = if scheduled {
        build_schedule(&loan)
    } else {
        // Unscheduled loans repay in one lump sum on the recorded first due date.
        vec![ScheduleInstallment::new(
            loan.id.clone(),
            1,
            disbursed + Duration::days(i64::from(INSTALLMENT_DAYS)),
            loan.expected_components().rounded(),
        )]
    };

    let behaviour = Behaviour::draw(rng);
    for installment in &installments {
        let (delay, share) = match behaviour {
            Behaviour::OnTime => (rng.gen_range(-3..=0), Decimal::ONE),
            Behaviour::Late => (rng.gen_range(5..=20), Decimal::ONE),
            Behaviour::Partial => (rng.gen_range(0..=10), dec!(0.5)),
            Behaviour::Silent => break,
        };
        let paid_on = installment.due_date + Duration::days(delay);
        if paid_on > config.as_of {
            break;
        }
        let components = installment.due.scaled(share);
        let seq = installment.sequence;
        let channel = CHANNELS[rng.gen_range(0..CHANNELS.len())];
        let backdated = rng.gen_bool(0.05);
        let recorded_on = if backdated || rng.gen_bool(0.05) {
            Some((paid_on + Duration::days(rng.gen_range(1..=7))).min(config.as_of))
        } else {
            None
        };
        let repayment_id = RepaymentId::new(format!("RP-{}-{}", loan.id, seq));
        batch.repayments.push(RepaymentInput {
            id: repayment_id.clone(),
            loan_id: loan.id.clone(),
            payment_date: paid_on,
            amount: components.total(),
            // Some upstream records carry only the total.
            components: (!rng.gen_bool(0.1)).then_some(components),
            waiver_amount: if rng.gen_bool(0.03) { dec!(500) } else { Decimal::ZERO },
            channel: Some(channel.to_string()),
            is_backdated: backdated,
            recorded_on,
        });
        if rng.gen_bool(0.03) && paid_on < config.as_of {
            batch.reversals.push(ReversalInput {
                repayment_id,
                date: paid_on + Duration::days(1),
                reason: Some("bounced transfer".to_string()),
            });
        }
    }

    if scheduled {
        batch.schedule.extend(installments);
    }
    batch.loans.push(loan);
}

/// Equal installments every 30 days; the last one absorbs rounding.
fn build_schedule(loan: &Loan) -> Vec<ScheduleInstallment> {
    let count = (loan.term_days / INSTALLMENT_DAYS).max(1);
    let expected = loan.expected_components().rounded();
    let n = Decimal::from(count);
    let per = Components::new(
        (expected.principal / n).round_dp(2),
        (expected.interest / n).round_dp(2),
        Decimal::ZERO,
        Decimal::ZERO,
    );

    (1..=count)
        .map(|seq| {
            let due = if seq == count {
                let prior = Decimal::from(count - 1);
                Components::new(
                    expected.principal - per.principal * prior,
                    expected.interest - per.interest * prior,
                    Decimal::ZERO,
                    Decimal::ZERO,
                )
            } else {
                per
            };
            // Fees are collected with the first installment.
            let due = if seq == 1 {
                Components { fee: expected.fee, ..due }
            } else {
                due
            };
            ScheduleInstallment::new(
                loan.id.clone(),
                seq,
                loan.disbursement_date + Duration::days(i64::from(seq * INSTALLMENT_DAYS)),
                due,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ingest::BatchStatus;
    use crate::ledger::store::LedgerStore;

    fn config(seed: u64) -> PortfolioConfig {
        PortfolioConfig {
            officer_count: 4,
            loans_per_officer: 10,
            as_of: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_generated_book_shape() {
        let batch = generate_portfolio(&config(7));
        assert_eq!(batch.officers.len(), 4);
        assert_eq!(batch.loans.len(), 40);
        assert!(batch
            .repayments
            .iter()
            .all(|r| r.payment_date <= NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(batch.schedule.iter().all(|i| i.total_due() > Decimal::ZERO));
    }

    #[test]
    fn test_same_seed_same_book() {
        let a = generate_portfolio(&config(42));
        let b = generate_portfolio(&config(42));
        assert_eq!(a.repayments, b.repayments);
        assert_eq!(a.reversals, b.reversals);
        let ids = |batch: &LedgerBatch| {
            batch.loans.iter().map(|l| l.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_generated_book_ingests_cleanly() {
        let store = LedgerStore::new(Default::default());
        let report = store.ingest_batch(generate_portfolio(&config(3)));
        assert_eq!(report.status(), BatchStatus::Success, "{}", report);
        assert_eq!(store.loan_count(), 40);
    }

    #[test]
    fn test_schedule_sums_to_expected_totals() {
        let batch = generate_portfolio(&config(11));
        for loan in batch.loans.iter().filter(|l| l.first_payment_due_date.is_none()) {
            let total: Decimal = batch
                .schedule
                .iter()
                .filter(|i| i.loan_id == loan.id)
                .map(|i| i.total_due())
                .sum();
            assert_eq!(total, loan.expected_components().rounded().total());
        }
    }
}
