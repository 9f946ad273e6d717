use chrono::{Duration, NaiveDate, Utc};
use loan_metrics_engine::core::amount::{safe_div, Components};
use loan_metrics_engine::core::loan::{Loan, LoanStatus};
use loan_metrics_engine::core::repayment::{Repayment, Reversal};
use loan_metrics_engine::core::schedule::ScheduleInstallment;
use loan_metrics_engine::engine::allocation::estimate_components;
use loan_metrics_engine::engine::derived::DerivedLoanState;
use loan_metrics_engine::engine::recalc::{LoanFacts, RecalculationEngine};
use loan_metrics_engine::metrics::bands::{risk_band, RiskBand};
use loan_metrics_engine::metrics::formulas::{compute, OfficerInputs, RiskWeights};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

/// Generate a positive money amount in cents (0.01 to 1,000,000.00).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_non_negative() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate a loan disbursed on the base date, with or without a first due date.
fn arb_loan() -> impl Strategy<Value = Loan> {
    (
        arb_amount(),
        0i64..5_000,
        0i64..50,
        30u32..365,
        prop::option::of(7i64..60),
    )
        .prop_map(|(principal, fee_cents, rate_pct, term_days, due_offset)| Loan {
            id: "LN-P".into(),
            customer_id: "C".into(),
            officer_id: "OFF-1".into(),
            branch_id: "IKEJA".into(),
            principal,
            fee_amount: Decimal::new(fee_cents, 2),
            interest_rate: Decimal::new(rate_pct, 2),
            disbursement_date: base_date(),
            term_days,
            status: LoanStatus::Active,
            channel: None,
            first_payment_due_date: due_offset.map(|d| base_date() + Duration::days(d)),
            updated_at: Utc::now(),
        })
}

/// Generate 0..12 repayments against `LN-P`, some reversed.
fn arb_repayments() -> impl Strategy<Value = Vec<Repayment>> {
    prop::collection::vec((arb_amount(), 0i64..200, any::<bool>()), 0..12).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (amount, day, reversed))| {
                let date = base_date() + Duration::days(day);
                let repayment = Repayment::new(
                    format!("RP-{}", i).as_str().into(),
                    "LN-P".into(),
                    date,
                    Components::new(amount, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
                );
                if reversed && i % 3 == 0 {
                    repayment.with_reversal(Reversal {
                        date: date + Duration::days(1),
                        reason: None,
                    })
                } else {
                    repayment
                }
            })
            .collect()
    })
}

/// Generate a 0..6 installment schedule, due every 30 days.
fn arb_schedule() -> impl Strategy<Value = Vec<ScheduleInstallment>> {
    prop::collection::vec(arb_amount(), 0..6).prop_map(|dues| {
        dues.into_iter()
            .enumerate()
            .map(|(i, due)| {
                let seq = i as u32 + 1;
                ScheduleInstallment::new(
                    "LN-P".into(),
                    seq,
                    base_date() + Duration::days(30 * i64::from(seq)),
                    Components::new(due, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
                )
            })
            .collect()
    })
}

fn arb_inputs() -> impl Strategy<Value = OfficerInputs> {
    (
        (0u32..100, 0u32..100, arb_non_negative(), arb_non_negative(), arb_non_negative()),
        (arb_non_negative(), arb_non_negative(), arb_non_negative(), arb_non_negative()),
        (arb_non_negative(), arb_non_negative(), arb_non_negative(), arb_non_negative()),
        (0u32..50, 0u32..50, 0u32..50, 0u32..5),
    )
        .prop_map(
            |(
                (disbursed, missed, portfolio, overdue, dpd1to6),
                (due_7d, moved, prev, interest),
                (fees, fees_due, par15, collected),
                (entries, backdated, reversed, float_gap),
            )| OfficerInputs {
                loans_disbursed: disbursed,
                loans_first_missed: missed.min(disbursed),
                active_loans: disbursed,
                total_portfolio: portfolio,
                overdue_15d: overdue,
                dpd1to6_balance: dpd1to6,
                amount_due_7d: due_7d,
                moved_to_7to30: moved,
                prev_dpd1to6_balance: prev,
                interest_collected: interest,
                fees_collected: fees,
                fees_due,
                par15_mid_period: par15,
                total_collected: collected,
                approved_channel_collected: collected / Decimal::TWO,
                repayment_entries: entries,
                backdated_entries: backdated.min(entries),
                reversed_entries: reversed.min(entries),
                float_gap_entries: float_gap,
                ..OfficerInputs::default()
            },
        )
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Recalculation is idempotent.
    //
    // Recomputing from the same facts, with the same previous state and
    // date, serializes to byte-identical output.
    // ===================================================================
    #[test]
    fn recompute_is_idempotent(
        loan in arb_loan(),
        repayments in arb_repayments(),
        schedule in arb_schedule(),
        as_of_day in 0i64..400,
    ) {
        let engine = RecalculationEngine::default();
        let as_of = base_date() + Duration::days(as_of_day);
        let facts = LoanFacts::new(&loan, &repayments, &schedule);
        let first = engine.recompute(facts, None, as_of).unwrap();
        let second = engine.recompute(facts, None, as_of).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    // ===================================================================
    // INVARIANT 2: max_dpd_ever never decreases.
    //
    // Walking forward in time, and even paying the loan off, can only keep
    // or raise the highest DPD ever observed.
    // ===================================================================
    #[test]
    fn max_dpd_is_monotonic(
        loan in arb_loan(),
        repayments in arb_repayments(),
        schedule in arb_schedule(),
        steps in prop::collection::vec(0i64..400, 1..8),
    ) {
        let engine = RecalculationEngine::default();
        let mut previous: Option<DerivedLoanState> = None;
        for day in steps {
            let facts = LoanFacts::new(&loan, &repayments, &schedule);
            let as_of = base_date() + Duration::days(day);
            let state = engine.recompute(facts, previous.as_ref(), as_of).unwrap();
            if let Some(prev) = &previous {
                prop_assert!(state.max_dpd_ever >= prev.max_dpd_ever);
            }
            prop_assert!(state.max_dpd_ever >= state.current_dpd);
            previous = Some(state);
        }
    }

    // ===================================================================
    // INVARIANT 3: Outstanding components are never negative.
    //
    // However large the overpayment, every outstanding component floors at
    // zero.
    // ===================================================================
    #[test]
    fn outstanding_never_negative(
        loan in arb_loan(),
        repayments in arb_repayments(),
        schedule in arb_schedule(),
    ) {
        let engine = RecalculationEngine::default();
        let facts = LoanFacts::new(&loan, &repayments, &schedule);
        let state = engine.recompute(facts, None, base_date() + Duration::days(120)).unwrap();
        prop_assert!(!state.outstanding.has_negative());
        prop_assert!(state.total_outstanding >= Decimal::ZERO);
        for installment in &state.installments {
            prop_assert!(installment.remaining() >= Decimal::ZERO);
        }
    }

    // ===================================================================
    // INVARIANT 4: No due date means zero DPD.
    //
    // A loan with no schedule and no recorded first due date is never
    // past due, whatever the date.
    // ===================================================================
    #[test]
    fn no_due_date_means_zero_dpd(
        mut loan in arb_loan(),
        repayments in arb_repayments(),
        as_of_day in 0i64..1_000,
    ) {
        loan.first_payment_due_date = None;
        let engine = RecalculationEngine::default();
        let as_of = base_date() + Duration::days(as_of_day);
        let state = engine
            .recompute(LoanFacts::new(&loan, &repayments, &[]), None, as_of)
            .unwrap();
        prop_assert_eq!(state.current_dpd, 0);
        prop_assert!(!state.first_payment_missed);
    }

    // ===================================================================
    // INVARIANT 5: Estimated components always sum to the amount.
    //
    // Proportional allocation rounds interest and fee to cents and gives
    // principal the remainder, so the component-sum rule holds exactly.
    // ===================================================================
    #[test]
    fn estimated_components_sum_to_amount(loan in arb_loan(), amount in arb_amount()) {
        let components = estimate_components(&loan, amount);
        prop_assert_eq!(components.total(), amount);
        prop_assert!(components.interest >= Decimal::ZERO);
        prop_assert!(components.fee >= Decimal::ZERO);
    }

    // ===================================================================
    // INVARIANT 6: Division by zero yields zero.
    // ===================================================================
    #[test]
    fn safe_div_by_zero_is_zero(numerator in arb_non_negative()) {
        prop_assert_eq!(safe_div(numerator, Decimal::ZERO), Decimal::ZERO);
    }

    // ===================================================================
    // INVARIANT 7: Scores stay in range and bands agree with scores.
    //
    // Whatever the inputs, DQI and risk score are within [0, 100], and the
    // reported risk band is the band of the reported score.
    // ===================================================================
    #[test]
    fn scores_bounded_and_banded(inputs in arb_inputs()) {
        let metrics = compute(&inputs, &RiskWeights::default());
        prop_assert!(metrics.dqi >= Decimal::ZERO && metrics.dqi <= Decimal::ONE_HUNDRED);
        prop_assert!(
            metrics.risk_score >= Decimal::ZERO && metrics.risk_score <= Decimal::ONE_HUNDRED
        );
        prop_assert_eq!(metrics.bands.risk, risk_band(metrics.risk_score));
        prop_assert!(metrics.fimr >= Decimal::ZERO && metrics.fimr <= Decimal::ONE);
    }

    // ===================================================================
    // INVARIANT 8: A clean book scores in the green band.
    //
    // With no delinquency, full fee recovery and approved channels only,
    // the yield shortfall alone cannot push the score out of green.
    // ===================================================================
    #[test]
    fn clean_book_is_green(portfolio in arb_amount(), collected in arb_amount()) {
        let inputs = OfficerInputs {
            loans_disbursed: 10,
            active_loans: 10,
            total_portfolio: portfolio,
            fees_due: collected,
            fees_collected: collected,
            total_collected: collected,
            approved_channel_collected: collected,
            repayment_entries: 5,
            ..OfficerInputs::default()
        };
        let metrics = compute(&inputs, &RiskWeights::default());
        prop_assert_eq!(metrics.bands.risk, RiskBand::Green);
    }
}
