//! Officer dashboard example.
//!
//! Ingests a small hand-written book, advances the clock a week at a time
//! and shows how repayments, reversals and missed installments move each
//! officer's metrics and risk band.

use chrono::{NaiveDate, Utc};
use loan_metrics_engine::aggregation::scheduler::AggregationScheduler;
use loan_metrics_engine::config::EngineConfig;
use loan_metrics_engine::core::amount::Components;
use loan_metrics_engine::core::loan::{Loan, LoanStatus, Officer};
use loan_metrics_engine::core::schedule::ScheduleInstallment;
use loan_metrics_engine::engine::recalc::RecalculationEngine;
use loan_metrics_engine::ledger::clock::FixedClock;
use loan_metrics_engine::ledger::ingest::{LedgerBatch, RepaymentInput, ReversalInput};
use loan_metrics_engine::ledger::query::{LoanColumn, LoanQuery, SortOrder};
use loan_metrics_engine::ledger::store::LedgerStore;
use loan_metrics_engine::snapshot::query::{SnapshotColumn, SnapshotQuery};
use loan_metrics_engine::snapshot::store::SnapshotStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, day).unwrap()
}

fn officer(id: &str, name: &str, branch: &str, region: &str) -> Officer {
    Officer {
        id: id.into(),
        name: name.into(),
        branch_id: branch.into(),
        region: region.into(),
        active: true,
    }
}

fn loan(id: &str, officer: &str, branch: &str, principal: Decimal, disbursed: NaiveDate) -> Loan {
    Loan {
        id: id.into(),
        customer_id: format!("CUS-{}", id).as_str().into(),
        officer_id: officer.into(),
        branch_id: branch.into(),
        principal,
        fee_amount: dec!(1500),
        interest_rate: dec!(0.30),
        disbursement_date: disbursed,
        term_days: 60,
        status: LoanStatus::Active,
        channel: Some("bank_transfer".into()),
        first_payment_due_date: None,
        updated_at: Utc::now(),
    }
}

/// Two monthly installments, fee collected with the first.
fn schedule(loan: &Loan) -> Vec<ScheduleInstallment> {
    let expected = loan.expected_components().rounded();
    let half = expected.scaled(dec!(0.5));
    let first = Components::new(half.principal, half.interest, expected.fee, Decimal::ZERO);
    let second = Components::new(
        expected.principal - half.principal,
        expected.interest - half.interest,
        Decimal::ZERO,
        Decimal::ZERO,
    );
    let due = |days| loan.disbursement_date + chrono::Duration::days(days);
    vec![
        ScheduleInstallment::new(loan.id.clone(), 1, due(30), first),
        ScheduleInstallment::new(loan.id.clone(), 2, due(60), second),
    ]
}

fn pay(id: &str, loan: &str, date: NaiveDate, amount: Decimal, channel: &str) -> RepaymentInput {
    RepaymentInput {
        id: id.into(),
        loan_id: loan.into(),
        payment_date: date,
        amount,
        // Upstream sends totals only; components are estimated.
        components: None,
        waiver_amount: Decimal::ZERO,
        channel: Some(channel.into()),
        is_backdated: false,
        recorded_on: None,
    }
}

fn main() {
    println!("╔══════════════════════════════════════════════╗");
    println!("║  loan-metrics-engine: Officer Dashboard Demo ║");
    println!("╚══════════════════════════════════════════════╝\n");

    let clock = Arc::new(FixedClock::at_date(d(6, 2)));
    let ledger = Arc::new(LedgerStore::with_clock(RecalculationEngine::default(), clock.clone()));
    let snapshots = Arc::new(SnapshotStore::new());
    let config = EngineConfig::default();
    let scheduler = AggregationScheduler::new(ledger.clone(), snapshots.clone(), config);

    // --- Book setup ---
    println!("━━━ Ingesting the book ━━━\n");
    let loans = vec![
        loan("LN-ADA-1", "OFF-ADA", "IKEJA", dec!(100000), d(5, 1)),
        loan("LN-ADA-2", "OFF-ADA", "IKEJA", dec!(80000), d(5, 3)),
        loan("LN-TUNDE-1", "OFF-TUNDE", "IKEJA", dec!(120000), d(5, 2)),
        loan("LN-TUNDE-2", "OFF-TUNDE", "IKEJA", dec!(60000), d(5, 4)),
        loan("LN-NGOZI-1", "OFF-NGOZI", "WUSE", dec!(150000), d(5, 1)),
    ];
    let batch = LedgerBatch {
        officers: vec![
            officer("OFF-ADA", "Ada", "IKEJA", "Lagos"),
            officer("OFF-TUNDE", "Tunde", "IKEJA", "Lagos"),
            officer("OFF-NGOZI", "Ngozi", "WUSE", "Abuja"),
        ],
        schedule: loans.iter().flat_map(schedule).collect(),
        loans,
        repayments: vec![
            pay("RP-1", "LN-ADA-1", d(5, 30), dec!(54000), "ussd"),
            pay("RP-2", "LN-ADA-2", d(6, 1), dec!(43500), "card"),
            pay("RP-3", "LN-NGOZI-1", d(5, 31), dec!(80000), "cash"),
            pay("RP-4", "LN-TUNDE-2", d(6, 2), dec!(10000), "wallet"),
        ],
        ..Default::default()
    };
    let report = ledger.ingest_batch(batch);
    println!("{}", report);

    // --- Week 1 ---
    println!("━━━ Week 1: aggregation on {} ━━━\n", d(6, 2));
    let run = scheduler.run(d(6, 2)).unwrap();
    println!("{}", run);

    // --- Week 2: a bounced transfer and no further payments from Tunde's book ---
    clock.set(d(6, 9).and_hms_opt(12, 0, 0).unwrap().and_utc());
    // Day rollover: bring every loan's drilldown state up to the new date.
    for (loan, err) in ledger.recalculate_all(d(6, 9)) {
        println!("  ✗ {} not recalculated: {}", loan, err);
    }
    let report = ledger.ingest_batch(LedgerBatch {
        reversals: vec![ReversalInput {
            repayment_id: "RP-4".into(),
            date: d(6, 5),
            reason: Some("bounced transfer".into()),
        }],
        ..Default::default()
    });
    println!("{}", report);
    println!("━━━ Week 2: aggregation on {} ━━━\n", d(6, 9));
    let run = scheduler.run(d(6, 9)).unwrap();
    println!("{}", run);

    println!("━━━ Officer leaderboard (safest first) ━━━\n");
    for s in SnapshotQuery::new()
        .on(d(6, 9))
        .sort_by(SnapshotColumn::RiskScore, SortOrder::Descending)
        .officers(&snapshots)
    {
        println!(
            "  {:<6} {:<6} risk {:>6} [{}]  DQI {:>6}  FIMR {}  Roll {}",
            s.officer_name,
            s.branch_id,
            s.metrics.risk_score,
            s.metrics.bands.risk,
            s.metrics.dqi,
            s.metrics.fimr,
            s.metrics.roll
        );
    }

    println!("\n━━━ Branch view ━━━\n");
    for b in snapshots.branch_snapshots_on(d(6, 9)) {
        println!("--- {} ({}, {} officers) ---", b.branch_id, b.region, b.officer_count);
        println!("{}", b.metrics);
    }

    println!("━━━ Most delinquent loans ━━━\n");
    for view in LoanQuery::new()
        .dpd_range(1..=u32::MAX)
        .sort_by(LoanColumn::CurrentDpd, SortOrder::Descending)
        .run(&ledger)
    {
        println!(
            "  {:<11} officer {:<9} DPD {:>3}  outstanding {}",
            view.loan.id,
            view.loan.officer_id,
            view.derived.current_dpd,
            view.derived.total_outstanding
        );
    }

    println!("\n{}", scheduler.portfolio_summary(d(6, 9)));
}
