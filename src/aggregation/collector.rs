//! Turns an officer's loan views into the raw formula inputs for one period.

use crate::config::EngineConfig;
use crate::core::amount::floor_zero;
use crate::core::ids::LoanId;
use crate::core::loan::LoanStatus;
use crate::ledger::store::LoanView;
use crate::metrics::formulas::{OfficerInputs, RollDirection};
use crate::snapshot::store::LoanMark;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Per-run context shared by every officer of one aggregation pass.
#[derive(Debug, Clone)]
pub struct PeriodContext<'a> {
    pub config: &'a EngineConfig,
    pub calculation_date: NaiveDate,
    pub period_start: NaiveDate,
    /// Per-loan marks of the previous run.
    pub previous_marks: Option<&'a BTreeMap<LoanId, LoanMark>>,
    /// Per-loan marks at or before mid-period.
    pub mid_period_marks: Option<&'a BTreeMap<LoanId, LoanMark>>,
}

impl<'a> PeriodContext<'a> {
    pub fn new(config: &'a EngineConfig, calculation_date: NaiveDate) -> Self {
        Self {
            config,
            calculation_date,
            period_start: config.period_start(calculation_date),
            previous_marks: None,
            mid_period_marks: None,
        }
    }

    fn in_period(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.calculation_date
    }
}

/// Collect the inputs of one officer. `prev_dpd1to6_balance` comes from the
/// officer's previous snapshot.
pub fn collect_officer_inputs(
    loans: &[LoanView],
    ctx: &PeriodContext<'_>,
    prev_dpd1to6_balance: Decimal,
) -> OfficerInputs {
    let mut inputs = OfficerInputs {
        prev_dpd1to6_balance,
        ..OfficerInputs::default()
    };
    let horizon_end = ctx
        .calculation_date
        .checked_add_signed(Duration::days(i64::from(ctx.config.slippage_horizon_days)))
        .unwrap_or(NaiveDate::MAX);
    let float_gap = i64::from(ctx.config.float_gap_days);

    for view in loans {
        let loan = &view.loan;
        let derived = &view.derived;
        let principal_outstanding = view.principal_outstanding();
        let dpd = derived.current_dpd;

        let disbursed_in_period = ctx.in_period(loan.disbursement_date);
        if disbursed_in_period {
            inputs.loans_disbursed += 1;
            if derived.tags.first_installment_miss {
                inputs.loans_first_missed += 1;
            }
        }

        if loan.status == LoanStatus::Active {
            inputs.active_loans += 1;
            inputs.total_portfolio += principal_outstanding;
            inputs.loan_age_total += Decimal::from(derived.loan_age_days);
            if let Some(days) = derived.days_since_last_repayment {
                inputs.days_since_last_repayment_total += Decimal::from(days);
                inputs.loans_with_repayment += 1;
            }
            if dpd > 15 {
                inputs.overdue_15d += principal_outstanding;
            }
            if (1..=6).contains(&dpd) {
                inputs.dpd1to6_balance += principal_outstanding;
            }
            inputs.amount_due_7d += derived.amount_due_between(ctx.calculation_date, horizon_end);

            if let Some(previous) = ctx.previous_marks.and_then(|m| m.get(&loan.id)) {
                if (1..=6).contains(&previous.dpd) && (7..=30).contains(&dpd) {
                    inputs.moved_to_7to30 += principal_outstanding;
                }
                match RollDirection::between(dpd, previous.dpd) {
                    RollDirection::Worsening => inputs.loans_worsening += 1,
                    RollDirection::Improving => inputs.loans_improving += 1,
                    RollDirection::Stable => {}
                }
            }

            let mid_par = match ctx.mid_period_marks.and_then(|m| m.get(&loan.id)) {
                Some(mark) if mark.dpd > 15 => mark.principal_outstanding,
                Some(_) => Decimal::ZERO,
                None if dpd > 15 => principal_outstanding,
                None => Decimal::ZERO,
            };
            inputs.par15_mid_period += mid_par;
        }

        if view.schedule.is_empty() {
            if disbursed_in_period {
                inputs.fees_due += loan.fee_amount;
            }
        } else {
            inputs.fees_due += view
                .schedule
                .iter()
                .filter(|i| ctx.in_period(i.due_date))
                .map(|i| i.due.fee)
                .sum::<Decimal>();
        }

        for repayment in view.repayments.iter().filter(|r| ctx.in_period(r.payment_date())) {
            inputs.repayment_entries += 1;
            if repayment.is_reversed() {
                inputs.reversed_entries += 1;
                continue;
            }
            if repayment.is_backdated() {
                inputs.backdated_entries += 1;
            }
            if (repayment.recorded_on() - repayment.payment_date()).num_days() > float_gap {
                inputs.float_gap_entries += 1;
            }
            let components = repayment.components();
            inputs.interest_collected += components.interest;
            inputs.fees_collected += components.fee;
            inputs.total_collected += repayment.amount();
            inputs.waivers += floor_zero(repayment.waiver_amount());
            if ctx.config.is_approved_channel(repayment.channel()) {
                inputs.approved_channel_collected += repayment.amount();
            }
        }
    }
    inputs
}

/// DPD marks of every loan, recorded by each run for later roll and PAR lookups.
pub fn loan_marks(loans: &[LoanView]) -> BTreeMap<LoanId, LoanMark> {
    loans
        .iter()
        .map(|v| {
            (
                v.loan.id.clone(),
                LoanMark {
                    dpd: v.derived.current_dpd,
                    principal_outstanding: v.principal_outstanding(),
                },
            )
        })
        .collect()
}
