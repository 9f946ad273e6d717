//! Officer-level ratio formulas.
//!
//! Everything here is a pure function of [`OfficerInputs`]. Denominators go
//! through [`safe_div`], so an empty portfolio yields zeros rather than errors,
//! and every term feeding a composite score is clamped to `[0, 1]` first.

use crate::core::amount::{clamp_unit, safe_div};
use crate::metrics::bands::{self, MetricBand, RiskBand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Precision kept on stored ratios. Composite scores are computed from the
/// rounded ratios so bands always agree with the reported values.
const RATIO_DP: u32 = 6;
const SCORE_DP: u32 = 2;
const HUNDRED: Decimal = dec!(100);

/// Raw counts and sums collected for one officer (or summed for a branch)
/// over one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerInputs {
    pub loans_disbursed: u32,
    pub loans_first_missed: u32,
    pub active_loans: u32,
    /// Principal outstanding of active loans.
    pub total_portfolio: Decimal,
    /// Principal outstanding of loans with DPD > 15 today.
    pub overdue_15d: Decimal,
    /// Principal outstanding of loans with DPD in 1..=6.
    pub dpd1to6_balance: Decimal,
    /// Unpaid installment amounts falling due within the slippage horizon.
    pub amount_due_7d: Decimal,
    /// Principal outstanding of loans that moved from DPD 1–6 to DPD 7–30.
    pub moved_to_7to30: Decimal,
    /// DPD 1–6 balance reported by the previous run.
    pub prev_dpd1to6_balance: Decimal,
    pub interest_collected: Decimal,
    pub fees_collected: Decimal,
    pub fees_due: Decimal,
    /// PAR15 exposure at mid-period.
    pub par15_mid_period: Decimal,
    pub total_collected: Decimal,
    pub approved_channel_collected: Decimal,
    pub waivers: Decimal,
    pub repayment_entries: u32,
    pub backdated_entries: u32,
    pub reversed_entries: u32,
    /// Repayments recorded later than the float-gap tolerance after payment.
    pub float_gap_entries: u32,
    pub days_since_last_repayment_total: Decimal,
    pub loans_with_repayment: u32,
    pub loan_age_total: Decimal,
    /// Active loans whose DPD rose since the previous run.
    pub loans_worsening: u32,
    /// Active loans whose DPD fell since the previous run.
    pub loans_improving: u32,
}

impl OfficerInputs {
    pub fn avg_days_since_last_repayment(&self) -> Decimal {
        safe_div(
            self.days_since_last_repayment_total,
            Decimal::from(self.loans_with_repayment),
        )
    }

    pub fn avg_loan_age(&self) -> Decimal {
        safe_div(self.loan_age_total, Decimal::from(self.active_loans))
    }

    pub fn float_gap_detected(&self) -> bool {
        self.float_gap_entries > 0
    }
}

impl AddAssign<&OfficerInputs> for OfficerInputs {
    fn add_assign(&mut self, rhs: &OfficerInputs) {
        self.loans_disbursed += rhs.loans_disbursed;
        self.loans_first_missed += rhs.loans_first_missed;
        self.active_loans += rhs.active_loans;
        self.total_portfolio += rhs.total_portfolio;
        self.overdue_15d += rhs.overdue_15d;
        self.dpd1to6_balance += rhs.dpd1to6_balance;
        self.amount_due_7d += rhs.amount_due_7d;
        self.moved_to_7to30 += rhs.moved_to_7to30;
        self.prev_dpd1to6_balance += rhs.prev_dpd1to6_balance;
        self.interest_collected += rhs.interest_collected;
        self.fees_collected += rhs.fees_collected;
        self.fees_due += rhs.fees_due;
        self.par15_mid_period += rhs.par15_mid_period;
        self.total_collected += rhs.total_collected;
        self.approved_channel_collected += rhs.approved_channel_collected;
        self.waivers += rhs.waivers;
        self.repayment_entries += rhs.repayment_entries;
        self.backdated_entries += rhs.backdated_entries;
        self.reversed_entries += rhs.reversed_entries;
        self.float_gap_entries += rhs.float_gap_entries;
        self.days_since_last_repayment_total += rhs.days_since_last_repayment_total;
        self.loans_with_repayment += rhs.loans_with_repayment;
        self.loan_age_total += rhs.loan_age_total;
        self.loans_worsening += rhs.loans_worsening;
        self.loans_improving += rhs.loans_improving;
    }
}

/// Weights of the ten risk-score penalty components, in points out of 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub porr: Decimal,
    pub fimr: Decimal,
    pub roll: Decimal,
    pub waiver_ratio: Decimal,
    pub backdated_ratio: Decimal,
    pub reversal_ratio: Decimal,
    pub fee_shortfall: Decimal,
    pub channel_impurity: Decimal,
    pub float_gap: Decimal,
    pub ayr_shortfall: Decimal,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            porr: dec!(20),
            fimr: dec!(15),
            roll: dec!(10),
            waiver_ratio: dec!(5),
            backdated_ratio: dec!(5),
            reversal_ratio: dec!(5),
            fee_shortfall: dec!(10),
            channel_impurity: dec!(10),
            float_gap: dec!(5),
            ayr_shortfall: dec!(15),
        }
    }
}

impl RiskWeights {
    pub fn total(&self) -> Decimal {
        self.porr
            + self.fimr
            + self.roll
            + self.waiver_ratio
            + self.backdated_ratio
            + self.reversal_ratio
            + self.fee_shortfall
            + self.channel_impurity
            + self.float_gap
            + self.ayr_shortfall
    }
}

/// Per-loan DPD movement between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollDirection {
    Worsening,
    Stable,
    Improving,
}

impl RollDirection {
    pub fn between(current_dpd: u32, previous_dpd: u32) -> Self {
        match current_dpd.cmp(&previous_dpd) {
            std::cmp::Ordering::Greater => RollDirection::Worsening,
            std::cmp::Ordering::Less => RollDirection::Improving,
            std::cmp::Ordering::Equal => RollDirection::Stable,
        }
    }
}

impl fmt::Display for RollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RollDirection::Worsening => "worsening",
            RollDirection::Stable => "stable",
            RollDirection::Improving => "improving",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricBands {
    pub fimr: MetricBand,
    pub slippage: MetricBand,
    pub roll: MetricBand,
    pub ayr: MetricBand,
    pub dqi: MetricBand,
    pub risk: RiskBand,
}

/// Computed ratios, composite scores and their bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
    pub fimr: Decimal,
    pub slippage: Decimal,
    pub roll: Decimal,
    pub frr: Decimal,
    pub ayr: Decimal,
    pub porr: Decimal,
    pub repayment_quality: Decimal,
    pub on_time_index: Decimal,
    pub channel_purity: Decimal,
    pub waiver_ratio: Decimal,
    pub backdated_ratio: Decimal,
    pub reversal_ratio: Decimal,
    /// 0–100.
    pub dqi: Decimal,
    /// 0–100, higher is safer.
    pub risk_score: Decimal,
    /// Reported only; not part of any score.
    pub repayment_delay_rate: Decimal,
    /// Net DPD movement of the book since the previous run.
    pub roll_trend: RollDirection,
    pub bands: MetricBands,
}

pub fn fimr(inputs: &OfficerInputs) -> Decimal {
    safe_div(
        Decimal::from(inputs.loans_first_missed),
        Decimal::from(inputs.loans_disbursed),
    )
}

pub fn slippage(inputs: &OfficerInputs) -> Decimal {
    safe_div(inputs.dpd1to6_balance, inputs.amount_due_7d)
}

pub fn roll(inputs: &OfficerInputs) -> Decimal {
    safe_div(inputs.moved_to_7to30, inputs.prev_dpd1to6_balance)
}

pub fn frr(inputs: &OfficerInputs) -> Decimal {
    safe_div(inputs.fees_collected, inputs.fees_due)
}

pub fn ayr(inputs: &OfficerInputs) -> Decimal {
    safe_div(
        inputs.interest_collected + inputs.fees_collected,
        inputs.par15_mid_period,
    )
}

pub fn porr(inputs: &OfficerInputs) -> Decimal {
    safe_div(inputs.overdue_15d, inputs.total_portfolio)
}

/// Share of collected value that came through approved channels. A period
/// with no collections is fully pure.
pub fn channel_purity(inputs: &OfficerInputs) -> Decimal {
    if inputs.total_collected.is_zero() {
        return Decimal::ONE;
    }
    safe_div(inputs.approved_channel_collected, inputs.total_collected)
}

/// Worsening when more loans slid than recovered since the previous run.
pub fn roll_trend(inputs: &OfficerInputs) -> RollDirection {
    match inputs.loans_worsening.cmp(&inputs.loans_improving) {
        std::cmp::Ordering::Greater => RollDirection::Worsening,
        std::cmp::Ordering::Less => RollDirection::Improving,
        std::cmp::Ordering::Equal => RollDirection::Stable,
    }
}

/// `(1 − (avg_days_since_last_repayment / avg_loan_age) / 0.25) × 100`.
/// Zero when no loan has any age.
pub fn repayment_delay_rate(inputs: &OfficerInputs) -> Decimal {
    let age = inputs.avg_loan_age();
    if age.is_zero() {
        return Decimal::ZERO;
    }
    let ratio = safe_div(inputs.avg_days_since_last_repayment(), age);
    (Decimal::ONE - ratio / dec!(0.25)) * HUNDRED
}

/// `100 × (0.4·RQ + 0.35·OTI + 0.25·(1 − FIMR)) × CP`, each input clamped.
pub fn dqi(
    repayment_quality: Decimal,
    on_time_index: Decimal,
    fimr: Decimal,
    channel_purity: Decimal,
) -> Decimal {
    let quality = dec!(0.4) * clamp_unit(repayment_quality)
        + dec!(0.35) * clamp_unit(on_time_index)
        + dec!(0.25) * (Decimal::ONE - clamp_unit(fimr));
    HUNDRED * quality * clamp_unit(channel_purity)
}

/// Normalized penalty components, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskComponents {
    pub porr: Decimal,
    pub fimr: Decimal,
    pub roll: Decimal,
    pub waiver_ratio: Decimal,
    pub backdated_ratio: Decimal,
    pub reversal_ratio: Decimal,
    pub fee_shortfall: Decimal,
    pub channel_impurity: Decimal,
    pub float_gap: Decimal,
    pub ayr_shortfall: Decimal,
}

/// `100 − Σ weight × component`, clamped to `[0, 100]`.
pub fn risk_score(components: &RiskComponents, weights: &RiskWeights) -> Decimal {
    let penalty = [
        (components.porr, weights.porr),
        (components.fimr, weights.fimr),
        (components.roll, weights.roll),
        (components.waiver_ratio, weights.waiver_ratio),
        (components.backdated_ratio, weights.backdated_ratio),
        (components.reversal_ratio, weights.reversal_ratio),
        (components.fee_shortfall, weights.fee_shortfall),
        (components.channel_impurity, weights.channel_impurity),
        (components.float_gap, weights.float_gap),
        (components.ayr_shortfall, weights.ayr_shortfall),
    ]
    .iter()
    .map(|(value, weight)| clamp_unit(*value) * *weight)
    .sum::<Decimal>();

    (HUNDRED - penalty).max(Decimal::ZERO).min(HUNDRED)
}

/// Compute the full metric set for one officer or branch.
pub fn compute(inputs: &OfficerInputs, weights: &RiskWeights) -> MetricSet {
    let round = |v: Decimal| v.round_dp(RATIO_DP);

    let fimr = round(fimr(inputs));
    let slippage = round(slippage(inputs));
    let roll = round(roll(inputs));
    let frr = round(frr(inputs));
    let ayr = round(ayr(inputs));
    let porr = round(porr(inputs));
    let channel_purity = round(channel_purity(inputs));
    let entries = Decimal::from(inputs.repayment_entries);
    let waiver_ratio = round(safe_div(inputs.waivers, inputs.total_collected));
    let backdated_ratio = round(safe_div(Decimal::from(inputs.backdated_entries), entries));
    let reversal_ratio = round(safe_div(Decimal::from(inputs.reversed_entries), entries));

    let repayment_quality = Decimal::ONE - clamp_unit(porr);
    let on_time_index = Decimal::ONE - clamp_unit(slippage);

    let dqi = dqi(repayment_quality, on_time_index, fimr, channel_purity).round_dp(SCORE_DP);
    let components = RiskComponents {
        porr,
        fimr,
        roll,
        waiver_ratio,
        backdated_ratio,
        reversal_ratio,
        fee_shortfall: Decimal::ONE - clamp_unit(frr),
        channel_impurity: Decimal::ONE - clamp_unit(channel_purity),
        float_gap: if inputs.float_gap_detected() {
            Decimal::ONE
        } else {
            Decimal::ZERO
        },
        ayr_shortfall: Decimal::ONE - clamp_unit(ayr),
    };
    let risk_score = risk_score(&components, weights).round_dp(SCORE_DP);

    MetricSet {
        fimr,
        slippage,
        roll,
        frr,
        ayr,
        porr,
        repayment_quality,
        on_time_index,
        channel_purity,
        waiver_ratio,
        backdated_ratio,
        reversal_ratio,
        dqi,
        risk_score,
        repayment_delay_rate: repayment_delay_rate(inputs).round_dp(SCORE_DP),
        roll_trend: roll_trend(inputs),
        bands: MetricBands {
            fimr: bands::fimr_band(fimr),
            slippage: bands::slippage_band(slippage),
            roll: bands::roll_band(roll),
            ayr: bands::ayr_band(ayr),
            dqi: bands::dqi_band(dqi),
            risk: bands::risk_band(risk_score),
        },
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  FIMR:        {:>10}  [{}]", self.fimr, self.bands.fimr)?;
        writeln!(f, "  Slippage:    {:>10}  [{}]", self.slippage, self.bands.slippage)?;
        writeln!(f, "  Roll:        {:>10}  [{}] {}", self.roll, self.bands.roll, self.roll_trend)?;
        writeln!(f, "  FRR:         {:>10}", self.frr)?;
        writeln!(f, "  AYR:         {:>10}  [{}]", self.ayr, self.bands.ayr)?;
        writeln!(f, "  PORR:        {:>10}", self.porr)?;
        writeln!(f, "  DQI:         {:>10}  [{}]", self.dqi, self.bands.dqi)?;
        writeln!(f, "  Risk score:  {:>10}  [{}]", self.risk_score, self.bands.risk)?;
        writeln!(f, "  Delay rate:  {:>10}", self.repayment_delay_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> OfficerInputs {
        OfficerInputs {
            loans_disbursed: 50,
            loans_first_missed: 1,
            active_loans: 50,
            total_portfolio: dec!(1000000),
            overdue_15d: dec!(20000),
            dpd1to6_balance: dec!(4000),
            amount_due_7d: dec!(100000),
            moved_to_7to30: dec!(1000),
            prev_dpd1to6_balance: dec!(5000),
            interest_collected: dec!(30000),
            fees_collected: dec!(5000),
            fees_due: dec!(5000),
            par15_mid_period: dec!(50000),
            total_collected: dec!(200000),
            approved_channel_collected: dec!(200000),
            waivers: Decimal::ZERO,
            repayment_entries: 100,
            backdated_entries: 0,
            reversed_entries: 0,
            float_gap_entries: 0,
            days_since_last_repayment_total: dec!(150),
            loans_with_repayment: 50,
            loan_age_total: dec!(1500),
            loans_worsening: 2,
            loans_improving: 5,
        }
    }

    #[test]
    fn test_zero_disbursed_fimr_is_zero() {
        let inputs = OfficerInputs::default();
        assert_eq!(fimr(&inputs), Decimal::ZERO);
        assert_eq!(slippage(&inputs), Decimal::ZERO);
        assert_eq!(roll(&inputs), Decimal::ZERO);
        assert_eq!(ayr(&inputs), Decimal::ZERO);
    }

    #[test]
    fn test_ratios() {
        let inputs = healthy();
        assert_eq!(fimr(&inputs), dec!(0.02));
        assert_eq!(slippage(&inputs), dec!(0.04));
        assert_eq!(roll(&inputs), dec!(0.2));
        assert_eq!(frr(&inputs), Decimal::ONE);
        assert_eq!(ayr(&inputs), dec!(0.7));
        assert_eq!(porr(&inputs), dec!(0.02));
    }

    #[test]
    fn test_dqi_formula() {
        // 100 × (0.4·1 + 0.35·1 + 0.25·1) × 1
        assert_eq!(dqi(Decimal::ONE, Decimal::ONE, Decimal::ZERO, Decimal::ONE), dec!(100));
        // Out-of-range inputs are clamped.
        assert_eq!(dqi(dec!(3), dec!(-1), dec!(2), dec!(1.5)), dec!(40));
        assert_eq!(dqi(Decimal::ONE, Decimal::ONE, Decimal::ZERO, dec!(0.5)), dec!(50));
    }

    #[test]
    fn test_risk_score_bounds() {
        let worst = RiskComponents {
            porr: dec!(5),
            fimr: Decimal::ONE,
            roll: Decimal::ONE,
            waiver_ratio: Decimal::ONE,
            backdated_ratio: Decimal::ONE,
            reversal_ratio: Decimal::ONE,
            fee_shortfall: Decimal::ONE,
            channel_impurity: Decimal::ONE,
            float_gap: Decimal::ONE,
            ayr_shortfall: Decimal::ONE,
        };
        assert_eq!(risk_score(&worst, &RiskWeights::default()), Decimal::ZERO);

        let best = RiskComponents {
            porr: dec!(-1),
            fimr: Decimal::ZERO,
            roll: Decimal::ZERO,
            waiver_ratio: Decimal::ZERO,
            backdated_ratio: Decimal::ZERO,
            reversal_ratio: Decimal::ZERO,
            fee_shortfall: Decimal::ZERO,
            channel_impurity: Decimal::ZERO,
            float_gap: Decimal::ZERO,
            ayr_shortfall: Decimal::ZERO,
        };
        assert_eq!(risk_score(&best, &RiskWeights::default()), dec!(100));
    }

    #[test]
    fn test_default_weights_sum_to_hundred() {
        assert_eq!(RiskWeights::default().total(), dec!(100));
    }

    #[test]
    fn test_compute_healthy_officer() {
        let m = compute(&healthy(), &RiskWeights::default());
        assert_eq!(m.bands.fimr, MetricBand::Green);
        assert_eq!(m.bands.slippage, MetricBand::Green);
        assert_eq!(m.bands.ayr, MetricBand::Green);
        // 100 × (0.4·0.98 + 0.35·0.96 + 0.25·0.98) × 1 = 97.3
        assert_eq!(m.dqi, dec!(97.3));
        // penalties: 20·0.02 + 15·0.02 + 10·0.2 + 15·(1 − 0.7) = 7.2
        assert_eq!(m.risk_score, dec!(92.8));
        assert_eq!(m.bands.risk, RiskBand::Green);
        // avg dsl 3, avg age 30 → (1 − 0.1/0.25) × 100 = 60
        assert_eq!(m.repayment_delay_rate, dec!(60));
    }

    #[test]
    fn test_no_collections_is_channel_pure() {
        let inputs = OfficerInputs::default();
        assert_eq!(channel_purity(&inputs), Decimal::ONE);
        let m = compute(&inputs, &RiskWeights::default());
        // Only fee and AYR shortfall penalize an empty book: 100 − 10 − 15.
        assert_eq!(m.risk_score, dec!(75));
    }

    #[test]
    fn test_roll_direction() {
        assert_eq!(RollDirection::between(10, 3), RollDirection::Worsening);
        assert_eq!(RollDirection::between(0, 3), RollDirection::Improving);
        assert_eq!(RollDirection::between(3, 3), RollDirection::Stable);
    }

    #[test]
    fn test_roll_trend_follows_the_majority() {
        let metrics = compute(&healthy(), &RiskWeights::default());
        assert_eq!(metrics.roll_trend, RollDirection::Improving);
        let sliding = OfficerInputs {
            loans_worsening: 4,
            loans_improving: 1,
            ..healthy()
        };
        assert_eq!(roll_trend(&sliding), RollDirection::Worsening);
        assert_eq!(roll_trend(&OfficerInputs::default()), RollDirection::Stable);
    }

    #[test]
    fn test_inputs_sum() {
        let mut branch = OfficerInputs::default();
        branch += &healthy();
        branch += &healthy();
        assert_eq!(branch.loans_disbursed, 100);
        assert_eq!(fimr(&branch), dec!(0.02));
        assert_eq!(branch.avg_loan_age(), dec!(30));
    }
}
