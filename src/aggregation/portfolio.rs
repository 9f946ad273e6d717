use crate::core::amount::safe_div;
use crate::core::ids::OfficerId;
use crate::metrics::bands::RiskBand;
use crate::snapshot::store::OfficerMetricSnapshot;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// An officer is at risk when both averages exceed these day counts.
const AT_RISK_DAYS_SINCE_REPAYMENT: Decimal = dec!(10);
const AT_RISK_LOAN_AGE: Decimal = dec!(14);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfficer {
    pub officer_id: OfficerId,
    pub officer_name: String,
    pub ayr: Decimal,
}

/// Portfolio-wide roll-up of one date's officer snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub calculation_date: NaiveDate,
    pub officer_count: usize,
    pub total_portfolio: Decimal,
    pub total_overdue_15d: Decimal,
    pub avg_dqi: Decimal,
    pub avg_ayr: Decimal,
    pub avg_risk_score: Decimal,
    /// Averaged over officers with a nonzero rate.
    pub avg_repayment_delay_rate: Decimal,
    pub top_officer: Option<TopOfficer>,
    pub watchlist_count: usize,
    pub watchlist_portfolio: Decimal,
    pub at_risk_officers: usize,
    pub at_risk_percentage: Decimal,
}

impl PortfolioSummary {
    pub fn from_snapshots(
        calculation_date: NaiveDate,
        snapshots: &[OfficerMetricSnapshot],
    ) -> Self {
        let count = Decimal::from(snapshots.len());
        let mut total_portfolio = Decimal::ZERO;
        let mut total_overdue_15d = Decimal::ZERO;
        let (mut dqi, mut ayr, mut risk) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let (mut delay_sum, mut delay_n) = (Decimal::ZERO, 0u32);
        let mut watchlist_count = 0;
        let mut watchlist_portfolio = Decimal::ZERO;
        let mut at_risk_officers = 0;
        let mut top: Option<&OfficerMetricSnapshot> = None;

        for snap in snapshots {
            let m = &snap.metrics;
            total_portfolio += snap.inputs.total_portfolio;
            total_overdue_15d += snap.inputs.overdue_15d;
            dqi += m.dqi;
            ayr += m.ayr;
            risk += m.risk_score;
            if !m.repayment_delay_rate.is_zero() {
                delay_sum += m.repayment_delay_rate;
                delay_n += 1;
            }
            if m.bands.risk == RiskBand::Red {
                watchlist_count += 1;
                watchlist_portfolio += snap.inputs.total_portfolio;
            }
            if snap.inputs.avg_days_since_last_repayment() > AT_RISK_DAYS_SINCE_REPAYMENT
                && snap.inputs.avg_loan_age() > AT_RISK_LOAN_AGE
            {
                at_risk_officers += 1;
            }
            if m.ayr > Decimal::ZERO && top.map_or(true, |t| m.ayr > t.metrics.ayr) {
                top = Some(snap);
            }
        }

        Self {
            calculation_date,
            officer_count: snapshots.len(),
            total_portfolio,
            total_overdue_15d,
            avg_dqi: safe_div(dqi, count).round_dp(2),
            avg_ayr: safe_div(ayr, count).round_dp(6),
            avg_risk_score: safe_div(risk, count).round_dp(2),
            avg_repayment_delay_rate: safe_div(delay_sum, Decimal::from(delay_n)).round_dp(2),
            top_officer: top.map(|t| TopOfficer {
                officer_id: t.officer_id.clone(),
                officer_name: t.officer_name.clone(),
                ayr: t.metrics.ayr,
            }),
            watchlist_count,
            watchlist_portfolio,
            at_risk_officers,
            at_risk_percentage: (safe_div(Decimal::from(at_risk_officers), count) * dec!(100))
                .round_dp(2),
        }
    }
}

impl std::fmt::Display for PortfolioSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Portfolio Summary {} ===", self.calculation_date)?;
        writeln!(f, "Officers:          {}", self.officer_count)?;
        writeln!(f, "Total Portfolio:   {}", self.total_portfolio)?;
        writeln!(f, "Overdue >15d:      {}", self.total_overdue_15d)?;
        writeln!(f, "Avg DQI:           {}", self.avg_dqi)?;
        writeln!(f, "Avg AYR:           {}", self.avg_ayr)?;
        writeln!(f, "Avg Risk Score:    {}", self.avg_risk_score)?;
        writeln!(f, "Avg Delay Rate:    {}%", self.avg_repayment_delay_rate)?;
        if let Some(top) = &self.top_officer {
            writeln!(
                f,
                "Top Officer:       {} ({}) AYR {}",
                top.officer_name, top.officer_id, top.ayr
            )?;
        }
        writeln!(
            f,
            "Watchlist:         {} officers, {} portfolio",
            self.watchlist_count, self.watchlist_portfolio
        )?;
        writeln!(
            f,
            "At Risk:           {} officers ({}%)",
            self.at_risk_officers, self.at_risk_percentage
        )
    }
}
