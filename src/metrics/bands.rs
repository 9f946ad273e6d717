//! Band classification. A value sitting exactly on a threshold belongs to the
//! better band.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-level band used by the individual ratios and DQI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricBand {
    Green,
    Watch,
    Flag,
}

impl fmt::Display for MetricBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricBand::Green => "green",
            MetricBand::Watch => "watch",
            MetricBand::Flag => "flag",
        };
        f.write_str(s)
    }
}

/// Four-level band derived from the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Green,
    Watch,
    Amber,
    Red,
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::Green => "green",
            RiskBand::Watch => "watch",
            RiskBand::Amber => "amber",
            RiskBand::Red => "red",
        };
        f.write_str(s)
    }
}

/// Lower is better.
fn ceiling_band(value: Decimal, green_max: Decimal, watch_max: Decimal) -> MetricBand {
    if value <= green_max {
        MetricBand::Green
    } else if value <= watch_max {
        MetricBand::Watch
    } else {
        MetricBand::Flag
    }
}

/// Higher is better.
fn floor_band(value: Decimal, green_min: Decimal, watch_min: Decimal) -> MetricBand {
    if value >= green_min {
        MetricBand::Green
    } else if value >= watch_min {
        MetricBand::Watch
    } else {
        MetricBand::Flag
    }
}

pub fn fimr_band(fimr: Decimal) -> MetricBand {
    ceiling_band(fimr, dec!(0.03), dec!(0.06))
}

pub fn slippage_band(slippage: Decimal) -> MetricBand {
    ceiling_band(slippage, dec!(0.05), dec!(0.08))
}

pub fn roll_band(roll: Decimal) -> MetricBand {
    ceiling_band(roll, dec!(0.25), dec!(0.35))
}

pub fn ayr_band(ayr: Decimal) -> MetricBand {
    floor_band(ayr, dec!(0.50), dec!(0.30))
}

pub fn dqi_band(dqi: Decimal) -> MetricBand {
    floor_band(dqi, dec!(75), dec!(65))
}

pub fn risk_band(score: Decimal) -> RiskBand {
    if score >= dec!(80) {
        RiskBand::Green
    } else if score >= dec!(60) {
        RiskBand::Watch
    } else if score >= dec!(40) {
        RiskBand::Amber
    } else {
        RiskBand::Red
    }
}
