//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! standard policy:
//!
//! ```toml
//! grace_period_days = 4
//! slippage_horizon_days = 7
//! period_days = 30
//! float_gap_days = 3
//! approved_channels = ["bank_transfer", "card", "ussd", "wallet"]
//!
//! [scheduler]
//! interval_minutes = 15
//! overrun_threshold_secs = 900
//!
//! [risk_weights]
//! porr = 20
//! fimr = 15
//! # ...
//! ```

use crate::core::error::ErrorCode;
use crate::metrics::formulas::RiskWeights;
use chrono::{Duration, NaiveDate};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 4;

/// Upper bounds accepted by [`EngineConfig::validate`].
const MAX_PERIOD_DAYS: u32 = 3660;
const MAX_HORIZON_DAYS: u32 = 365;
const MAX_INTERVAL_MINUTES: u64 = 10_080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ConfigError
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    /// A run taking longer than this is flagged as overrun; it is never killed.
    pub overrun_threshold_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            overrun_threshold_secs: 900,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn overrun_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.overrun_threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grace_period_days: u32,
    pub slippage_horizon_days: u32,
    pub period_days: u32,
    /// Repayments recorded more than this many days after payment count as float gap.
    pub float_gap_days: u32,
    pub approved_channels: Vec<String>,
    pub scheduler: SchedulerConfig,
    pub risk_weights: RiskWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            slippage_horizon_days: 7,
            period_days: 30,
            float_gap_days: 3,
            approved_channels: ["bank_transfer", "card", "ussd", "wallet"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            scheduler: SchedulerConfig::default(),
            risk_weights: RiskWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.risk_weights.total();
        if total != dec!(100) {
            return Err(ConfigError::Invalid(format!(
                "risk weights must sum to 100, got {}",
                total
            )));
        }
        if !(1..=MAX_PERIOD_DAYS).contains(&self.period_days) {
            return Err(ConfigError::Invalid(format!(
                "period_days must be within 1..={}, got {}",
                MAX_PERIOD_DAYS, self.period_days
            )));
        }
        for (name, days) in [
            ("grace_period_days", self.grace_period_days),
            ("slippage_horizon_days", self.slippage_horizon_days),
            ("float_gap_days", self.float_gap_days),
        ] {
            if days > MAX_HORIZON_DAYS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_HORIZON_DAYS, days
                )));
            }
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.scheduler.interval_minutes) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.interval_minutes must be within 1..={}, got {}",
                MAX_INTERVAL_MINUTES, self.scheduler.interval_minutes
            )));
        }
        Ok(())
    }

    /// First day of the metric period ending on `calculation_date`. Saturates
    /// at the earliest representable date.
    pub fn period_start(&self, calculation_date: NaiveDate) -> NaiveDate {
        let back = Duration::days(i64::from(self.period_days.saturating_sub(1)));
        calculation_date
            .checked_sub_signed(back)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn mid_period(&self, calculation_date: NaiveDate) -> NaiveDate {
        let forward = Duration::days(i64::from(self.period_days / 2));
        self.period_start(calculation_date)
            .checked_add_signed(forward)
            .unwrap_or(calculation_date)
            .min(calculation_date)
    }

    pub fn is_approved_channel(&self, channel: Option<&str>) -> bool {
        channel.is_some_and(|c| {
            self.approved_channels
                .iter()
                .any(|a| a.eq_ignore_ascii_case(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.grace_period_days, 4);
        assert_eq!(config.scheduler.interval_minutes, 15);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            grace_period_days = 7
            approved_channels = ["card"]

            [scheduler]
            interval_minutes = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.grace_period_days, 7);
        assert_eq!(config.scheduler.interval_minutes, 30);
        assert_eq!(config.scheduler.overrun_threshold_secs, 900);
        assert!(config.is_approved_channel(Some("CARD")));
        assert!(!config.is_approved_channel(Some("cash")));
        assert!(!config.is_approved_channel(None));
    }

    #[test]
    fn test_weights_must_sum_to_hundred() {
        let err = EngineConfig::from_toml_str("[risk_weights]\nporr = 50\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(err.code(), ErrorCode::ConfigError);
    }

    #[test]
    fn test_period_bounds() {
        let config = EngineConfig::default();
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(config.period_start(date), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(config.mid_period(date), NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for toml in [
            "period_days = 4000000000",
            "period_days = 0",
            "grace_period_days = 100000",
            "slippage_horizon_days = 4000000000",
            "float_gap_days = 366",
            "[scheduler]\ninterval_minutes = 9223372036854775807",
        ] {
            let err = EngineConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{}: {}", toml, err);
        }
        assert!(EngineConfig::from_toml_str("period_days = 3660\ngrace_period_days = 365").is_ok());
    }

    #[test]
    fn test_unvalidated_period_saturates() {
        let config = EngineConfig {
            period_days: u32::MAX,
            ..EngineConfig::default()
        };
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        assert_eq!(config.period_start(date), NaiveDate::MIN);
        assert!(config.mid_period(date) <= date);
    }
}
