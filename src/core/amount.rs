//! Shared arithmetic for balances and ratios.
//!
//! Every outstanding balance in the crate goes through [`floor_zero`] and every
//! ratio goes through [`safe_div`], so the non-negativity and zero-denominator
//! rules hold in one place.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

/// `max(0, value)`.
pub fn floor_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// `numerator / denominator`, or zero when the denominator is zero.
///
/// ```
/// use loan_metrics_engine::core::amount::safe_div;
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(safe_div(dec!(3), dec!(4)), dec!(0.75));
/// assert_eq!(safe_div(dec!(3), Decimal::ZERO), Decimal::ZERO);
/// ```
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

/// Clamp into `[0, 1]`.
pub fn clamp_unit(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}

/// A monetary amount split into repayment components.
///
/// Used for repayment breakdowns, cumulative paid totals, installment dues and
/// outstanding balances alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Components {
    pub principal: Decimal,
    pub interest: Decimal,
    pub fee: Decimal,
    pub penalty: Decimal,
}

impl Components {
    pub fn new(principal: Decimal, interest: Decimal, fee: Decimal, penalty: Decimal) -> Self {
        Self {
            principal,
            interest,
            fee,
            penalty,
        }
    }

    pub fn total(&self) -> Decimal {
        self.principal + self.interest + self.fee + self.penalty
    }

    /// Principal + interest + fee. Penalties are not part of the contractual schedule.
    pub fn scheduled_total(&self) -> Decimal {
        self.principal + self.interest + self.fee
    }

    /// Component-wise `max(0, self - other)`.
    pub fn outstanding_after(&self, paid: &Components) -> Components {
        Components {
            principal: floor_zero(self.principal - paid.principal),
            interest: floor_zero(self.interest - paid.interest),
            fee: floor_zero(self.fee - paid.fee),
            penalty: floor_zero(self.penalty - paid.penalty),
        }
    }

    /// Every component rounded to cents.
    pub fn rounded(&self) -> Components {
        self.map(|v| v.round_dp(2))
    }

    /// Every component multiplied by `factor` and rounded to cents.
    pub fn scaled(&self, factor: Decimal) -> Components {
        self.map(|v| (v * factor).round_dp(2))
    }

    fn map(&self, f: impl Fn(Decimal) -> Decimal) -> Components {
        Components::new(f(self.principal), f(self.interest), f(self.fee), f(self.penalty))
    }

    pub fn has_negative(&self) -> bool {
        [self.principal, self.interest, self.fee, self.penalty]
            .iter()
            .any(|v| *v < Decimal::ZERO)
    }
}

impl Add for Components {
    type Output = Components;

    fn add(self, rhs: Components) -> Components {
        Components {
            principal: self.principal + rhs.principal,
            interest: self.interest + rhs.interest,
            fee: self.fee + rhs.fee,
            penalty: self.penalty + rhs.penalty,
        }
    }
}

impl AddAssign for Components {
    fn add_assign(&mut self, rhs: Components) {
        *self = *self + rhs;
    }
}

impl Sub for Components {
    type Output = Components;

    fn sub(self, rhs: Components) -> Components {
        Components {
            principal: self.principal - rhs.principal,
            interest: self.interest - rhs.interest,
            fee: self.fee - rhs.fee,
            penalty: self.penalty - rhs.penalty,
        }
    }
}

impl std::iter::Sum for Components {
    fn sum<I: Iterator<Item = Components>>(iter: I) -> Self {
        iter.fold(Components::default(), |acc, c| acc + c)
    }
}
