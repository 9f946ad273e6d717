//! Proportional component estimation for repayments reported as a single amount.
//!
//! Some upstream records carry only a total. The split below is an
//! approximation derived from the loan's contractual totals, never an exact
//! reconstruction; repayments built this way are flagged
//! `components_estimated`.

use crate::core::amount::{safe_div, Components};
use crate::core::loan::Loan;
use rust_decimal::Decimal;

const MONEY_DP: u32 = 2;

/// Split `amount` across principal, interest and fee in proportion to the
/// loan's expected totals. Principal absorbs rounding so the components always
/// sum back to `amount`.
///
/// ```
/// use loan_metrics_engine::engine::allocation::estimate_components;
/// # use loan_metrics_engine::core::loan::{Loan, LoanStatus};
/// # use chrono::{NaiveDate, Utc};
/// # use rust_decimal_macros::dec;
/// # let loan = Loan {
/// #     id: "LN-1".into(), customer_id: "C-1".into(), officer_id: "OFF-1".into(),
/// #     branch_id: "B-1".into(), principal: dec!(1000), fee_amount: dec!(50),
/// #     interest_rate: dec!(0.365),
/// #     disbursement_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
/// #     term_days: 100, status: LoanStatus::Active, channel: None,
/// #     first_payment_due_date: None, updated_at: Utc::now(),
/// # };
/// // expected: principal 1000, interest 100, fee 50 → total 1150
/// let split = estimate_components(&loan, dec!(115));
/// assert_eq!(split.interest, dec!(10));
/// assert_eq!(split.fee, dec!(5));
/// assert_eq!(split.principal, dec!(100));
/// ```
pub fn estimate_components(loan: &Loan, amount: Decimal) -> Components {
    let expected = loan.expected_components();
    let total = expected.scheduled_total();
    if total.is_zero() {
        return Components::new(amount, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
    }

    let interest = (amount * safe_div(expected.interest, total)).round_dp(MONEY_DP);
    let fee = (amount * safe_div(expected.fee, total)).round_dp(MONEY_DP);
    Components::new(amount - interest - fee, interest, fee, Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loan::LoanStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn loan(principal: Decimal, rate: Decimal, fee: Decimal) -> Loan {
        Loan {
            id: "LN-1".into(),
            customer_id: "C-1".into(),
            officer_id: "OFF-1".into(),
            branch_id: "B-1".into(),
            principal,
            fee_amount: fee,
            interest_rate: rate,
            disbursement_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            term_days: 73,
            status: LoanStatus::Active,
            channel: None,
            first_payment_due_date: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_split_sums_to_amount() {
        let l = loan(dec!(50000), dec!(0.3), dec!(1250));
        let split = estimate_components(&l, dec!(7777.77));
        assert_eq!(split.total(), dec!(7777.77));
        assert!(split.interest > Decimal::ZERO);
        assert!(split.fee > Decimal::ZERO);
    }

    #[test]
    fn test_zero_terms_goes_to_principal() {
        let l = loan(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let split = estimate_components(&l, dec!(100));
        assert_eq!(split.principal, dec!(100));
        assert_eq!(split.interest, Decimal::ZERO);
    }

    #[test]
    fn test_interest_free_loan() {
        let l = loan(dec!(1000), Decimal::ZERO, Decimal::ZERO);
        let split = estimate_components(&l, dec!(250));
        assert_eq!(split.principal, dec!(250));
        assert_eq!(split.fee, Decimal::ZERO);
    }
}
