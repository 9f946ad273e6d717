use crate::core::amount::Components;
use crate::core::ids::{LoanId, RepaymentId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reversal metadata attached to a repayment that was later corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reversal {
    pub date: NaiveDate,
    pub reason: Option<String>,
}

/// One payment transaction against a loan.
///
/// Repayments are append-only. Amounts are fixed at ingestion and never
/// rewritten; a correction flags the original as reversed and arrives as a
/// new repayment. Reversed repayments are ignored by the recalculation engine.
///
/// # Examples
///
/// ```
/// use loan_metrics_engine::core::amount::Components;
/// use loan_metrics_engine::core::ids::{LoanId, RepaymentId};
/// use loan_metrics_engine::core::repayment::Repayment;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let r = Repayment::new(
///     RepaymentId::new("RP-1"),
///     LoanId::new("LN-1"),
///     NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
///     Components::new(dec!(900), dec!(80), dec!(20), dec!(0)),
/// );
/// assert_eq!(r.amount(), dec!(1000));
/// assert!(r.is_component_sum_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    id: RepaymentId,
    loan_id: LoanId,
    payment_date: NaiveDate,
    /// Total paid. Must equal the component sum.
    amount: Decimal,
    components: Components,
    /// True when the component split was estimated rather than reported upstream.
    #[serde(default)]
    components_estimated: bool,
    #[serde(default)]
    waiver_amount: Decimal,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    is_backdated: bool,
    /// Date the repayment was recorded upstream, when it differs from the payment date.
    #[serde(default)]
    recorded_on: Option<NaiveDate>,
    #[serde(default)]
    reversal: Option<Reversal>,
}

impl Repayment {
    /// Create a repayment whose amount is the sum of its components.
    pub fn new(
        id: RepaymentId,
        loan_id: LoanId,
        payment_date: NaiveDate,
        components: Components,
    ) -> Self {
        Self {
            id,
            loan_id,
            payment_date,
            amount: components.total(),
            components,
            components_estimated: false,
            waiver_amount: Decimal::ZERO,
            channel: None,
            is_backdated: false,
            recorded_on: None,
            reversal: None,
        }
    }

    /// Override the reported total. Ingestion checks it against the components.
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_waiver(mut self, waiver_amount: Decimal) -> Self {
        self.waiver_amount = waiver_amount;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_backdated(mut self, is_backdated: bool) -> Self {
        self.is_backdated = is_backdated;
        self
    }

    pub fn with_recorded_on(mut self, recorded_on: NaiveDate) -> Self {
        self.recorded_on = Some(recorded_on);
        self
    }

    pub fn with_estimated_components(mut self) -> Self {
        self.components_estimated = true;
        self
    }

    pub fn with_reversal(mut self, reversal: Reversal) -> Self {
        self.reversal = Some(reversal);
        self
    }

    pub(crate) fn mark_reversed(&mut self, reversal: Reversal) {
        self.reversal = Some(reversal);
    }

    // --- Accessors ---

    pub fn id(&self) -> &RepaymentId {
        &self.id
    }

    pub fn loan_id(&self) -> &LoanId {
        &self.loan_id
    }

    pub fn payment_date(&self) -> NaiveDate {
        self.payment_date
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn components_estimated(&self) -> bool {
        self.components_estimated
    }

    pub fn waiver_amount(&self) -> Decimal {
        self.waiver_amount
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn is_backdated(&self) -> bool {
        self.is_backdated
    }

    pub fn recorded_on(&self) -> NaiveDate {
        self.recorded_on.unwrap_or(self.payment_date)
    }

    pub fn reversal(&self) -> Option<&Reversal> {
        self.reversal.as_ref()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversal.is_some()
    }

    /// The repayment as it stood at the end of `date`: `None` when paid later,
    /// and not yet reversed when the reversal is dated after `date`.
    pub fn as_of(&self, date: NaiveDate) -> Option<Repayment> {
        if self.payment_date > date {
            return None;
        }
        let mut repayment = self.clone();
        if repayment.reversal.as_ref().is_some_and(|r| r.date > date) {
            repayment.reversal = None;
        }
        Some(repayment)
    }

    /// Compare the submitted payload, ignoring reversal metadata.
    pub fn same_facts(&self, other: &Repayment) -> bool {
        Repayment {
            reversal: other.reversal.clone(),
            ..self.clone()
        } == *other
    }

    /// `amount == principal + interest + fee + penalty`.
    pub fn is_component_sum_valid(&self) -> bool {
        self.amount == self.components.total()
    }
}
