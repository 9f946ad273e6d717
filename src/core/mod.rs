pub mod amount;
pub mod error;
pub mod ids;
pub mod loan;
pub mod repayment;
pub mod schedule;
