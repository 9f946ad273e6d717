//! Officer and branch metric formulas and band classification.

pub mod bands;
pub mod formulas;
