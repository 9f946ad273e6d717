//! Synthetic data generation.

pub mod portfolio_gen;
