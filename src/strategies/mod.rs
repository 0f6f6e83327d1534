//! Trading strategies
//!
//! - `copy_sell`: mirror the exits of a tracked wallet

pub mod copy_sell;

pub use copy_sell::{run_copy_sell, tokens_to_sell, CopySell};
