//! # Raydium CLI
//!
//! Command-line trading toolkit for Raydium AMM v4 pools on Solana.
//!
//! ## Architecture
//!
//! - `block_engine`: transaction landing (expiry tracking, confirmation
//!   polling, direct and relay submission, bounded retries)
//! - `engine`: trading operations (swap, volume, liquidity, authority revocation)
//! - `strategies`: long-running strategies (copy-sell)
//! - `dex`: Raydium AMM and OpenBook account parsing and instruction builders
//! - `common`: mint cache and positions store
//! - `utils`: configuration, logging and AMM math

pub mod block_engine;
pub mod cli;
pub mod common;
pub mod dex;
pub mod engine;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use engine::TradingContext;
pub use utils::config::Config;
