//! Utility modules
//!
//! - Configuration management
//! - Logging setup
//! - AMM and amount math

pub mod config;
pub mod logger;
pub mod math;
