//! State shared across operations
//!
//! - `cache`: decimals and owning program per mint
//! - `positions`: mints held by the copy-trading wallet

pub mod cache;
pub mod positions;
