//! Data models shared across Parley crates.

pub mod call;
pub mod user;
