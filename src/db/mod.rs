//! Database module for PulseWatch.
//!
//! Provides the durable SQLite result log and its running statistics.

mod models;
mod store;

pub use models::*;
pub use store::*;
