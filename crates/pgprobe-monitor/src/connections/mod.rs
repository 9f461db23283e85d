//! Connection aggregation module
//!
//! Consumes the rows of one aggregation query over `pg_stat_activity` and
//! builds a finalized table of per-client connection counts.

mod aggregate;
mod collector;

#[cfg(test)]
mod tests;

pub use aggregate::*;
pub use collector::*;
