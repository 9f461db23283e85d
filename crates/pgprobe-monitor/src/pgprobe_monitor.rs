//! pgprobe monitor - connection aggregation and metric emission
//!
//! This crate holds the probe's aggregation logic:
//! - Folding `pg_stat_activity` groups into per-client connection counts
//! - The synthetic `all` pseudo-client summarizing every real client
//! - Rendering the finalized table as Graphite metric lines

pub mod connections;
pub mod graphite;

pub use connections::*;
pub use graphite::*;
