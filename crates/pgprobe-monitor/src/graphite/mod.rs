//! Graphite emission module
//!
//! Renders a finalized client table as timestamped Graphite metric lines.

mod emit;


pub use emit::*;
