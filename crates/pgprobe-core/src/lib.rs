//! pgprobe core - shared abstractions for the connection probe
//!
//! This crate provides the fundamental traits and types the driver and
//! monitor crates depend on:
//!
//! - `Connection` - Trait for database connections
//! - `ProbeError` / `Result` - Error taxonomy for a probe run
//! - Common types like `Value`, `Row` and `QueryResult`

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
