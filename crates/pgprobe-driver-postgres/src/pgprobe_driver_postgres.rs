//! PostgreSQL driver for pgprobe
//!
//! Implements the `pgprobe_core::Connection` trait on top of
//! tokio-postgres. The probe only ever reads, so this driver exposes a
//! single-query surface without transactions or schema introspection.

mod connection;

pub use connection::*;
