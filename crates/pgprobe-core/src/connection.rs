//! Connection trait

use crate::{QueryResult, Result, Value};
use async_trait::async_trait;

/// A database connection
///
/// The probe acquires exactly one connection per run and holds it for the
/// duration of a single query.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
