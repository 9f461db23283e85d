//! Connection metrics collector
//!
//! Runs the aggregation query against a live connection and parses the
//! result rows into `ConnectionRow` values for the fold.

use crate::connections::{ClientKey, ClientTable, ConnectionRow, WaitState};
use pgprobe_core::{Connection, ProbeError, Result, Row, Value};

/// Collects per-client connection counts for one database
pub struct ConnectionsCollector {
    database: String,
}

impl ConnectionsCollector {
    /// Create a collector for the given database name
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// The database this collector targets
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run the aggregation query and fold the rows into a finalized table
    pub async fn collect<C: Connection>(&self, conn: &C) -> Result<ClientTable> {
        let result = conn
            .query(
                ConnectionsQuery::postgres(),
                &[Value::String(self.database.clone())],
            )
            .await?;

        let rows: Vec<ConnectionRow> = result
            .rows
            .iter()
            .map(parse_row)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            database = %self.database,
            groups = rows.len(),
            "aggregating connection groups"
        );

        Ok(ClientTable::aggregate(rows))
    }
}

/// Parse one result row into a `ConnectionRow`.
///
/// `count` may arrive as an integer or a numeric string; anything else is a
/// data format error. A missing or NULL `client_addr` resolves to the
/// `Local` key.
pub fn parse_row(row: &Row) -> Result<ConnectionRow> {
    let count = row
        .get_by_name("count")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ProbeError::DataFormat(format!(
                "non-numeric count in row: {:?}",
                row.get_by_name("count")
            ))
        })?;

    let client = match row.get_by_name("client_addr") {
        None | Some(Value::Null) => ClientKey::Local,
        Some(value) => ClientKey::Address(value.to_string()),
    };

    let wait = parse_wait_marker(row.get_by_name("waiting"));

    Ok(ConnectionRow::new(client, wait, count))
}

/// Interpret the two-valued waiting marker.
///
/// Booleans are the native form; the textual `t`/`f` markers that older
/// servers and text-mode results produce are also accepted. Anything else
/// is unrecognized and counts toward neither bucket.
fn parse_wait_marker(value: Option<&Value>) -> WaitState {
    match value {
        Some(Value::Bool(true)) => WaitState::Waiting,
        Some(Value::Bool(false)) => WaitState::Active,
        Some(Value::String(s)) => match s.as_str() {
            "t" | "true" => WaitState::Waiting,
            "f" | "false" => WaitState::Active,
            _ => WaitState::Unrecognized,
        },
        _ => WaitState::Unrecognized,
    }
}

/// SQL for the connection aggregation query
pub struct ConnectionsQuery;

impl ConnectionsQuery {
    /// PostgreSQL aggregation over `pg_stat_activity`.
    ///
    /// `pg_stat_activity.waiting` was removed in PostgreSQL 9.6; the marker
    /// is derived from `wait_event` instead. The database name is bound as
    /// a parameter, and `client_addr` is cast to text so the driver does
    /// not need inet support.
    pub fn postgres() -> &'static str {
        r#"
        SELECT count(*) AS count,
               client_addr::text AS client_addr,
               wait_event IS NOT NULL AS waiting
        FROM pg_stat_activity
        WHERE datname = $1
        GROUP BY client_addr, waiting
        ORDER BY client_addr
        "#
    }
}
