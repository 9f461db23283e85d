//! Graphite metric line emission
//!
//! Each finalized client entry yields one line per field:
//! `<scheme>.connections.<db>.<field><delimiter>host=<client> <value> <ts>`

use crate::connections::ClientTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric naming configuration, resolved once at startup.
///
/// The scheme prefix defaults to `<local-hostname>.postgresql` but is
/// always passed in explicitly; the emitter never reads ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphiteConfig {
    /// Prefix for every metric path
    pub scheme: String,
    /// Database name segment
    pub database: String,
    /// Delimiter between the metric path and the host tag
    pub delimiter: String,
}

impl GraphiteConfig {
    /// Create a naming configuration
    pub fn new(
        scheme: impl Into<String>,
        database: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            database: database.into(),
            delimiter: delimiter.into(),
        }
    }

    /// Build the metric path for one field of one client
    pub fn metric_path(&self, field: &str, client: &str) -> String {
        format!(
            "{}.connections.{}.{}{}host={}",
            self.scheme, self.database, field, self.delimiter, client
        )
    }
}

/// One `(metric_path, value, timestamp)` emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLine {
    /// Full metric path including the host tag
    pub path: String,
    /// Metric value
    pub value: i64,
    /// Unix timestamp of the run
    pub timestamp: i64,
}

impl std::fmt::Display for MetricLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.path, self.value, self.timestamp)
    }
}

/// Render a finalized table as metric lines.
///
/// Emits exactly `3 * table.len()` lines: one per field per entry, in the
/// table's deterministic key order with the `all` entry last.
pub fn emit_table(
    table: &ClientTable,
    config: &GraphiteConfig,
    timestamp: DateTime<Utc>,
) -> Vec<MetricLine> {
    let unix = timestamp.timestamp();
    let mut lines = Vec::with_capacity(table.len() * 3);

    for (client, metrics) in table.iter() {
        let client = client.to_string();
        for (field, value) in metrics.fields() {
            lines.push(MetricLine {
                path: config.metric_path(field, &client),
                value,
                timestamp: unix,
            });
        }
    }

    lines
}
