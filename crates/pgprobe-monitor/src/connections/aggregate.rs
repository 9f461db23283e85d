//! Per-client connection aggregation
//!
//! The fold is commutative and associative: rows for the same client key
//! accumulate by addition, never overwrite, so the upstream grouping may be
//! coarser than expected without losing counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a connection origin.
///
/// Variant order drives `Ord`: real addresses sort lexically first, then
/// local sessions, then the synthetic aggregate, so emission order is
/// deterministic with `all` last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKey {
    /// A remote client address
    Address(String),
    /// Sessions with no client address (unix-socket or local connections)
    Local,
    /// The synthetic pseudo-client summarizing totals across all clients
    Aggregate,
}

impl ClientKey {
    /// Resolve a key from the nullable `client_addr` column
    pub fn from_addr(addr: Option<&str>) -> Self {
        match addr {
            Some(a) => ClientKey::Address(a.to_string()),
            None => ClientKey::Local,
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientKey::Address(addr) => write!(f, "{}", addr),
            ClientKey::Local => write!(f, "local"),
            ClientKey::Aggregate => write!(f, "all"),
        }
    }
}

/// Waiting marker of one `pg_stat_activity` group.
///
/// Unrecognized markers contribute to neither bucket but still establish a
/// zero-valued client entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Sessions blocked awaiting a lock or resource
    Waiting,
    /// Sessions actively executing
    Active,
    /// Marker value the probe does not understand
    Unrecognized,
}

/// One group produced by the upstream `GROUP BY (client_addr, waiting)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    /// Resolved client identity
    pub client: ClientKey,
    /// Waiting marker for the group
    pub wait: WaitState,
    /// Number of sessions in the group
    pub count: i64,
}

impl ConnectionRow {
    /// Create a new row
    pub fn new(client: ClientKey, wait: WaitState, count: i64) -> Self {
        Self {
            client,
            wait,
            count,
        }
    }
}

/// Connection counts for one client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetrics {
    /// Sessions actively executing
    pub active: i64,
    /// Sessions blocked awaiting a lock or resource
    pub waiting: i64,
    /// Sum of active and waiting, computed at finalization
    pub total: i64,
}

impl ClientMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group's count to the bucket selected by its wait state
    fn record(&mut self, wait: WaitState, count: i64) {
        match wait {
            WaitState::Waiting => self.waiting += count,
            WaitState::Active => self.active += count,
            WaitState::Unrecognized => {}
        }
    }

    /// The emitted fields, in emission order
    pub fn fields(&self) -> [(&'static str, i64); 3] {
        [
            ("active", self.active),
            ("waiting", self.waiting),
            ("total", self.total),
        ]
    }
}

/// Finalized mapping from client identity to connection counts.
///
/// Built fresh for every run: fold the rows, compute totals, insert the
/// `all` entry. Once constructed the table is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTable {
    entries: BTreeMap<ClientKey, ClientMetrics>,
}

impl ClientTable {
    /// Fold a finite row sequence into a finalized table.
    ///
    /// The grand total sums every genuine per-client entry and is inserted
    /// under `ClientKey::Aggregate` exactly once; it never includes itself.
    pub fn aggregate<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ConnectionRow>,
    {
        let mut entries: BTreeMap<ClientKey, ClientMetrics> = BTreeMap::new();

        for row in rows {
            entries
                .entry(row.client)
                .or_default()
                .record(row.wait, row.count);
        }

        for metrics in entries.values_mut() {
            metrics.total = metrics.active + metrics.waiting;
        }

        let mut all = ClientMetrics::new();
        for metrics in entries.values() {
            all.active += metrics.active;
            all.waiting += metrics.waiting;
            all.total += metrics.total;
        }
        entries.insert(ClientKey::Aggregate, all);

        Self { entries }
    }

    /// Look up the metrics for a client key
    pub fn get(&self, key: &ClientKey) -> Option<&ClientMetrics> {
        self.entries.get(key)
    }

    /// Iterate entries in deterministic key order (`all` last)
    pub fn iter(&self) -> impl Iterator<Item = (&ClientKey, &ClientMetrics)> {
        self.entries.iter()
    }

    /// Number of entries including the synthetic aggregate
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True only for a table that somehow lacks even the aggregate entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of genuine clients observed (the aggregate excluded)
    pub fn distinct_clients(&self) -> usize {
        self.entries
            .keys()
            .filter(|k| **k != ClientKey::Aggregate)
            .count()
    }
}
