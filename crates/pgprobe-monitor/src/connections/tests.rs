//! Unit tests for connection aggregation

use super::*;

mod client_key_tests {
    use super::*;

    #[test]
    fn test_from_addr() {
        assert_eq!(
            ClientKey::from_addr(Some("10.0.0.1")),
            ClientKey::Address("10.0.0.1".to_string())
        );
        assert_eq!(ClientKey::from_addr(None), ClientKey::Local);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ClientKey::Address("192.168.1.9".to_string()).to_string(),
            "192.168.1.9"
        );
        assert_eq!(ClientKey::Local.to_string(), "local");
        assert_eq!(ClientKey::Aggregate.to_string(), "all");
    }

    #[test]
    fn test_ordering_puts_aggregate_last() {
        let mut keys = vec![
            ClientKey::Aggregate,
            ClientKey::Local,
            ClientKey::Address("10.0.0.2".to_string()),
            ClientKey::Address("10.0.0.1".to_string()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ClientKey::Address("10.0.0.1".to_string()),
                ClientKey::Address("10.0.0.2".to_string()),
                ClientKey::Local,
                ClientKey::Aggregate,
            ]
        );
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ClientKey::Aggregate).unwrap();
        assert_eq!(json, "\"aggregate\"");
        let key: ClientKey = serde_json::from_str("{\"address\":\"10.0.0.1\"}").unwrap();
        assert_eq!(key, ClientKey::Address("10.0.0.1".to_string()));
    }
}

mod aggregate_tests {
    use super::*;

    fn addr(a: &str) -> ClientKey {
        ClientKey::Address(a.to_string())
    }

    #[test]
    fn test_scenario_from_three_groups() {
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 2),
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Waiting, 1),
            ConnectionRow::new(addr("10.0.0.2"), WaitState::Active, 5),
        ];
        let table = ClientTable::aggregate(rows);

        assert_eq!(
            table.get(&addr("10.0.0.1")),
            Some(&ClientMetrics {
                active: 2,
                waiting: 1,
                total: 3
            })
        );
        assert_eq!(
            table.get(&addr("10.0.0.2")),
            Some(&ClientMetrics {
                active: 5,
                waiting: 0,
                total: 5
            })
        );
        assert_eq!(
            table.get(&ClientKey::Aggregate),
            Some(&ClientMetrics {
                active: 7,
                waiting: 1,
                total: 8
            })
        );
        assert_eq!(table.distinct_clients(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_total_is_active_plus_waiting() {
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 4),
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Waiting, 3),
            ConnectionRow::new(ClientKey::Local, WaitState::Waiting, 2),
        ];
        let table = ClientTable::aggregate(rows);

        for (_, metrics) in table.iter() {
            assert_eq!(metrics.total, metrics.active + metrics.waiting);
        }
    }

    #[test]
    fn test_aggregate_excludes_itself() {
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 1),
            ConnectionRow::new(addr("10.0.0.2"), WaitState::Active, 1),
        ];
        let table = ClientTable::aggregate(rows);

        let all = table.get(&ClientKey::Aggregate).unwrap();
        assert_eq!(all.active, 2);
        assert_eq!(all.waiting, 0);
        assert_eq!(all.total, 2);
    }

    #[test]
    fn test_duplicate_groups_accumulate() {
        // Coarser-than-expected upstream grouping must sum, not overwrite.
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 2),
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 3),
        ];
        let table = ClientTable::aggregate(rows);

        assert_eq!(table.get(&addr("10.0.0.1")).unwrap().active, 5);
    }

    #[test]
    fn test_opposite_wait_states_do_not_overwrite() {
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Waiting, 7),
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 9),
        ];
        let table = ClientTable::aggregate(rows);

        let metrics = table.get(&addr("10.0.0.1")).unwrap();
        assert_eq!(metrics.waiting, 7);
        assert_eq!(metrics.active, 9);
        assert_eq!(metrics.total, 16);
    }

    #[test]
    fn test_unrecognized_wait_establishes_zero_entry() {
        let rows = vec![ConnectionRow::new(
            addr("10.0.0.1"),
            WaitState::Unrecognized,
            4,
        )];
        let table = ClientTable::aggregate(rows);

        assert_eq!(
            table.get(&addr("10.0.0.1")),
            Some(&ClientMetrics::default())
        );
        assert_eq!(table.distinct_clients(), 1);
    }

    #[test]
    fn test_empty_rows_yield_only_aggregate() {
        let table = ClientTable::aggregate(Vec::new());

        assert_eq!(table.len(), 1);
        assert_eq!(table.distinct_clients(), 0);
        assert_eq!(
            table.get(&ClientKey::Aggregate),
            Some(&ClientMetrics::default())
        );
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let rows = vec![
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 2),
            ConnectionRow::new(ClientKey::Local, WaitState::Waiting, 1),
        ];
        let first = ClientTable::aggregate(rows.clone());
        let second = ClientTable::aggregate(rows);

        assert_eq!(first, second);
    }

    #[test]
    fn test_local_key_is_distinct_from_addresses() {
        let rows = vec![
            ConnectionRow::new(ClientKey::Local, WaitState::Active, 3),
            ConnectionRow::new(addr("10.0.0.1"), WaitState::Active, 1),
        ];
        let table = ClientTable::aggregate(rows);

        assert_eq!(table.get(&ClientKey::Local).unwrap().active, 3);
        assert_eq!(table.distinct_clients(), 2);
    }
}

mod collector_tests {
    use super::*;
    use async_trait::async_trait;
    use pgprobe_core::{
        ColumnMeta, Connection, ProbeError, QueryResult, Result, Row, Value,
    };
    use std::sync::Mutex;

    fn result_row(count: Value, client_addr: Value, waiting: Value) -> Row {
        Row::new(
            vec![
                "count".to_string(),
                "client_addr".to_string(),
                "waiting".to_string(),
            ],
            vec![count, client_addr, waiting],
        )
    }

    /// Connection stub returning a canned result and recording the query
    struct StubConnection {
        rows: Vec<Row>,
        seen: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl StubConnection {
        fn new(rows: Vec<Row>) -> Self {
            Self {
                rows,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Connection for StubConnection {
        fn driver_name(&self) -> &str {
            "stub"
        }

        async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.seen
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            let mut result = QueryResult::empty();
            result.columns = vec![
                ColumnMeta {
                    name: "count".to_string(),
                    data_type: "int8".to_string(),
                    ordinal: 0,
                },
                ColumnMeta {
                    name: "client_addr".to_string(),
                    data_type: "text".to_string(),
                    ordinal: 1,
                },
                ColumnMeta {
                    name: "waiting".to_string(),
                    data_type: "bool".to_string(),
                    ordinal: 2,
                },
            ];
            result.rows = self.rows.clone();
            Ok(result)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_collect_builds_finalized_table() {
        let conn = StubConnection::new(vec![
            result_row(
                Value::Int64(2),
                Value::String("10.0.0.1".to_string()),
                Value::Bool(false),
            ),
            result_row(
                Value::Int64(1),
                Value::String("10.0.0.1".to_string()),
                Value::Bool(true),
            ),
            result_row(
                Value::Int64(5),
                Value::String("10.0.0.2".to_string()),
                Value::Bool(false),
            ),
        ]);

        let collector = ConnectionsCollector::new("postgres");
        let table = collector.collect(&conn).await.unwrap();

        assert_eq!(
            table.get(&ClientKey::Aggregate),
            Some(&ClientMetrics {
                active: 7,
                waiting: 1,
                total: 8
            })
        );

        let seen = conn.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("pg_stat_activity"));
        assert_eq!(seen[0].1, vec![Value::String("postgres".to_string())]);
    }

    #[tokio::test]
    async fn test_collect_resolves_null_addr_to_local() {
        let conn = StubConnection::new(vec![result_row(
            Value::Int64(4),
            Value::Null,
            Value::Bool(false),
        )]);

        let collector = ConnectionsCollector::new("postgres");
        let table = collector.collect(&conn).await.unwrap();

        assert_eq!(table.get(&ClientKey::Local).unwrap().active, 4);
    }

    #[tokio::test]
    async fn test_collect_rejects_non_numeric_count() {
        let conn = StubConnection::new(vec![result_row(
            Value::String("lots".to_string()),
            Value::Null,
            Value::Bool(false),
        )]);

        let collector = ConnectionsCollector::new("postgres");
        let err = collector.collect(&conn).await.unwrap_err();

        assert!(matches!(err, ProbeError::DataFormat(_)));
    }

    #[test]
    fn test_parse_row_coerces_numeric_strings() {
        let row = result_row(
            Value::String("12".to_string()),
            Value::String("10.0.0.1".to_string()),
            Value::Bool(true),
        );
        let parsed = parse_row(&row).unwrap();

        assert_eq!(parsed.count, 12);
        assert_eq!(parsed.wait, WaitState::Waiting);
        assert_eq!(parsed.client, ClientKey::Address("10.0.0.1".to_string()));
    }

    #[test]
    fn test_parse_row_accepts_textual_markers() {
        let waiting = result_row(
            Value::Int64(1),
            Value::Null,
            Value::String("t".to_string()),
        );
        assert_eq!(parse_row(&waiting).unwrap().wait, WaitState::Waiting);

        let active = result_row(
            Value::Int64(1),
            Value::Null,
            Value::String("f".to_string()),
        );
        assert_eq!(parse_row(&active).unwrap().wait, WaitState::Active);
    }

    #[test]
    fn test_parse_row_unrecognized_marker() {
        let row = result_row(
            Value::Int64(1),
            Value::Null,
            Value::String("maybe".to_string()),
        );
        assert_eq!(parse_row(&row).unwrap().wait, WaitState::Unrecognized);

        let null_marker = result_row(Value::Int64(1), Value::Null, Value::Null);
        assert_eq!(parse_row(&null_marker).unwrap().wait, WaitState::Unrecognized);
    }
}
