//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_postgres::{types::ToSql, Client, NoTls, Row as PgRow};
use pgprobe_core::{ColumnMeta, Connection, ProbeError, QueryResult, Result, Row, Value};

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    match code.code() {
        "28000" | "28P01" => format!("authentication failed: {}", message),
        "3D000" => format!("database does not exist: {}", message),
        "42501" => format!("insufficient privilege: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: Client,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    ///
    /// The connection task is spawned onto the current Tokio runtime and
    /// lives until the client is dropped.
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
        ssl_mode: &str,
    ) -> Result<Self> {
        tracing::info!(
            host = %host,
            port = %port,
            database = %database,
            ssl_mode = %ssl_mode,
            "connecting to PostgreSQL database"
        );

        let mut config = tokio_postgres::Config::new();
        config.host(host).port(port).dbname(database);

        if let Some(u) = user {
            config.user(u);
        }
        if let Some(p) = password {
            config.password(p);
        }

        let ssl_mode_enum = match ssl_mode.to_lowercase().as_str() {
            "disable" => tokio_postgres::config::SslMode::Disable,
            "require" => tokio_postgres::config::SslMode::Require,
            _ => tokio_postgres::config::SslMode::Prefer,
        };
        config.ssl_mode(ssl_mode_enum);

        let client = if ssl_mode != "disable" {
            // The probe carries no CA configuration, so the server
            // certificate is not verified.
            let tls_connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| {
                    ProbeError::Connection(format!("Failed to build TLS connector: {}", e))
                })?;
            let tls = MakeTlsConnector::new(tls_connector);

            let (client, connection) = config.connect(tls).await.map_err(|e| {
                ProbeError::Connection(format!(
                    "Failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });

            client
        } else {
            let (client, connection) = config.connect(NoTls).await.map_err(|e| {
                ProbeError::Connection(format!(
                    "Failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });

            client
        };

        tracing::info!(host = %host, port = %port, database = %database, "PostgreSQL connection established");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }
}

/// Wrapper enum for converting pgprobe_core::Value to types implementing
/// ToSql. tokio-postgres requires owned values that implement ToSql.
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl PgValue {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &tokio_postgres::types::Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &tokio_postgres::types::Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> tokio_postgres::types::FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &tokio_postgres::types::Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let text = String::from_utf8(raw.to_vec())?;
        Ok(Self(text))
    }

    fn accepts(_: &tokio_postgres::types::Type) -> bool {
        true
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();

        let statement = self.client.prepare(sql).await.map_err(|e| {
            ProbeError::Query(format!(
                "Failed to prepare query: {}",
                format_postgres_error(&e)
            ))
        })?;

        let pg_params: Vec<PgValue> = params.iter().map(PgValue::from_value).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = self.client.query(&statement, &param_refs).await.map_err(|e| {
            ProbeError::Query(format!(
                "Failed to execute query: {}",
                format_postgres_error(&e)
            ))
        })?;

        // Column metadata comes from the prepared statement so empty result
        // sets still include columns.
        let mut columns = Vec::new();
        let mut column_names = Vec::new();
        for (idx, col) in statement.columns().iter().enumerate() {
            let name = col.name().to_string();
            column_names.push(name.clone());
            columns.push(ColumnMeta {
                name,
                data_type: format!("{:?}", col.type_()),
                ordinal: idx,
            });
        }

        let mut rows = Vec::new();
        for pg_row in &pg_rows {
            let mut values = Vec::new();
            for idx in 0..columns.len() {
                values.push(postgres_to_value(pg_row, idx));
            }
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        let total_rows = rows.len();

        tracing::debug!(
            row_count = total_rows,
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Convert a PostgreSQL row value to our Value type
fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let col = &row.columns()[idx];
    let type_name = col.type_().name();

    match type_name {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "int2" | "smallint" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        "int4" | "int" | "integer" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        "int8" | "bigint" => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        "float4" | "real" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(Value::Float32)
            .unwrap_or(Value::Null),
        "float8" | "double precision" => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "text" | "varchar" | "char" | "bpchar" | "name" => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        _ => {
            // Fallback for unmapped PostgreSQL types: decode raw UTF-8 payload.
            row.try_get::<_, Option<PgFallbackString>>(idx)
                .ok()
                .flatten()
                .map(|value| Value::String(value.0))
                .unwrap_or(Value::Null)
        }
    }
}
