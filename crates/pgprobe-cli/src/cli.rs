//! pgprobe - collect PostgreSQL connection counts by client and emit
//! Graphite metric lines
//!
//! One invocation runs one query: connect, aggregate `pg_stat_activity`
//! by client address and waiting status, print one metric line per field
//! per client, exit. Metric lines go to stdout; logs go to stderr.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use pgprobe_core::Connection;
use pgprobe_driver_postgres::PostgresConnection;
use pgprobe_monitor::{emit_table, ConnectionsCollector, GraphiteConfig};
use std::process;
use tracing::{error, Level};

/// Sessions are visible from any database, so the probe always connects to
/// the maintenance database and filters `pg_stat_activity` by the
/// monitored database name.
const MAINTENANCE_DB: &str = "postgres";

#[derive(Parser)]
#[command(name = "pgprobe")]
#[command(about = "Collect PostgreSQL connection metrics by connected clients")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Postgres user
    #[arg(short = 'u', long, env = "PGPROBE_USER")]
    user: Option<String>,

    /// Postgres password
    #[arg(short = 'p', long, env = "PGPROBE_PASSWORD")]
    password: Option<String>,

    /// Hostname to login to
    #[arg(short = 'H', long, default_value = "localhost")]
    hostname: String,

    /// Database port
    #[arg(short = 'P', long, default_value_t = 5432)]
    port: u16,

    /// Database name to monitor
    #[arg(short = 'd', long, default_value = "postgres")]
    db: String,

    /// Delimiter between the metric path and the host tag
    #[arg(short = 's', long = "delimiter-sign", default_value = ":")]
    delimiter: String,

    /// Metric naming scheme, text to prepend to the metric
    /// (defaults to "<local-hostname>.postgresql")
    #[arg(long)]
    scheme: Option<String>,

    /// SSL mode (disable, prefer, require)
    #[arg(long, default_value = "prefer")]
    ssl_mode: String,

    /// Verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("probe run failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let timestamp = Utc::now();

    // Resolve the scheme prefix once; the aggregator and emitter only ever
    // see it as plain configuration.
    let scheme = match cli.scheme {
        Some(scheme) => scheme,
        None => default_scheme()?,
    };

    let conn = PostgresConnection::connect(
        &cli.hostname,
        cli.port,
        MAINTENANCE_DB,
        cli.user.as_deref(),
        cli.password.as_deref(),
        &cli.ssl_mode,
    )
    .await?;

    let collector = ConnectionsCollector::new(&cli.db);
    let table = collector.collect(&conn).await?;

    let config = GraphiteConfig::new(scheme, &cli.db, &cli.delimiter);
    for line in emit_table(&table, &config, timestamp) {
        println!("{}", line);
    }

    conn.close().await?;
    Ok(())
}

fn default_scheme() -> anyhow::Result<String> {
    let host = hostname::get().context("failed to resolve local hostname")?;
    Ok(format!("{}.postgresql", host.to_string_lossy()))
}
