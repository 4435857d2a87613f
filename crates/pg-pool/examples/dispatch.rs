//! Command dispatch example.
//!
//! This example submits commands to a pool of mock connections, keeps one
//! connection held by an open row stream and cancels a queued command.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=pg_driver_pool=debug,pg_client=debug cargo run -p pg-driver-pool --example dispatch
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use pg_client::{CancellationToken, Connection, PgValue, Request};
use pg_driver_pool::{Pool, PoolConfig};
use pg_testing::{MockColumn, MockPgServer, MockResponse};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = MockPgServer::builder()
        .with_response(
            "SELECT id FROM jobs",
            MockResponse::rows(
                vec![MockColumn::int4("id")],
                (0..5).map(|i| vec![PgValue::Int4(i)]).collect(),
            ),
        )
        .with_response("UPDATE jobs SET done = true", MockResponse::affected(5))
        .with_response(
            "SELECT pg_sleep(1)",
            MockResponse::command("SELECT 1").delayed(Duration::from_millis(200)),
        )
        .build()
        .await?;

    let mut connections = Vec::new();
    for _ in 0..2 {
        connections.push(Connection::new(server.connect().await?));
    }
    let pool = Pool::new(connections, PoolConfig::new().queue_capacity(64))?;

    println!("=== Command dispatch ===\n");

    let mut rows = pool
        .submit(Request::query("SELECT id FROM jobs", vec![]), CancellationToken::new())
        .await?
        .await?
        .into_rows()
        .expect("query yields rows");
    println!("  stream open: {:?}", pool.status());

    let updated = pool
        .submit(
            Request::non_query("UPDATE jobs SET done = true", vec![]),
            CancellationToken::new(),
        )
        .await?
        .await?;
    println!("  updated {:?} rows on the free connection", updated.affected());

    let slow = pool
        .submit(Request::batch("SELECT pg_sleep(1)"), CancellationToken::new())
        .await?;
    let token = CancellationToken::new();
    let queued = pool
        .submit(Request::batch("SELECT 'never runs'"), token.clone())
        .await?;
    token.cancel();
    match queued.await {
        Err(e) if e.is_cancelled() => println!("  queued command cancelled"),
        other => println!("  unexpected: {other:?}"),
    }
    slow.await?;

    let mut ids = Vec::new();
    while let Some(mut row) = rows.next_row().await? {
        row.move_next()?;
        ids.push(row.get::<i32>().unwrap_or_default());
    }
    drop(rows);
    println!("  streamed ids {ids:?}");

    pool.close().await;
    println!("  closed: {:?}", pool.status());
    Ok(())
}
