//! Streaming rows example.
//!
//! This example runs a query against the in-process mock backend, reads the
//! first rows column by column, projects one row to JSON and drops the
//! stream early. The connection drains the rest before the next statement.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=pg_client=debug cargo run -p pg-client --example streaming
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use pg_client::{Connection, PgValue, json};
use pg_testing::{MockColumn, MockPgServer, MockResponse};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let rows = (1..=1000)
        .map(|i| {
            vec![
                PgValue::Int8(i),
                PgValue::Text(format!("order-{i}")),
                PgValue::Numeric(Decimal::new(i * 125, 2)),
            ]
        })
        .collect();
    let server = MockPgServer::builder()
        .with_response(
            "SELECT id, reference, total FROM orders WHERE total > $1",
            MockResponse::rows(
                vec![
                    MockColumn::int8("id"),
                    MockColumn::text("reference"),
                    MockColumn::numeric("total"),
                ],
                rows,
            ),
        )
        .with_response("DELETE FROM orders", MockResponse::affected(1000))
        .build()
        .await?;

    let mut conn = Connection::new(server.connect().await?);

    println!("=== Streaming rows ===\n");
    let mut stream = conn
        .query(
            "SELECT id, reference, total FROM orders WHERE total > $1",
            &[PgValue::Numeric(Decimal::ZERO)],
        )
        .await?;

    for _ in 0..3 {
        let Some(mut row) = stream.next_row().await? else {
            break;
        };
        row.move_next()?;
        let id: i64 = row.get().expect("id is not null");
        row.move_next()?;
        let reference: Option<String> = row.get();
        row.move_next()?;
        let total: Option<Decimal> = row.get();
        println!("  {id}: {reference:?} {total:?}");
    }

    if let Some(mut row) = stream.next_row().await? {
        println!("\n  as JSON: {}", json::to_json_string(&mut row)?);
    }
    println!("\n  rows read before drop: {}", stream.rows_read());
    drop(stream);

    let deleted = conn.execute("DELETE FROM orders", &[]).await?;
    println!("  deleted {deleted} rows on the same connection");

    conn.close().await?;
    Ok(())
}
