//! Connection pool integration tests.
//!
//! These tests run pooled connections against the mock backend from
//! `pg-testing`.
//!
//! ```bash
//! cargo test -p pg-driver-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use pg_client::{CancellationToken, Connection, PgValue, Request};
use pg_driver_pool::{ConnectionState, Pool, PoolConfig, PoolError};
use pg_testing::{MockColumn, MockPgServer, MockResponse, MockServerBuilder};
use tokio::io::DuplexStream;

fn duplex_pool(builder: MockServerBuilder) -> (Pool<DuplexStream>, pg_testing::QueryLog) {
    let (io, log) = builder.build_duplex();
    let pool = Pool::new([Connection::new(io)], PoolConfig::new()).unwrap();
    (pool, log)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_concurrent_submissions_over_tcp() {
    let server = MockPgServer::builder()
        .with_response("UPDATE counters SET n = n + 1", MockResponse::affected(1))
        .build()
        .await
        .unwrap();
    let mut connections = Vec::new();
    for _ in 0..3 {
        connections.push(Connection::new(server.connect().await.unwrap()));
    }
    let pool = std::sync::Arc::new(Pool::new(connections, PoolConfig::new()).unwrap());

    let mut tasks = Vec::new();
    for _ in 0..30 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let handle = pool
                .submit(
                    Request::non_query("UPDATE counters SET n = n + 1", vec![]),
                    CancellationToken::new(),
                )
                .await
                .unwrap();
            handle.await.unwrap().affected()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Some(1));
    }

    assert_eq!(server.log().len(), 30);
    let total: u64 = pool.metadata().iter().map(|m| m.command_count).sum();
    assert_eq!(total, 30);
    pool.close().await;
}

#[tokio::test]
async fn test_single_connection_is_fifo() {
    let (pool, log) = duplex_pool(MockServerBuilder::new());

    let mut handles = Vec::new();
    for i in 0..5 {
        handles.push(
            pool.try_submit(
                Request::batch(format!("SELECT {i}")),
                CancellationToken::new(),
            )
            .unwrap(),
        );
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        log.queries(),
        vec!["SELECT 0", "SELECT 1", "SELECT 2", "SELECT 3", "SELECT 4"]
    );
}

// =============================================================================
// Release
// =============================================================================

#[tokio::test]
async fn test_transaction_holds_connection() {
    let (pool, log) = duplex_pool(
        MockServerBuilder::new().with_response("INSERT INTO t VALUES (1)", MockResponse::affected(1)),
    );

    let mut tx = pool
        .submit(
            Request::BeginTransaction { isolation: None },
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .await
        .unwrap()
        .into_transaction()
        .unwrap();
    let after = pool
        .submit(Request::batch("SELECT 1"), CancellationToken::new())
        .await
        .unwrap();

    wait_until(|| pool.status().held == 1).await;
    tx.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
    assert!(!after.is_completed());

    tx.commit().await.unwrap();
    after.await.unwrap();
    assert_eq!(
        log.queries(),
        vec!["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT", "SELECT 1"]
    );
}

#[tokio::test]
async fn test_dropped_stream_is_drained_before_next_command() {
    let (pool, log) = duplex_pool(
        MockServerBuilder::new()
            .with_response(
                "SELECT n FROM numbers",
                MockResponse::rows(
                    vec![MockColumn::int4("n")],
                    (0..50).map(|i| vec![PgValue::Int4(i)]).collect(),
                ),
            )
            .with_response("DELETE FROM numbers", MockResponse::affected(50)),
    );

    let mut rows = pool
        .submit(Request::query("SELECT n FROM numbers", vec![]), CancellationToken::new())
        .await
        .unwrap()
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    rows.next_row().await.unwrap().unwrap();
    drop(rows);

    let deleted = pool
        .submit(Request::non_query("DELETE FROM numbers", vec![]), CancellationToken::new())
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(deleted.affected(), Some(50));
    assert_eq!(log.queries(), vec!["SELECT n FROM numbers", "DELETE FROM numbers"]);
}

#[tokio::test]
async fn test_drained_stream_frees_worker_while_alive() {
    let (pool, log) = duplex_pool(MockServerBuilder::new().with_response(
        "SELECT n FROM numbers",
        MockResponse::rows(
            vec![MockColumn::int4("n")],
            (0..3).map(|i| vec![PgValue::Int4(i)]).collect(),
        ),
    ));

    let mut rows = pool
        .submit(Request::query("SELECT n FROM numbers", vec![]), CancellationToken::new())
        .await
        .unwrap()
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(rows.discard().await.unwrap(), 3);

    let next = pool
        .submit(Request::batch("SELECT 1"), CancellationToken::new())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), next)
        .await
        .expect("worker is not blocked by a finished stream")
        .unwrap();
    assert_eq!(log.queries(), vec!["SELECT n FROM numbers", "SELECT 1"]);
    drop(rows);
}

// =============================================================================
// Cancellation and failure
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_command() {
    let (pool, log) = duplex_pool(MockServerBuilder::new().with_response(
        "SELECT slow()",
        MockResponse::command("SELECT 1").delayed(Duration::from_millis(100)),
    ));

    let slow = pool
        .submit(Request::batch("SELECT slow()"), CancellationToken::new())
        .await
        .unwrap();
    let token = CancellationToken::new();
    let queued = pool
        .submit(Request::batch("SELECT skipped()"), token.clone())
        .await
        .unwrap();
    let last = pool
        .submit(Request::batch("SELECT last()"), CancellationToken::new())
        .await
        .unwrap();

    token.cancel();
    let err = tokio::time::timeout(Duration::from_millis(50), queued)
        .await
        .expect("cancellation resolves without waiting for the worker")
        .unwrap_err();
    assert!(err.is_cancelled());

    slow.await.unwrap();
    last.await.unwrap();
    assert_eq!(log.queries(), vec!["SELECT slow()", "SELECT last()"]);
}

#[tokio::test]
async fn test_failed_connection_stops_worker() {
    let (pool, _log) = duplex_pool(MockServerBuilder::new().with_response(
        "SELECT crash()",
        MockResponse::fatal("57P01", "terminating connection due to administrator command"),
    ));

    let err = pool
        .submit(Request::non_query("SELECT crash()", vec![]), CancellationToken::new())
        .await
        .unwrap()
        .await
        .unwrap_err();
    assert!(err.is_unrecoverable());

    wait_until(|| pool.is_closed()).await;
    assert_eq!(pool.metadata()[0].state, ConnectionState::Closed);
    assert_eq!(pool.status().closed, 1);

    let err = pool
        .try_submit(Request::batch("SELECT 1"), CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed));
}

#[tokio::test]
async fn test_close_runs_queued_commands() {
    let (pool, log) = duplex_pool(MockServerBuilder::new());

    let first = pool
        .try_submit(Request::batch("SELECT 1"), CancellationToken::new())
        .unwrap();
    let second = pool
        .try_submit(Request::batch("SELECT 2"), CancellationToken::new())
        .unwrap();
    pool.close().await;

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(log.queries(), vec!["SELECT 1", "SELECT 2"]);
}
