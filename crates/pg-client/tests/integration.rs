//! Client Integration Tests
//!
//! These tests run the client against the mock backend from `pg-testing`,
//! over TCP where the transport matters and over in-memory pipes otherwise.
//!
//! ```bash
//! cargo test -p pg-client --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bytes::BytesMut;
use pg_client::{
    CancellationToken, Command, Config, Connection, Error, Oid, OutcomeSlots, PgValue,
    ProtocolState, ReleaseState, Request, SharedConnection, json,
};
use pg_testing::fixtures;
use pg_testing::{MockColumn, MockPgServer, MockResponse, MockServerBuilder};
use pg_types::encode_array;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::io::DuplexStream;
use tokio::net::TcpStream;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pg_client=debug")
        .with_test_writer()
        .try_init();
}

async fn tcp_connection(server: &MockPgServer) -> Connection<TcpStream> {
    Connection::new(server.connect().await.unwrap())
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_stream_rows_over_tcp() {
    init_tracing();
    let server = MockPgServer::builder()
        .with_response(
            "SELECT id, name, balance FROM accounts WHERE active = $1",
            MockResponse::rows(
                vec![
                    MockColumn::int8("id"),
                    MockColumn::text("name"),
                    MockColumn::numeric("balance"),
                ],
                vec![
                    vec![
                        PgValue::Int8(1),
                        PgValue::Text("alice".into()),
                        PgValue::Numeric(Decimal::new(12_050, 2)),
                    ],
                    vec![PgValue::Int8(2), PgValue::Null, PgValue::Numeric(Decimal::ZERO)],
                ],
            ),
        )
        .build()
        .await
        .unwrap();
    let mut conn = tcp_connection(&server).await;

    let mut rows = conn
        .query(
            "SELECT id, name, balance FROM accounts WHERE active = $1",
            &[PgValue::Bool(true)],
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Some(mut row) = rows.next_row().await.unwrap() {
        row.move_next().unwrap();
        let id: i64 = row.get().unwrap();
        row.move_next().unwrap();
        let name: Option<String> = row.get();
        row.move_next().unwrap();
        let balance: Decimal = row.get().unwrap();
        assert!(!row.move_next().unwrap());
        seen.push((id, name, balance));
    }
    drop(rows);

    assert_eq!(
        seen,
        vec![
            (1, Some("alice".to_string()), Decimal::new(12_050, 2)),
            (2, None, Decimal::ZERO),
        ]
    );
    assert_eq!(conn.state(), ProtocolState::Ready);
    assert_eq!(
        server.log().queries(),
        vec!["SELECT id, name, balance FROM accounts WHERE active = $1"]
    );
}

#[tokio::test]
async fn test_json_projection_over_tcp() {
    let server = MockPgServer::builder()
        .with_response(
            "SELECT * FROM events",
            MockResponse::rows(
                vec![MockColumn::int4("id"), MockColumn::jsonb("payload")],
                vec![vec![PgValue::Int4(5), PgValue::Json(json!({"kind": "click"}))]],
            ),
        )
        .build()
        .await
        .unwrap();
    let mut conn = tcp_connection(&server).await;

    let mut rows = conn.query("SELECT * FROM events", &[]).await.unwrap();
    let mut row = rows.next_row().await.unwrap().unwrap();
    assert_eq!(
        json::to_json_string(&mut row).unwrap(),
        r#"{"id":5,"payload":{"kind":"click"}}"#
    );
}

#[tokio::test]
async fn test_array_column() {
    let mut tags = BytesMut::new();
    encode_array(&[Some("a".to_string()), None, Some("c".to_string())], &mut tags).unwrap();
    let raw = fixtures::concat(&[
        fixtures::row_description(&[("tags", Oid::TEXT_ARRAY)]),
        fixtures::data_row(&[Some(&tags[..])]),
        fixtures::command_complete("SELECT 1"),
    ]);
    let (io, _log) = MockServerBuilder::new()
        .with_response("SELECT tags FROM posts", MockResponse::Raw(raw))
        .build_duplex();
    let mut conn = Connection::new(io);

    let mut rows = conn.query("SELECT tags FROM posts", &[]).await.unwrap();
    let mut row = rows.next_row().await.unwrap().unwrap();
    row.move_next().unwrap();
    assert!(row.column().is_array());
    assert_eq!(row.column().array_length(), 3);

    let tags: Vec<Option<String>> = row
        .get_array::<String>()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(tags, vec![Some("a".into()), None, Some("c".into())]);
}

#[tokio::test]
async fn test_abandoned_stream_then_statement() {
    let (io, log) = MockServerBuilder::new()
        .with_response(
            "SELECT n FROM big",
            MockResponse::rows(
                vec![MockColumn::int4("n")],
                (0..100).map(|i| vec![PgValue::Int4(i)]).collect(),
            ),
        )
        .with_response("UPDATE big SET n = 0", MockResponse::affected(100))
        .build_duplex();
    let mut conn = Connection::new(io);

    {
        let mut rows = conn.query("SELECT n FROM big", &[]).await.unwrap();
        for _ in 0..3 {
            rows.next_row().await.unwrap().unwrap();
        }
    }
    assert_eq!(conn.state(), ProtocolState::Draining);

    assert_eq!(conn.execute("UPDATE big SET n = 0", &[]).await.unwrap(), 100);
    assert_eq!(log.queries(), vec!["SELECT n FROM big", "UPDATE big SET n = 0"]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_server_error_leaves_connection_usable() {
    let (io, _log) = MockServerBuilder::new()
        .with_response(
            "SELECT * FROM missing",
            MockResponse::error("42P01", "relation \"missing\" does not exist"),
        )
        .build_duplex();
    let mut conn = Connection::new(io);

    let err = conn.query("SELECT * FROM missing", &[]).await.unwrap_err();
    assert_eq!(err.sqlstate(), Some("42P01"));
    assert!(!err.is_unrecoverable());
    assert!(conn.is_usable());

    conn.ping().await.unwrap();
}

#[tokio::test]
async fn test_fatal_error_poisons_connection() {
    let (io, _log) = MockServerBuilder::new()
        .with_response(
            "SELECT pg_terminate_backend(pg_backend_pid())",
            MockResponse::fatal("57P01", "terminating connection due to administrator command"),
        )
        .build_duplex();
    let mut conn = Connection::new(io);

    let err = conn
        .execute("SELECT pg_terminate_backend(pg_backend_pid())", &[])
        .await
        .unwrap_err();
    assert!(err.is_unrecoverable());
    assert_eq!(conn.state(), ProtocolState::Poisoned);
    assert!(matches!(conn.ping().await.unwrap_err(), Error::Poisoned));
}

#[tokio::test]
async fn test_oversized_frame_poisons_connection() {
    let (io, _log) = MockServerBuilder::new()
        .with_response(
            "SELECT body FROM documents",
            MockResponse::rows(
                vec![MockColumn::text("body")],
                vec![vec![PgValue::Text("x".repeat(512))]],
            ),
        )
        .build_duplex();
    let config = Config::new().max_frame_size(128);
    let mut conn = Connection::with_config(io, config).unwrap();

    let mut rows = conn.query("SELECT body FROM documents", &[]).await.unwrap();
    let err = rows.next_row().await.unwrap_err();
    assert!(err.is_unrecoverable());
    drop(rows);
    assert_eq!(conn.state(), ProtocolState::Poisoned);
}

#[tokio::test]
async fn test_notices_and_parameters_are_absorbed() {
    let raw = fixtures::concat(&[
        fixtures::no_data(),
        fixtures::notice_response("WARNING", "01000", "something looks off"),
        fixtures::parameter_status("TimeZone", "UTC"),
        fixtures::notification_response(42, "jobs", "ready"),
        fixtures::command_complete("UPDATE 2"),
    ]);
    let (io, _log) = MockServerBuilder::new()
        .with_response("UPDATE jobs SET done = true", MockResponse::Raw(raw))
        .build_duplex();
    let mut conn = Connection::new(io);

    let updated = conn.execute("UPDATE jobs SET done = true", &[]).await.unwrap();
    assert_eq!(updated, 2);
    assert_eq!(conn.parameter("TimeZone"), Some("UTC"));
    assert!(conn.is_usable());
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::new().max_frame_size(2);
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

// =============================================================================
// Commands
// =============================================================================

type Shared = SharedConnection<DuplexStream>;

#[tokio::test]
async fn test_cancel_races_result_exactly_once() {
    init_tracing();
    let mut completed = 0;
    let mut cancelled = 0;

    for i in 0..40u64 {
        let (io, _log) = MockServerBuilder::new()
            .with_response(
                "UPDATE t SET x = 1",
                MockResponse::affected(1).delayed(Duration::from_millis(i % 3)),
            )
            .build_duplex();
        let conn = SharedConnection::new(Connection::new(io));
        let slots = OutcomeSlots::<Shared>::new(8);
        let token = CancellationToken::new();
        let (mut command, handle) = Command::new(
            Request::non_query("UPDATE t SET x = 1", vec![]),
            token.clone(),
            &slots,
        );
        command.attach_cancellation();

        let running = {
            let conn = conn.clone();
            tokio::spawn(async move { command.execute(&conn).await })
        };
        tokio::time::sleep(Duration::from_millis(i % 4)).await;
        token.cancel();

        match handle.await {
            Ok(outcome) => {
                assert_eq!(outcome.affected(), Some(1));
                completed += 1;
            }
            Err(e) => {
                assert!(e.is_cancelled(), "unexpected error: {e}");
                cancelled += 1;
            }
        }
        assert_eq!(running.await.unwrap(), ReleaseState::Released);

        // whichever side won, the connection is ready for the next command
        conn.lock().await.ping().await.unwrap();
    }

    assert_eq!(completed + cancelled, 40);
}

#[tokio::test]
async fn test_query_in_use_until_stream_finishes() {
    let (io, log) = MockServerBuilder::new()
        .with_response(
            "SELECT n FROM numbers",
            MockResponse::rows(
                vec![MockColumn::int4("n")],
                (1..=5).map(|i| vec![PgValue::Int4(i)]).collect(),
            ),
        )
        .build_duplex();
    let conn = SharedConnection::new(Connection::new(io));
    let slots = OutcomeSlots::<Shared>::new(8);

    let (query, handle) = Command::new(
        Request::query("SELECT n FROM numbers", vec![]),
        CancellationToken::new(),
        &slots,
    );
    assert_eq!(query.execute(&conn).await, ReleaseState::InUse);
    let mut rows = handle.await.unwrap().into_rows().unwrap();
    rows.next_row().await.unwrap().unwrap();
    assert!(!conn.is_released());

    // the next command waits for the stream to go away
    let waiter = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.wait_released().await;
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    drop(rows);
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();

    let (batch, handle) =
        Command::new(Request::batch("SELECT 1"), CancellationToken::new(), &slots);
    assert_eq!(batch.execute(&conn).await, ReleaseState::Released);
    handle.await.unwrap();
    assert_eq!(log.queries(), vec!["SELECT n FROM numbers", "SELECT 1"]);
    assert_eq!(slots.idle(), 1);
}
