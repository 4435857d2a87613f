//! Mock backend for unit testing.
//!
//! This module provides a scripted PostgreSQL backend that speaks the
//! simple and extended query protocols on an already authenticated session.
//! It can listen on TCP or serve a single in-memory connection.
//!
//! ## Features
//!
//! - Configurable responses keyed by SQL text
//! - Multi-statement simple queries answered statement by statement
//! - Transaction status tracking for `BEGIN`/`COMMIT`/`ROLLBACK`
//! - Delayed responses for cancellation tests
//! - A log of every query the client sent
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_testing::mock_server::{MockColumn, MockPgServer, MockResponse};
//! use pg_types::PgValue;
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let (io, log) = MockPgServer::builder()
//!         .with_response(
//!             "SELECT id FROM users",
//!             MockResponse::rows(vec![MockColumn::int4("id")], vec![vec![PgValue::Int4(1)]]),
//!         )
//!         .build_duplex();
//!     // Hand `io` to the client...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use pg_protocol::Oid;
use pg_protocol::codec::read_cstring;
use pg_types::{PgValue, TypeError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::fixtures;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A configured value could not be encoded.
    #[error("Type error: {0}")]
    Type(#[from] TypeError),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return a result set.
    Rows {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data.
        rows: Vec<Vec<PgValue>>,
    },

    /// Complete with a command tag and no rows, e.g. `UPDATE 3`.
    Command(String),

    /// Return an error.
    Error {
        /// Severity (`ERROR`, `FATAL`, ...).
        severity: String,
        /// SQLSTATE code.
        code: String,
        /// Error message.
        message: String,
    },

    /// Return raw pre-encoded backend messages.
    Raw(Bytes),

    /// Wait before answering.
    Delayed {
        /// Time to wait.
        delay: Duration,
        /// Response sent afterwards.
        response: Box<MockResponse>,
    },

    /// Execute a custom handler.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", &rows.len())
                .finish(),
            Self::Command(tag) => f.debug_tuple("Command").field(tag).finish(),
            Self::Error {
                severity,
                code,
                message,
            } => f
                .debug_struct("Error")
                .field("severity", severity)
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Raw(data) => f.debug_tuple("Raw").field(&data.len()).finish(),
            Self::Delayed { delay, response } => f
                .debug_struct("Delayed")
                .field("delay", delay)
                .field("response", response)
                .finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create a single-column, single-row response.
    pub fn scalar(column: MockColumn, value: impl Into<PgValue>) -> Self {
        Self::rows(vec![column], vec![vec![value.into()]])
    }

    /// Create a multi-row response.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<PgValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// Create a command completion with the given tag.
    pub fn command(tag: impl Into<String>) -> Self {
        Self::Command(tag.into())
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::Command(format!("UPDATE {count}"))
    }

    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::Command("SELECT 0".to_string())
    }

    /// Create an `ERROR` severity response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            severity: "ERROR".to_string(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a `FATAL` severity response.
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            severity: "FATAL".to_string(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Delay this response.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed {
            delay,
            response: Box::new(self),
        }
    }

    /// Strip delays and custom handlers, returning the total delay and the
    /// response to send.
    fn resolve(&self, sql: &str) -> (Duration, MockResponse) {
        match self {
            Self::Delayed { delay, response } => {
                let (inner, resolved) = response.resolve(sql);
                (*delay + inner, resolved)
            }
            Self::Custom(handler) => handler(sql).resolve(sql),
            other => (Duration::ZERO, other.clone()),
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Append the result frames; returns `false` if an error was sent.
    fn encode_result(&self, out: &mut BytesMut, with_description: bool) -> Result<bool> {
        match self {
            Self::Rows { columns, rows } => {
                if with_description {
                    self.encode_description(out);
                }
                for row in rows {
                    out.put_slice(&fixtures::data_row_values(row)?);
                }
                out.put_slice(&fixtures::command_complete(&format!("SELECT {}", rows.len())));
            }
            Self::Command(tag) => out.put_slice(&fixtures::command_complete(tag)),
            Self::Error {
                severity,
                code,
                message,
            } => {
                out.put_slice(&fixtures::error_response(severity, code, message));
                return Ok(false);
            }
            Self::Raw(data) => out.put_slice(data),
            Self::Delayed { .. } | Self::Custom(_) => {
                return Err(MockServerError::Protocol("unresolved response".into()));
            }
        }
        Ok(true)
    }

    fn encode_description(&self, out: &mut BytesMut) {
        match self {
            Self::Rows { columns, .. } => {
                let columns: Vec<(&str, Oid)> =
                    columns.iter().map(|c| (c.name.as_str(), c.oid)).collect();
                out.put_slice(&fixtures::row_description(&columns));
            }
            Self::Raw(_) => {}
            _ => out.put_slice(&fixtures::no_data()),
        }
    }
}

/// Mock column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockColumn {
    /// Column name.
    pub name: String,
    /// Declared type code.
    pub oid: Oid,
}

impl MockColumn {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, oid: Oid) -> Self {
        Self {
            name: name.into(),
            oid,
        }
    }

    /// Create an `int4` column.
    pub fn int4(name: impl Into<String>) -> Self {
        Self::new(name, Oid::INT4)
    }

    /// Create an `int8` column.
    pub fn int8(name: impl Into<String>) -> Self {
        Self::new(name, Oid::INT8)
    }

    /// Create a `text` column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, Oid::TEXT)
    }

    /// Create a `numeric` column.
    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, Oid::NUMERIC)
    }

    /// Create a `bool` column.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, Oid::BOOL)
    }

    /// Create a `jsonb` column.
    pub fn jsonb(name: impl Into<String>) -> Self {
        Self::new(name, Oid::JSONB)
    }
}

/// Queries received by a mock server, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct QueryLog(Arc<Mutex<Vec<String>>>);

impl QueryLog {
    fn push(&self, sql: &str) {
        self.0.lock().push(sql.to_string());
    }

    /// Snapshot of all queries received so far.
    pub fn queries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of queries received.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Check if no query has been received.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Configuration for the mock server.
#[derive(Default)]
pub struct MockServerConfig {
    /// Pre-configured responses for specific SQL queries.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched queries; the first keyword becomes the
    /// command tag when unset.
    default_response: Option<MockResponse>,
}

impl MockServerConfig {
    fn find_response(&self, sql: &str) -> MockResponse {
        let sql = sql.trim();
        if let Some(response) = self.responses.get(sql) {
            return response.clone();
        }
        if let Some(response) = &self.default_response {
            return response.clone();
        }
        let keyword = sql.split_whitespace().next().unwrap_or_default();
        MockResponse::Command(keyword.to_ascii_uppercase())
    }

    /// Split a simple query into statements, unless the whole text has a
    /// configured response.
    fn plan(&self, sql: &str) -> Vec<(String, MockResponse)> {
        if self.responses.contains_key(sql.trim()) {
            return vec![(sql.to_string(), self.find_response(sql))];
        }
        sql.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| (s.to_string(), self.find_response(s)))
            .collect()
    }
}

/// Builder for `MockPgServer`.
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Add a response for a specific SQL query.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the default response for unmatched queries.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = Some(response);
        self
    }

    /// Build and start a TCP mock server.
    pub async fn build(self) -> Result<MockPgServer> {
        MockPgServer::start(self.config).await
    }

    /// Serve a single in-memory connection.
    ///
    /// Returns the client end of the pipe and the server's query log.
    pub fn build_duplex(self) -> (DuplexStream, QueryLog) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let log = QueryLog::default();
        let config = Arc::new(self.config);
        let session_log = log.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(server, config, session_log).await {
                tracing::debug!("mock session error: {}", e);
            }
        });
        (client, log)
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock backend listening on TCP.
pub struct MockPgServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<AtomicUsize>,
    log: QueryLog,
}

impl MockPgServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(AtomicUsize::new(0));
        let log = QueryLog::default();

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
            log: log.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = config.clone();
                                let count = connection_count.clone();
                                let log = log.clone();
                                tokio::spawn(async move {
                                    count.fetch_add(1, Ordering::AcqRel);
                                    if let Err(e) = serve(stream, config, log).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    count.fetch_sub(1, Ordering::AcqRel);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Open a client connection to the server.
    pub async fn connect(&self) -> Result<TcpStream> {
        Ok(TcpStream::connect(self.addr).await?)
    }

    /// Get the current connection count.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Acquire)
    }

    /// Queries received across all connections.
    pub fn log(&self) -> &QueryLog {
        &self.log
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockPgServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-connection protocol state.
struct Session {
    config: Arc<MockServerConfig>,
    log: QueryLog,
    status: u8,
    prepared: Option<(String, Duration, MockResponse)>,
    skipping: bool,
}

impl Session {
    fn statement_finished(&mut self, sql: &str, ok: bool) {
        if !ok {
            if self.status != b'I' {
                self.status = b'E';
            }
            return;
        }
        let mut words = sql.split_whitespace().map(str::to_ascii_uppercase);
        let keyword = words.next().unwrap_or_default();
        match keyword.as_str() {
            "BEGIN" | "START" => self.status = b'T',
            "ROLLBACK" if words.next().as_deref() == Some("TO") => {}
            "COMMIT" | "ROLLBACK" | "END" | "ABORT" => self.status = b'I',
            _ => {}
        }
    }

    async fn simple_query<S>(&mut self, stream: &mut S, sql: &str) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        self.log.push(sql);
        let plan = self.config.plan(sql);
        let mut out = BytesMut::new();
        if plan.is_empty() {
            out.put_slice(&fixtures::empty_query_response());
        }
        for (statement, response) in plan {
            let (delay, response) = response.resolve(&statement);
            if !delay.is_zero() {
                write_out(stream, &mut out).await?;
                tokio::time::sleep(delay).await;
            }
            let ok = response.encode_result(&mut out, true)?;
            self.statement_finished(&statement, ok);
            if !ok {
                break;
            }
        }
        out.put_slice(&fixtures::ready_for_query(self.status));
        write_out(stream, &mut out).await
    }

    async fn handle<S>(&mut self, stream: &mut S, tag: u8, mut body: Bytes) -> Result<bool>
    where
        S: AsyncWrite + Unpin,
    {
        let mut out = BytesMut::new();
        match tag {
            b'Q' => {
                let sql = read_cstring(&mut body).map_err(protocol)?;
                self.simple_query(stream, &sql).await?;
            }
            b'S' => {
                self.skipping = false;
                self.prepared = None;
                out.put_slice(&fixtures::ready_for_query(self.status));
            }
            b'X' => return Ok(false),
            b'H' => {}
            _ if self.skipping => {}
            b'P' => {
                let _name = read_cstring(&mut body).map_err(protocol)?;
                let sql = read_cstring(&mut body).map_err(protocol)?;
                self.log.push(&sql);
                let (delay, response) = self.config.find_response(&sql).resolve(&sql);
                if response.is_error() {
                    response.encode_result(&mut out, false)?;
                    self.statement_finished(&sql, false);
                    self.skipping = true;
                } else {
                    out.put_slice(&fixtures::parse_complete());
                    self.prepared = Some((sql, delay, response));
                }
            }
            b'B' => out.put_slice(&fixtures::bind_complete()),
            b'D' => {
                if let Some((_, _, response)) = &self.prepared {
                    response.encode_description(&mut out);
                }
            }
            b'E' => {
                if let Some((sql, delay, response)) = self.prepared.take() {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let ok = response.encode_result(&mut out, false)?;
                    self.statement_finished(&sql, ok);
                    self.skipping = !ok;
                }
            }
            b'C' => out.put_slice(&fixtures::close_complete()),
            other => {
                return Err(MockServerError::Protocol(format!(
                    "unexpected frontend message '{}'",
                    char::from(other)
                )));
            }
        }
        write_out(stream, &mut out).await?;
        Ok(true)
    }
}

fn protocol(e: pg_protocol::ProtocolError) -> MockServerError {
    MockServerError::Protocol(e.to_string())
}

/// Serve one connection until the client terminates or disconnects.
pub async fn serve<S>(
    mut stream: S,
    config: Arc<MockServerConfig>,
    log: QueryLog,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        config,
        log,
        status: b'I',
        prepared: None,
        skipping: false,
    };

    while let Some((tag, body)) = read_message(&mut stream).await? {
        if !session.handle(&mut stream, tag, body).await? {
            break;
        }
    }
    Ok(())
}

/// Read one frontend message; `None` when the client disconnected.
async fn read_message<S>(stream: &mut S) -> Result<Option<(u8, Bytes)>>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 5];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if length < 4 {
        return Err(MockServerError::Protocol(format!(
            "invalid length {length} for '{}'",
            char::from(header[0])
        )));
    }
    let mut body = vec![0u8; length as usize - 4];
    stream.read_exact(&mut body).await?;
    Ok(Some((header[0], Bytes::from(body))))
}

async fn write_out<S>(stream: &mut S, out: &mut BytesMut) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if out.is_empty() {
        return Ok(());
    }
    stream.write_all(out).await?;
    stream.flush().await?;
    out.clear();
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn query(sql: &str) -> Vec<u8> {
        let mut buf = vec![b'Q'];
        buf.extend_from_slice(&(sql.len() as i32 + 5).to_be_bytes());
        buf.extend_from_slice(sql.as_bytes());
        buf.push(0);
        buf
    }

    async fn read_tags(io: &mut DuplexStream, until: u8) -> Vec<u8> {
        let mut tags = Vec::new();
        loop {
            let mut header = [0u8; 5];
            io.read_exact(&mut header).await.unwrap();
            let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
            let mut body = vec![0u8; len as usize - 4];
            io.read_exact(&mut body).await.unwrap();
            tags.push(header[0]);
            if header[0] == until {
                return tags;
            }
        }
    }

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockPgServer::builder().build().await.unwrap();
        assert!(server.port() > 0);
        assert_eq!(server.connection_count(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_simple_query_rows() {
        let (mut io, log) = MockPgServer::builder()
            .with_response(
                "SELECT 1",
                MockResponse::scalar(MockColumn::int4("x"), 1i32),
            )
            .build_duplex();

        io.write_all(&query("SELECT 1")).await.unwrap();
        assert_eq!(read_tags(&mut io, b'Z').await, b"TDCZ");
        assert_eq!(log.queries(), ["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_batch_stops_at_error() {
        let (mut io, log) = MockPgServer::builder()
            .with_response("BAD", MockResponse::error("42601", "syntax error"))
            .build_duplex();

        io.write_all(&query("CREATE TABLE t (); BAD; SELECT 1"))
            .await
            .unwrap();
        assert_eq!(read_tags(&mut io, b'Z').await, b"CEZ");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_default_response_uses_keyword() {
        let config = MockServerConfig::default();
        match config.find_response("begin isolation level serializable") {
            MockResponse::Command(tag) => assert_eq!(tag, "BEGIN"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resolve_accumulates_delays() {
        let response = MockResponse::affected(2)
            .delayed(Duration::from_millis(5))
            .delayed(Duration::from_millis(10));
        let (delay, resolved) = response.resolve("UPDATE t SET a = 1");
        assert_eq!(delay, Duration::from_millis(15));
        assert!(matches!(resolved, MockResponse::Command(tag) if tag == "UPDATE 2"));
    }
}
