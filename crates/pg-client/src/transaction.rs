//! Transaction support.
//!
//! This module provides transaction isolation levels, savepoint support,
//! and the [`Transaction`] guard that keeps a connection inside a
//! transaction block until it is committed, rolled back or dropped.

use once_cell::sync::Lazy;
use pg_protocol::TransactionStatus;
use pg_types::PgValue;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Holder;
use crate::error::{Error, Result};
use crate::stream::RowStream;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted.
    ///
    /// The server treats this as read committed.
    ReadUncommitted,

    /// Read committed (server default).
    ///
    /// Each statement sees data committed before it began.
    #[default]
    ReadCommitted,

    /// Repeatable read.
    ///
    /// All statements see a snapshot taken at the first statement of the
    /// transaction.
    RepeatableRead,

    /// Serializable (highest isolation).
    ///
    /// Like repeatable read, but transactions that could not have run in
    /// some serial order fail with a serialization error.
    Serializable,
}

impl IsolationLevel {
    /// Get the statement that begins a transaction at this level.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "BEGIN ISOLATION LEVEL READ UNCOMMITTED",
            Self::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
        }
    }

    /// Get the isolation level name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// A savepoint within a transaction.
///
/// The savepoint name is validated when created to prevent SQL injection.
///
/// # Example
///
/// ```rust,ignore
/// let mut tx = conn.begin_transaction(None).await?;
///
/// tx.execute("INSERT INTO orders (customer_id) VALUES ($1)", &[PgValue::Int4(42)]).await?;
/// let sp = tx.save_point("before_items").await?;
///
/// tx.execute("INSERT INTO items (order_id) VALUES ($1)", &[PgValue::Int4(1)]).await?;
///
/// // undo the items but keep the order
/// tx.rollback_to(&sp).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePoint {
    name: String,
}

impl SavePoint {
    pub(crate) fn new(name: String) -> Self {
        Self { name }
    }

    /// Get the savepoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]{0,62}$").unwrap()
});

/// Check that `name` is a plain unquoted identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidIdentifier("identifier cannot be empty".into()));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::InvalidIdentifier(format!(
            "invalid identifier '{name}': must start with letter/underscore, \
             contain only alphanumerics/_/$, and be 1-63 characters"
        )));
    }
    Ok(())
}

/// An open transaction.
///
/// Holds the connection for its whole lifetime. Committing or rolling back
/// consumes the transaction. Dropping it while open schedules a rollback
/// that runs before the connection's next request.
pub struct Transaction<'c, T> {
    conn: Holder<'c, T>,
    isolation_level: Option<IsolationLevel>,
    finished: bool,
}

impl<T> Transaction<'_, T> {
    /// Isolation level requested at begin; `None` uses the session default.
    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Transaction status reported by the server.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.conn.transaction_status()
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::Transaction("transaction already finished".into()));
        }
        Ok(())
    }
}

impl<'c, T> Transaction<'c, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) async fn begin(
        mut conn: Holder<'c, T>,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<Self> {
        if conn.is_in_transaction() {
            return Err(Error::Transaction(
                "connection is already in a transaction".into(),
            ));
        }
        let sql = isolation_level.map_or("BEGIN", |level| level.as_sql());
        conn.perform(sql).await?;
        tracing::debug!(isolation = ?isolation_level, "transaction started");
        Ok(Self {
            conn,
            isolation_level,
            finished: false,
        })
    }

    /// Execute a statement inside the transaction.
    pub async fn execute(&mut self, sql: &str, params: &[PgValue]) -> Result<u64> {
        self.check_open()?;
        self.conn.execute(sql, params).await
    }

    /// Run statements without parameters inside the transaction.
    pub async fn perform(&mut self, sql: &str) -> Result<()> {
        self.check_open()?;
        self.conn.perform(sql).await
    }

    /// Run a query inside the transaction and stream its rows.
    pub async fn query(&mut self, sql: &str, params: &[PgValue]) -> Result<RowStream<'_, T>> {
        self.check_open()?;
        RowStream::start(Holder::Borrowed(&mut self.conn), sql, params).await
    }

    /// Create a savepoint.
    pub async fn save_point(&mut self, name: &str) -> Result<SavePoint> {
        validate_identifier(name)?;
        self.perform(&format!("SAVEPOINT {name}")).await?;
        Ok(SavePoint::new(name.to_owned()))
    }

    /// Roll back to a savepoint, keeping it defined.
    pub async fn rollback_to(&mut self, savepoint: &SavePoint) -> Result<()> {
        self.perform(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name()))
            .await
    }

    /// Release a savepoint.
    pub async fn release_savepoint(&mut self, savepoint: SavePoint) -> Result<()> {
        self.perform(&format!("RELEASE SAVEPOINT {}", savepoint.name()))
            .await
    }

    /// Commit the transaction.
    ///
    /// A transaction that failed on the server is rolled back by COMMIT;
    /// that case is reported as an error.
    pub async fn commit(mut self) -> Result<()> {
        self.check_open()?;
        let failed = self.conn.transaction_status() == TransactionStatus::Failed;
        self.conn.perform("COMMIT").await?;
        self.finished = true;
        if failed {
            return Err(Error::Transaction(
                "transaction was aborted and has been rolled back".into(),
            ));
        }
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Roll back the transaction.
    pub async fn rollback(mut self) -> Result<()> {
        self.check_open()?;
        self.conn.perform("ROLLBACK").await?;
        self.finished = true;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl<T> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("transaction dropped while open; rolling back before next request");
            self.conn.mark_rollback_pending();
        }
    }
}

impl<T> std::fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("isolation_level", &self.isolation_level)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use pg_testing::{MockResponse, MockServerBuilder};

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(
            IsolationLevel::ReadCommitted.as_sql(),
            "BEGIN ISOLATION LEVEL READ COMMITTED"
        );
        assert_eq!(
            IsolationLevel::Serializable.as_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE"
        );
    }

    #[test]
    fn test_isolation_level_name() {
        assert_eq!(IsolationLevel::ReadCommitted.name(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.name(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("before_items").is_ok());
        assert!(validate_identifier("_sp$1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("x; DROP TABLE users").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn test_commit() {
        let (io, log) = MockServerBuilder::new()
            .with_response("INSERT INTO t VALUES (1)", MockResponse::command("INSERT 0 1"))
            .build_duplex();
        let mut conn = Connection::new(io);

        let mut tx = conn
            .begin_transaction(Some(IsolationLevel::Serializable))
            .await
            .unwrap();
        assert_eq!(tx.status(), TransactionStatus::InTransaction);
        assert_eq!(tx.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert!(!conn.is_in_transaction());
        assert_eq!(
            log.queries(),
            vec![
                "BEGIN ISOLATION LEVEL SERIALIZABLE",
                "INSERT INTO t VALUES (1)",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_savepoints() {
        let (io, log) = MockServerBuilder::new().build_duplex();
        let mut conn = Connection::new(io);

        let mut tx = conn.begin_transaction(None).await.unwrap();
        let sp = tx.save_point("step_one").await.unwrap();
        tx.rollback_to(&sp).await.unwrap();
        tx.release_savepoint(sp).await.unwrap();
        assert!(tx.save_point("bad name").await.is_err());
        tx.rollback().await.unwrap();

        assert_eq!(
            log.queries(),
            vec![
                "BEGIN",
                "SAVEPOINT step_one",
                "ROLLBACK TO SAVEPOINT step_one",
                "RELEASE SAVEPOINT step_one",
                "ROLLBACK"
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (io, log) = MockServerBuilder::new().build_duplex();
        let mut conn = Connection::new(io);

        {
            let mut tx = conn.begin_transaction(None).await.unwrap();
            tx.perform("DELETE FROM t").await.unwrap();
        }
        assert!(conn.is_in_transaction());

        conn.perform("SELECT 1").await.unwrap();
        assert!(!conn.is_in_transaction());
        assert_eq!(
            log.queries(),
            vec!["BEGIN", "DELETE FROM t", "ROLLBACK", "SELECT 1"]
        );
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let (io, _log) = MockServerBuilder::new().build_duplex();
        let mut conn = Connection::new(io);
        conn.perform("BEGIN").await.unwrap();

        let err = conn.begin_transaction(None).await.unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
    }
}
