//! Streaming query results.
//!
//! A [`RowStream`] reads one DataRow message at a time off the connection
//! and hands it out as a [`DataRow`] that borrows the stream, so at most one
//! row is buffered no matter how large the result is.

use pg_protocol::{BackendMessage, RowDescription};
use pg_types::PgValue;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Connection, Holder};
use crate::error::Result;
use crate::json;
use crate::row::DataRow;

/// Rows of a running query.
///
/// The stream holds the connection until the server reports the end of the
/// cycle, then lets go of it even if the stream itself is kept around.
/// Dropping it earlier is allowed: the connection is marked for draining and
/// the next request reads past the unconsumed rows first.
///
/// # Example
///
/// ```rust,ignore
/// let mut rows = conn.query("SELECT id, name FROM users", &[]).await?;
/// while let Some(mut row) = rows.next_row().await? {
///     row.move_next()?;
///     let id: Option<i64> = row.get();
///     row.move_next()?;
///     let name: Option<String> = row.get();
/// }
/// ```
pub struct RowStream<'c, T> {
    conn: Option<Holder<'c, T>>,
    has_rows: bool,
    rows_read: u64,
    rows_affected: u64,
}

impl<T> RowStream<'_, T> {
    /// Check if the stream has reached the end of the result.
    ///
    /// A finished stream no longer holds its connection.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.conn.is_none()
    }

    /// Rows handed out so far.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Row count from the statement's completion tag; 0 until finished.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Column metadata of the result.
    ///
    /// Empty for statements without rows, and once the stream has finished
    /// and handed the connection back.
    #[must_use]
    pub fn columns(&self) -> &RowDescription {
        match self.conn.as_deref() {
            Some(conn) if self.has_rows => conn.row_description(),
            _ => RowDescription::empty(),
        }
    }

    fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(rows_read = self.rows_read, "row stream released connection");
            drop(conn);
        }
    }
}

impl<'c, T> RowStream<'c, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) async fn start(mut conn: Holder<'c, T>, sql: &str, params: &[PgValue]) -> Result<Self> {
        let has_rows = conn.start_query(sql, params).await?;
        Ok(Self {
            conn: Some(conn),
            has_rows,
            rows_read: 0,
            rows_affected: 0,
        })
    }

    /// Read the next row.
    ///
    /// Returns `None` once the result is exhausted. A server error ends the
    /// stream and is returned once. Either way the connection is released
    /// before this returns.
    pub async fn next_row(&mut self) -> Result<Option<DataRow<'_>>> {
        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Ok(None);
            };
            let (kind, body) = match conn.read_message().await {
                Ok(message) => message,
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };
            match kind {
                BackendMessage::DataRow => {
                    self.rows_read += 1;
                    tracing::trace!(row = self.rows_read, length = body.len(), "data row");
                    let Some(conn) = self.conn.as_deref() else {
                        return Ok(None);
                    };
                    return Ok(Some(DataRow::new(conn.row_description(), body)?));
                }
                BackendMessage::CommandComplete => {
                    self.rows_affected = conn.rows_affected();
                }
                BackendMessage::EmptyQueryResponse | BackendMessage::PortalSuspended => {}
                BackendMessage::ReadyForQuery => {
                    self.release();
                }
                BackendMessage::ErrorResponse => {
                    let err = conn.fail_after_error().await;
                    self.release();
                    return Err(err);
                }
                other => {
                    let err = conn.unexpected(other);
                    self.release();
                    return Err(err);
                }
            }
        }
    }

    /// Discard the remaining rows and return the completion row count.
    ///
    /// The connection is released when this returns.
    pub async fn discard(&mut self) -> Result<u64> {
        while self.next_row().await?.is_some() {}
        Ok(self.rows_affected)
    }

    /// Project every remaining row into a JSON object.
    pub async fn collect_json(&mut self) -> Result<Vec<serde_json::Value>> {
        let mut out = Vec::new();
        while let Some(mut row) = self.next_row().await? {
            out.push(json::to_json(&mut row)?);
        }
        Ok(out)
    }

    /// Read every remaining row as dynamic values.
    ///
    /// Unsupported column types read as `None`.
    pub async fn collect_values(&mut self) -> Result<Vec<Vec<Option<PgValue>>>> {
        let mut out = Vec::new();
        while let Some(mut row) = self.next_row().await? {
            let mut values = Vec::with_capacity(row.len());
            while row.move_next()? {
                values.push(row.value()?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

impl<T> Drop for RowStream<'_, T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            tracing::debug!(rows_read = self.rows_read, "row stream dropped before completion");
            conn.mark_draining();
        }
    }
}

impl<T> std::fmt::Debug for RowStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns().len())
            .field("finished", &self.is_finished())
            .field("rows_read", &self.rows_read)
            .finish()
    }
}
