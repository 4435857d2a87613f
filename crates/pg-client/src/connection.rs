//! Session driver over an established connection.
//!
//! [`Connection`] owns the transport and the reusable message scratch and
//! runs the simple and extended query flows. It assumes the startup and
//! authentication exchange already happened; the first thing it expects
//! from the server is the response to its own first request.
//!
//! [`SharedConnection`] wraps a connection in an async mutex so commands,
//! row streams and transactions can hold it across await points. Holding the
//! owned guard is what keeps a connection checked out.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;
use pg_codec::{CodecError, Transport};
use pg_protocol::{
    BackendKeyData, BackendMessage, FormatCode, FrontendMessage, MessageDispatcher, MessageScratch,
    Oid, ProtocolError, RowDescription, Target, TransactionStatus,
};
use pg_types::PgValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, OwnedMutexGuard, TryLockError};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::ProtocolState;
use crate::stream::RowStream;
use crate::transaction::{IsolationLevel, Transaction};

/// A client session on an authenticated connection.
pub struct Connection<T> {
    transport: Transport<T>,
    dispatcher: MessageDispatcher,
    scratch: MessageScratch,
    state: ProtocolState,
    rollback_pending: bool,
    parameters: HashMap<String, String>,
    config: Config,
}

impl<T> Connection<T> {
    /// Current wire state.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Check if the connection can still run commands.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    /// Transaction status from the last ReadyForQuery.
    #[must_use]
    pub fn transaction_status(&self) -> TransactionStatus {
        self.scratch.transaction_status
    }

    /// Check if the session is inside a transaction block.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.scratch.transaction_status != TransactionStatus::Idle
    }

    /// Last value the server reported for a run-time parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Cancellation key, if the server sent one on this connection.
    #[must_use]
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        let key = self.scratch.backend_key;
        (key != BackendKeyData::default()).then_some(key)
    }

    /// Frames discarded because their tag was not recognized.
    #[must_use]
    pub fn discarded_messages(&self) -> u64 {
        self.dispatcher.discarded()
    }

    /// Connection configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn row_description(&self) -> &RowDescription {
        &self.scratch.row_description
    }

    pub(crate) fn rows_affected(&self) -> u64 {
        self.scratch.command_complete().rows
    }

    pub(crate) fn mark_draining(&mut self) {
        if self.state == ProtocolState::AwaitingResponse {
            self.state = ProtocolState::Draining;
        }
    }

    pub(crate) fn mark_rollback_pending(&mut self) {
        self.rollback_pending = true;
    }

    /// Poison the connection after a message that is illegal at this point.
    pub(crate) fn unexpected(&mut self, kind: BackendMessage) -> Error {
        self.state = ProtocolState::Poisoned;
        tracing::warn!(kind = ?kind, "unexpected backend message");
        ProtocolError::UnexpectedMessage(char::from(kind.tag())).into()
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an authenticated stream with default settings.
    pub fn new(io: T) -> Self {
        Self::build(io, Config::default())
    }

    /// Wrap an authenticated stream.
    pub fn with_config(io: T, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(io, config))
    }

    fn build(io: T, config: Config) -> Self {
        Self {
            transport: Transport::with_config(io, config.codec()),
            dispatcher: MessageDispatcher::new(),
            scratch: MessageScratch::default(),
            state: ProtocolState::Ready,
            rollback_pending: false,
            parameters: HashMap::new(),
            config,
        }
    }

    /// Read the next message a caller has to act on.
    ///
    /// Notices, parameter reports, notifications and copy traffic are
    /// handled here. A `DataRow` body is returned with the kind; other
    /// bodies have been decoded into the scratch.
    pub(crate) async fn read_message(&mut self) -> Result<(BackendMessage, Bytes)> {
        loop {
            let mut frame = match self.transport.read_frame().await {
                Ok(frame) => frame,
                Err(CodecError::ConnectionClosed) => {
                    self.state = ProtocolState::Poisoned;
                    return Err(Error::ConnectionClosed);
                }
                Err(e) => {
                    self.state = ProtocolState::Poisoned;
                    return Err(e.into());
                }
            };

            let kind = match self.dispatcher.dispatch(&mut frame, &mut self.scratch) {
                Ok(Some(kind)) => kind,
                Ok(None) => continue,
                Err(e) => {
                    self.state = ProtocolState::Poisoned;
                    return Err(e.into());
                }
            };

            match kind {
                BackendMessage::NoticeResponse => {
                    let notice = &self.scratch.notice;
                    tracing::warn!(
                        severity = %notice.severity,
                        code = %notice.code,
                        message = %notice.message,
                        "server notice"
                    );
                }
                BackendMessage::ParameterStatus => {
                    tracing::debug!(
                        name = %self.scratch.parameter_name,
                        value = %self.scratch.parameter_value,
                        "parameter status"
                    );
                    self.parameters.insert(
                        std::mem::take(&mut self.scratch.parameter_name),
                        std::mem::take(&mut self.scratch.parameter_value),
                    );
                }
                BackendMessage::BackendKeyData => {}
                BackendMessage::NotificationResponse
                | BackendMessage::CopyData
                | BackendMessage::CopyDone
                | BackendMessage::CopyInResponse
                | BackendMessage::CopyOutResponse
                | BackendMessage::CopyBothResponse => {
                    tracing::debug!(kind = ?kind, "discarding unsupported message");
                }
                BackendMessage::ReadyForQuery => {
                    self.state = ProtocolState::Ready;
                    return Ok((kind, frame.body));
                }
                _ => return Ok((kind, frame.body)),
            }
        }
    }

    /// Turn the ErrorResponse in the scratch into an error, reading on to
    /// the ReadyForQuery that closes the cycle.
    pub(crate) async fn fail_after_error(&mut self) -> Error {
        let notice = std::mem::take(&mut self.scratch.notice);
        if notice.is_unrecoverable() {
            self.state = ProtocolState::Poisoned;
            tracing::warn!(code = %notice.code, message = %notice.message, "unrecoverable server error");
            return notice.into();
        }
        if let Err(e) = self.drain().await {
            tracing::debug!(error = %e, "failed to drain after server error");
        }
        notice.into()
    }

    async fn drain(&mut self) -> Result<()> {
        loop {
            let (kind, _) = self.read_message().await?;
            if kind == BackendMessage::ReadyForQuery {
                return Ok(());
            }
        }
    }

    /// Bring the session to a ReadyForQuery boundary before a new request.
    ///
    /// Finishes any response left unread by an abandoned stream and rolls
    /// back a transaction that was dropped while open.
    pub(crate) async fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            ProtocolState::Poisoned => return Err(Error::Poisoned),
            ProtocolState::AwaitingResponse | ProtocolState::Draining => {
                tracing::debug!(state = ?self.state, "draining connection before next request");
                self.drain().await?;
            }
            ProtocolState::Ready => {}
        }

        if self.rollback_pending {
            self.rollback_pending = false;
            if self.is_in_transaction() {
                tracing::debug!("rolling back abandoned transaction");
                self.run_simple("ROLLBACK").await?;
            }
        }
        Ok(())
    }

    async fn write(&mut self, messages: &[FrontendMessage<'_>]) -> Result<()> {
        self.state = ProtocolState::Poisoned;
        self.transport.send_all(messages).await?;
        self.state = ProtocolState::AwaitingResponse;
        Ok(())
    }

    async fn send_extended(&mut self, sql: &str, params: &[PgValue]) -> Result<()> {
        let types: Vec<Oid> = params.iter().map(PgValue::oid).collect();
        let values = params
            .iter()
            .map(PgValue::to_param)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(sql = sql, params = params.len(), "sending extended query");
        self.write(&[
            FrontendMessage::Parse {
                name: "",
                query: sql,
                param_types: &types,
            },
            FrontendMessage::Bind {
                portal: "",
                statement: "",
                params: &values,
                result_format: FormatCode::Binary,
            },
            FrontendMessage::Describe {
                target: Target::Portal,
                name: "",
            },
            FrontendMessage::Execute {
                portal: "",
                max_rows: 0,
            },
            FrontendMessage::Sync,
        ])
        .await
    }

    /// Read the parse/bind acknowledgements and the portal description.
    ///
    /// Returns `true` if the statement produces rows.
    async fn read_result_start(&mut self) -> Result<bool> {
        loop {
            let (kind, _) = self.read_message().await?;
            match kind {
                BackendMessage::ParseComplete | BackendMessage::BindComplete => {}
                BackendMessage::RowDescription => return Ok(true),
                BackendMessage::NoData => return Ok(false),
                BackendMessage::ErrorResponse => return Err(self.fail_after_error().await),
                other => return Err(self.unexpected(other)),
            }
        }
    }

    /// Read to ReadyForQuery, returning the count of the last completed
    /// statement. Rows are discarded.
    async fn finish_command(&mut self) -> Result<u64> {
        let mut rows = 0;
        loop {
            let (kind, _) = self.read_message().await?;
            match kind {
                BackendMessage::CommandComplete => rows = self.rows_affected(),
                BackendMessage::DataRow
                | BackendMessage::RowDescription
                | BackendMessage::NoData
                | BackendMessage::EmptyQueryResponse
                | BackendMessage::PortalSuspended => {}
                BackendMessage::ErrorResponse => return Err(self.fail_after_error().await),
                BackendMessage::ReadyForQuery => return Ok(rows),
                other => return Err(self.unexpected(other)),
            }
        }
    }

    async fn run_simple(&mut self, sql: &str) -> Result<u64> {
        tracing::debug!(sql = sql, "sending simple query");
        self.write(&[FrontendMessage::Query(sql)]).await?;
        self.finish_command().await
    }

    /// Send a query and read up to its result shape.
    ///
    /// Returns `true` if rows follow.
    pub(crate) async fn start_query(&mut self, sql: &str, params: &[PgValue]) -> Result<bool> {
        self.ensure_ready().await?;
        self.send_extended(sql, params).await?;
        self.read_result_start().await
    }

    /// Execute a single statement and return the number of affected rows.
    ///
    /// Parameters are sent in binary form and referenced as `$1`, `$2`, ...
    /// Any rows the statement returns are discarded.
    pub async fn execute(&mut self, sql: &str, params: &[PgValue]) -> Result<u64> {
        self.start_query(sql, params).await?;
        self.finish_command().await
    }

    /// Run one or more statements without parameters or results.
    ///
    /// Statements separated by semicolons run as one implicit transaction
    /// unless the text manages transactions itself.
    pub async fn perform(&mut self, sql: &str) -> Result<()> {
        self.ensure_ready().await?;
        self.run_simple(sql).await.map(|_| ())
    }

    /// Run a query and stream its rows.
    ///
    /// The connection is borrowed until the stream is finished or dropped.
    pub async fn query(&mut self, sql: &str, params: &[PgValue]) -> Result<RowStream<'_, T>> {
        RowStream::start(Holder::Borrowed(self), sql, params).await
    }

    /// Begin a transaction.
    pub async fn begin_transaction(
        &mut self,
        isolation: Option<IsolationLevel>,
    ) -> Result<Transaction<'_, T>> {
        Transaction::begin(Holder::Borrowed(self), isolation).await
    }

    /// Check the session with a trivial round trip.
    pub async fn ping(&mut self) -> Result<()> {
        self.perform("SELECT 1").await
    }

    /// End the session and return the underlying stream.
    pub async fn close(mut self) -> Result<T> {
        if self.state.is_usable() {
            self.transport.terminate().await?;
        }
        Ok(self.transport.into_inner())
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("transaction_status", &self.scratch.transaction_status)
            .field("rollback_pending", &self.rollback_pending)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a connection, either borrowed or held through a
/// shared connection's owned guard.
pub(crate) enum Holder<'c, T> {
    Owned(OwnedMutexGuard<Connection<T>>),
    Borrowed(&'c mut Connection<T>),
}

impl<T> Deref for Holder<'_, T> {
    type Target = Connection<T>;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(guard) => guard,
            Self::Borrowed(conn) => conn,
        }
    }
}

impl<T> DerefMut for Holder<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(guard) => guard,
            Self::Borrowed(conn) => conn,
        }
    }
}

/// A connection shared between tasks.
///
/// Whoever holds the lock owns the wire. Row streams and transactions
/// created through [`CommandTarget`](crate::command::CommandTarget) keep the
/// lock until they finish or are dropped, so [`is_released`](Self::is_released)
/// reports whether the connection can take another command.
pub struct SharedConnection<T> {
    inner: Arc<Mutex<Connection<T>>>,
}

impl<T> Clone for SharedConnection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedConnection<T> {
    /// Share a connection.
    pub fn new(connection: Connection<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> OwnedMutexGuard<Connection<T>> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Take exclusive access if nobody holds it.
    pub fn try_lock(&self) -> std::result::Result<OwnedMutexGuard<Connection<T>>, TryLockError> {
        Arc::clone(&self.inner).try_lock_owned()
    }

    /// Check if no command, stream or transaction currently holds the
    /// connection.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.try_lock().is_ok()
    }

    /// Wait until the current holder releases the connection.
    pub async fn wait_released(&self) {
        drop(self.inner.lock().await);
    }

    /// Check if the connection is still usable.
    ///
    /// A connection that is currently held is assumed usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.try_lock().map_or(true, |conn| conn.is_usable())
    }
}

impl<T> std::fmt::Debug for SharedConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("released", &self.is_released())
            .finish()
    }
}
