//! Commands and the connection release protocol.
//!
//! A [`Command`] describes one unit of work for a connection together with
//! the cancellation token that may abandon it. Executing it produces an
//! [`Outcome`] for the submitter and a [`ReleaseState`] for whoever owns the
//! connection:
//!
//! - statements, batches and failures finish with the connection
//!   [`Released`](ReleaseState::Released);
//! - a row stream or an open transaction keeps it
//!   [`InUse`](ReleaseState::InUse) until the outcome is consumed or
//!   dropped.
//!
//! The result and a cancellation race for the same completion slot. Exactly
//! one of them reaches the [`CommandHandle`]; a result that loses is dropped
//! on the spot, which releases anything it held.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pg_types::PgValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionFuture, CompletionPool, CompletionSource};
use crate::connection::{Holder, SharedConnection};
use crate::error::{Error, Result};
use crate::stream::RowStream;
use crate::transaction::{IsolationLevel, Transaction};

/// Work a command performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// A statement whose rows, if any, are discarded. Yields the affected
    /// row count.
    NonQuery {
        /// Statement text.
        sql: String,
        /// Bound parameters.
        params: Vec<PgValue>,
    },
    /// A query whose rows are streamed back.
    Query {
        /// Statement text.
        sql: String,
        /// Bound parameters.
        params: Vec<PgValue>,
    },
    /// Statements without parameters, run through the simple protocol.
    Batch {
        /// Statement text, possibly several statements.
        sql: String,
    },
    /// Open a transaction.
    BeginTransaction {
        /// Isolation level; `None` uses the session default.
        isolation: Option<IsolationLevel>,
    },
}

impl Request {
    /// A statement with parameters.
    pub fn non_query(sql: impl Into<String>, params: Vec<PgValue>) -> Self {
        Self::NonQuery {
            sql: sql.into(),
            params,
        }
    }

    /// A streamed query with parameters.
    pub fn query(sql: impl Into<String>, params: Vec<PgValue>) -> Self {
        Self::Query {
            sql: sql.into(),
            params,
        }
    }

    /// A parameterless batch.
    pub fn batch(sql: impl Into<String>) -> Self {
        Self::Batch { sql: sql.into() }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NonQuery { .. } => "non_query",
            Self::Query { .. } => "query",
            Self::Batch { .. } => "batch",
            Self::BeginTransaction { .. } => "begin_transaction",
        }
    }
}

/// Whether a connection can take the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// The outcome still holds the connection.
    InUse,
    /// The connection is free.
    Released,
}

impl ReleaseState {
    /// Check if the connection is free.
    #[must_use]
    pub fn is_released(self) -> bool {
        self == Self::Released
    }
}

/// Anything that can run requests.
///
/// Row streams and transactions are associated types so a target can hand
/// out values that keep holding it.
#[allow(async_fn_in_trait)]
pub trait CommandTarget {
    /// Streamed rows of a query.
    type Rows;
    /// An open transaction.
    type Transaction;

    /// Run a statement and return the affected row count.
    async fn execute(&self, sql: &str, params: &[PgValue]) -> Result<u64>;

    /// Run a query and stream its rows.
    async fn query(&self, sql: &str, params: &[PgValue]) -> Result<Self::Rows>;

    /// Run parameterless statements.
    async fn perform(&self, sql: &str) -> Result<()>;

    /// Open a transaction.
    async fn begin_transaction(
        &self,
        isolation: Option<IsolationLevel>,
    ) -> Result<Self::Transaction>;
}

impl<T> CommandTarget for SharedConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + 'static,
{
    type Rows = RowStream<'static, T>;
    type Transaction = Transaction<'static, T>;

    async fn execute(&self, sql: &str, params: &[PgValue]) -> Result<u64> {
        self.lock().await.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[PgValue]) -> Result<Self::Rows> {
        RowStream::start(Holder::Owned(self.lock().await), sql, params).await
    }

    async fn perform(&self, sql: &str) -> Result<()> {
        self.lock().await.perform(sql).await
    }

    async fn begin_transaction(
        &self,
        isolation: Option<IsolationLevel>,
    ) -> Result<Self::Transaction> {
        Transaction::begin(Holder::Owned(self.lock().await), isolation).await
    }
}

/// Result of a command.
pub enum Outcome<C: CommandTarget> {
    /// Rows affected by a statement.
    Affected(u64),
    /// Streamed rows of a query. Holds the connection.
    Rows(C::Rows),
    /// A batch finished.
    Done,
    /// An open transaction. Holds the connection.
    Transaction(C::Transaction),
}

impl<C: CommandTarget> Outcome<C> {
    /// Release state of the connection while this outcome is alive.
    #[must_use]
    pub fn release_state(&self) -> ReleaseState {
        match self {
            Self::Affected(_) | Self::Done => ReleaseState::Released,
            Self::Rows(_) | Self::Transaction(_) => ReleaseState::InUse,
        }
    }

    /// Affected row count, if this is a statement result.
    #[must_use]
    pub fn affected(&self) -> Option<u64> {
        match self {
            Self::Affected(n) => Some(*n),
            _ => None,
        }
    }

    /// Take the row stream, if this is a query result.
    pub fn into_rows(self) -> Option<C::Rows> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Take the transaction, if one was opened.
    pub fn into_transaction(self) -> Option<C::Transaction> {
        match self {
            Self::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}

impl<C: CommandTarget> std::fmt::Debug for Outcome<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
            Self::Rows(_) => f.write_str("Rows"),
            Self::Done => f.write_str("Done"),
            Self::Transaction(_) => f.write_str("Transaction"),
        }
    }
}

/// Completion slots carrying command outcomes.
pub type OutcomeSlots<C> = CompletionPool<Result<Outcome<C>>>;

/// A request waiting to run, paired with the handle its submitter awaits.
///
/// Dropping a command that never ran resolves its handle with
/// [`Error::ConnectionClosed`].
pub struct Command<C: CommandTarget> {
    request: Request,
    token: CancellationToken,
    source: CompletionSource<Result<Outcome<C>>>,
    watching: bool,
}

impl<C: CommandTarget> Command<C> {
    /// Create a command and the handle that resolves with its outcome.
    pub fn new(
        request: Request,
        token: CancellationToken,
        slots: &OutcomeSlots<C>,
    ) -> (Self, CommandHandle<C>) {
        let (source, future) = slots.acquire();
        let command = Self {
            request,
            token,
            source,
            watching: false,
        };
        (command, CommandHandle { future })
    }

    /// The request this command runs.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Check if the command was cancelled or its handle dropped.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.token.is_cancelled() || self.source.is_completed()
    }

    /// Run the request against `target`.
    ///
    /// The outcome goes to the command's handle unless a cancellation got
    /// there first. The returned state tells the caller when the target can
    /// take its next command.
    pub async fn execute(self, target: &C) -> ReleaseState {
        let kind = self.request.kind();
        if self.token.is_cancelled() {
            tracing::debug!(kind, "skipping cancelled command");
            if !self.source.is_completed() {
                let _ = self.source.try_complete(Err(Error::Cancelled));
            }
            return ReleaseState::Released;
        }
        if self.source.is_completed() {
            tracing::debug!(kind, "skipping abandoned command");
            return ReleaseState::Released;
        }

        let result = match &self.request {
            Request::NonQuery { sql, params } => {
                target.execute(sql, params).await.map(Outcome::Affected)
            }
            Request::Query { sql, params } => target.query(sql, params).await.map(Outcome::Rows),
            Request::Batch { sql } => target.perform(sql).await.map(|()| Outcome::Done),
            Request::BeginTransaction { isolation } => target
                .begin_transaction(*isolation)
                .await
                .map(Outcome::Transaction),
        };
        let state = match &result {
            Ok(outcome) => outcome.release_state(),
            Err(_) => ReleaseState::Released,
        };

        match self.source.try_complete(result) {
            Ok(()) => state,
            Err(lost) => {
                tracing::debug!(kind, "command result lost to cancellation");
                drop(lost);
                ReleaseState::Released
            }
        }
    }
}

impl<C: CommandTarget> Drop for Command<C> {
    fn drop(&mut self) {
        // a command dropped unexecuted still resolves its handle
        if !self.source.is_completed() {
            let _ = self.source.try_complete(Err(Error::ConnectionClosed));
        }
    }
}

impl<C> Command<C>
where
    C: CommandTarget + 'static,
    C::Rows: Send + 'static,
    C::Transaction: Send + 'static,
{
    /// Complete the command with [`Error::Cancelled`] as soon as its token
    /// fires, even while it is queued or running.
    ///
    /// The watcher task is torn down once the command completes. Must be
    /// called inside a Tokio runtime.
    pub fn attach_cancellation(&mut self) {
        if self.watching {
            return;
        }
        self.watching = true;

        let token = self.token.clone();
        let source = self.source.clone();
        let watcher = tokio::spawn(async move {
            token.cancelled().await;
            if source.try_complete(Err(Error::Cancelled)).is_ok() {
                tracing::debug!("command cancelled");
            }
        });
        self.source.set_registration(watcher.abort_handle());
    }
}

impl<C: CommandTarget> std::fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("request", &self.request)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Resolves with the outcome of a submitted command.
///
/// Dropping the handle abandons the command. If it has not started it is
/// skipped; if it is running, its outcome is dropped when it arrives.
pub struct CommandHandle<C: CommandTarget> {
    future: CompletionFuture<Result<Outcome<C>>>,
}

impl<C: CommandTarget> CommandHandle<C> {
    /// Check if the outcome is available.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.future.is_completed()
    }
}

impl<C: CommandTarget> Future for CommandHandle<C> {
    type Output = Result<Outcome<C>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.future).poll(cx)
    }
}

impl<C: CommandTarget> std::fmt::Debug for CommandHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("completed", &self.is_completed())
            .finish()
    }
}
