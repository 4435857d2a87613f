//! Connection pool implementation.
//!
//! Submitted commands wait in one FIFO queue. Every connection has a worker
//! that takes the oldest command, runs it and, when the outcome keeps the
//! connection ([`ReleaseState::InUse`]), waits for the consumer to let go
//! before taking the next one.

use std::sync::Arc;

use parking_lot::Mutex;
use pg_client::{
    Command, CommandHandle, Connection, OutcomeSlots, ReleaseState, Request, SharedConnection,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionLifecycle, ConnectionMetadata, ConnectionState};

/// Handle to a command submitted to a [`Pool`].
pub type PoolHandle<T> = CommandHandle<SharedConnection<T>>;

type Queue<T> = Arc<tokio::sync::Mutex<mpsc::Receiver<Command<SharedConnection<T>>>>>;

/// A pool of connections served by one worker each.
///
/// # Example
///
/// ```rust,ignore
/// use pg_driver_pool::{Pool, PoolConfig};
/// use pg_client::{CancellationToken, Request};
///
/// let pool = Pool::new(connections, PoolConfig::new().queue_capacity(256))?;
///
/// let handle = pool
///     .submit(Request::non_query("DELETE FROM sessions WHERE expired", vec![]), CancellationToken::new())
///     .await?;
/// let removed = handle.await?.affected();
/// ```
pub struct Pool<T>
where
    T: AsyncRead + AsyncWrite + Unpin + 'static,
{
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Command<SharedConnection<T>>>>>,
    slots: OutcomeSlots<SharedConnection<T>>,
    connections: Vec<SharedConnection<T>>,
    metadata: Vec<Arc<Mutex<ConnectionMetadata>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> Pool<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start a worker for each connection.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        connections: impl IntoIterator<Item = Connection<T>>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        Self::from_shared(connections.into_iter().map(SharedConnection::new), config)
    }

    /// Start a worker for each already shared connection.
    pub fn from_shared(
        connections: impl IntoIterator<Item = SharedConnection<T>>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let connections: Vec<_> = connections.into_iter().collect();
        if connections.is_empty() {
            return Err(PoolError::Configuration(
                "pool needs at least one connection".into(),
            ));
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let queue: Queue<T> = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut metadata = Vec::with_capacity(connections.len());
        let mut workers = Vec::with_capacity(connections.len());
        for (id, conn) in connections.iter().enumerate() {
            let meta = Arc::new(Mutex::new(ConnectionMetadata::new(id)));
            workers.push(tokio::spawn(run_worker(
                conn.clone(),
                Arc::clone(&queue),
                Arc::clone(&meta),
            )));
            metadata.push(meta);
        }

        tracing::info!(
            connections = connections.len(),
            queue_capacity = config.queue_capacity,
            "connection pool started"
        );
        Ok(Self {
            slots: OutcomeSlots::new(config.completion_slot_cache),
            config,
            sender: Mutex::new(Some(sender)),
            connections,
            metadata,
            workers: Mutex::new(workers),
        })
    }

    fn sender(&self) -> Result<mpsc::Sender<Command<SharedConnection<T>>>, PoolError> {
        self.sender.lock().clone().ok_or(PoolError::PoolClosed)
    }

    fn command(&self, request: Request, token: CancellationToken) -> (Command<SharedConnection<T>>, PoolHandle<T>) {
        let (mut command, handle) = Command::new(request, token, &self.slots);
        command.attach_cancellation();
        (command, handle)
    }

    /// Queue a command, waiting for room if the queue is full.
    ///
    /// Cancelling `token` resolves the handle with a cancellation error
    /// whether the command is still queued or already running.
    pub async fn submit(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> Result<PoolHandle<T>, PoolError> {
        let sender = self.sender()?;
        let (command, handle) = self.command(request, token);
        sender
            .send(command)
            .await
            .map_err(|_| PoolError::PoolClosed)?;
        Ok(handle)
    }

    /// Queue a command without waiting.
    pub fn try_submit(
        &self,
        request: Request,
        token: CancellationToken,
    ) -> Result<PoolHandle<T>, PoolError> {
        let sender = self.sender()?;
        let (command, handle) = self.command(request, token);
        sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull {
                capacity: self.config.queue_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => PoolError::PoolClosed,
        })?;
        Ok(handle)
    }

    /// Stop accepting commands and wait for the workers to finish.
    ///
    /// Commands already queued still run. A worker waiting for a handed-out
    /// row stream or transaction finishes once that is released.
    pub async fn close(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "pool worker failed");
            }
        }
        tracing::info!("connection pool closed");
    }
}

impl<T> Pool<T>
where
    T: AsyncRead + AsyncWrite + Unpin + 'static,
{
    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().as_ref().is_none_or(|s| s.is_closed())
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The pooled connections.
    #[must_use]
    pub fn connections(&self) -> &[SharedConnection<T>] {
        &self.connections
    }

    /// Snapshot of every connection's bookkeeping.
    #[must_use]
    pub fn metadata(&self) -> Vec<ConnectionMetadata> {
        self.metadata.iter().map(|m| m.lock().clone()).collect()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let mut status = PoolStatus {
            total: self.metadata.len(),
            ..PoolStatus::default()
        };
        for meta in &self.metadata {
            match meta.lock().state {
                ConnectionState::Idle => status.idle += 1,
                ConnectionState::Busy => status.busy += 1,
                ConnectionState::Held => status.held += 1,
                ConnectionState::Closed => status.closed += 1,
            }
        }
        if let Some(sender) = self.sender.lock().as_ref() {
            status.queued = sender.max_capacity() - sender.capacity();
        }
        status
    }
}

impl<T> std::fmt::Debug for Pool<T>
where
    T: AsyncRead + AsyncWrite + Unpin + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting for a command.
    pub idle: usize,
    /// Connections running a command.
    pub busy: usize,
    /// Connections held by a handed-out row stream or transaction.
    pub held: usize,
    /// Connections whose worker stopped after a failure.
    pub closed: usize,
    /// Total number of connections.
    pub total: usize,
    /// Commands waiting for a worker.
    pub queued: usize,
}

async fn run_worker<T>(
    conn: SharedConnection<T>,
    queue: Queue<T>,
    metadata: Arc<Mutex<ConnectionMetadata>>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = metadata.lock().id;
    tracing::debug!(worker = id, "pool worker started");

    loop {
        let next = queue.lock().await.recv().await;
        let Some(command) = next else {
            break;
        };

        metadata.lock().mark_busy();
        let state = command.execute(&conn).await;
        if state == ReleaseState::InUse {
            metadata.lock().mark_held();
            tracing::trace!(worker = id, "waiting for connection release");
            ConnectionLifecycle::wait_released(&conn).await;
        }

        if !ConnectionLifecycle::is_valid(&conn) {
            tracing::warn!(worker = id, "connection is no longer usable; worker stopping");
            metadata.lock().mark_closed();
            return;
        }
        metadata.lock().mark_idle();
    }

    tracing::debug!(worker = id, "pool worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pg_client::PgValue;
    use pg_testing::{MockColumn, MockResponse, MockServerBuilder};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn connection(builder: MockServerBuilder) -> Connection<DuplexStream> {
        Connection::new(builder.build_duplex().0)
    }

    #[tokio::test]
    async fn test_empty_pool_rejected() {
        let result = Pool::<DuplexStream>::new(Vec::new(), PoolConfig::new());
        assert!(matches!(result, Err(PoolError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_submit_and_close() {
        let pool = Pool::new(
            [connection(
                MockServerBuilder::new().with_response("DELETE FROM t", MockResponse::affected(2)),
            )],
            PoolConfig::new(),
        )
        .unwrap();

        let handle = pool
            .submit(Request::non_query("DELETE FROM t", vec![]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.await.unwrap().affected(), Some(2));

        pool.close().await;
        assert!(pool.is_closed());
        let err = pool
            .submit(Request::batch("SELECT 1"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::PoolClosed));
    }

    #[tokio::test]
    async fn test_worker_waits_for_release() {
        let pool = Pool::new(
            [connection(MockServerBuilder::new().with_response(
                "SELECT n",
                MockResponse::rows(vec![MockColumn::int4("n")], vec![vec![PgValue::Int4(1)]]),
            ))],
            PoolConfig::new(),
        )
        .unwrap();

        let rows = pool
            .submit(Request::query("SELECT n", vec![]), CancellationToken::new())
            .await
            .unwrap()
            .await
            .unwrap()
            .into_rows()
            .unwrap();
        let next = pool
            .submit(Request::batch("SELECT 1"), CancellationToken::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!next.is_completed());
        assert_eq!(pool.status().held, 1);

        drop(rows);
        tokio::time::timeout(Duration::from_secs(1), next)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_queue_full() {
        let pool = Pool::new(
            [connection(MockServerBuilder::new().with_response(
                "SELECT pg_sleep(1)",
                MockResponse::command("SELECT 1").delayed(Duration::from_millis(200)),
            ))],
            PoolConfig::new().queue_capacity(1),
        )
        .unwrap();

        let _running = pool
            .try_submit(Request::batch("SELECT pg_sleep(1)"), CancellationToken::new())
            .unwrap();
        // let the worker take the first command off the queue
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _queued = pool
            .try_submit(Request::batch("SELECT 2"), CancellationToken::new())
            .unwrap();
        let err = pool
            .try_submit(Request::batch("SELECT 3"), CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, PoolError::QueueFull { capacity: 1 }));
        assert_eq!(pool.status().queued, 1);
    }
}
