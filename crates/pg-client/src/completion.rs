//! Reusable one-shot completion slots.
//!
//! A command's result travels through a slot: the producer side
//! ([`CompletionSource`]) may be raced by the executing worker and a
//! cancellation watcher, and exactly one of them lands a value. The consumer
//! side ([`CompletionFuture`]) awaits it.
//!
//! Slots are recycled through a [`CompletionPool`]. Every slot carries a
//! version that the consumer bumps when it lets go, so a producer that
//! outlives its consumer can never complete the slot's next user.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::config::Config;

struct SlotState<T> {
    version: u64,
    completed: bool,
    value: Option<T>,
    waker: Option<Waker>,
    registration: Option<AbortHandle>,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                version: 0,
                completed: false,
                value: None,
                waker: None,
                registration: None,
            }),
        }
    }
}

struct PoolInner<T> {
    idle: Mutex<Vec<Arc<Slot<T>>>>,
    max_cached: usize,
}

/// Recycles completion slots.
pub struct CompletionPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for CompletionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CompletionPool<T> {
    /// Create a pool that keeps at most `max_cached` idle slots.
    #[must_use]
    pub fn new(max_cached: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max_cached)),
                max_cached,
            }),
        }
    }

    /// Create a pool sized by a client configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.completion_slot_cache)
    }

    /// Take a slot and split it into its producer and consumer halves.
    #[must_use]
    pub fn acquire(&self) -> (CompletionSource<T>, CompletionFuture<T>) {
        let slot = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Arc::new(Slot::new()));
        let version = {
            let mut state = slot.state.lock();
            state.completed = false;
            state.version
        };
        let source = CompletionSource {
            slot: Arc::clone(&slot),
            version,
        };
        let future = CompletionFuture {
            slot,
            version,
            pool: Arc::clone(&self.inner),
        };
        (source, future)
    }

    /// Number of idle slots ready for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl<T> std::fmt::Debug for CompletionPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPool")
            .field("idle", &self.idle())
            .field("max_cached", &self.inner.max_cached)
            .finish()
    }
}

/// Producer half of a slot.
///
/// Cloning it lets several racing producers share one slot; the first
/// completion wins.
pub struct CompletionSource<T> {
    slot: Arc<Slot<T>>,
    version: u64,
}

impl<T> Clone for CompletionSource<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            version: self.version,
        }
    }
}

impl<T> CompletionSource<T> {
    /// Deliver `value` unless the slot was already completed or its
    /// consumer has gone away. On failure the value is handed back.
    ///
    /// The winner also tears down the registered cancellation watcher.
    pub fn try_complete(&self, value: T) -> Result<(), T> {
        let waker = {
            let mut state = self.slot.state.lock();
            if state.version != self.version {
                drop(state);
                tracing::warn!(version = self.version, "ignoring completion of a recycled slot");
                return Err(value);
            }
            if state.completed {
                return Err(value);
            }
            state.completed = true;
            state.value = Some(value);
            if let Some(registration) = state.registration.take() {
                registration.abort();
            }
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Attach the task that may complete this slot on cancellation.
    ///
    /// The task is aborted as soon as the slot completes. If that already
    /// happened, it is aborted immediately.
    pub fn set_registration(&self, registration: AbortHandle) {
        let mut state = self.slot.state.lock();
        if state.version != self.version || state.completed {
            registration.abort();
            return;
        }
        if let Some(previous) = state.registration.replace(registration) {
            previous.abort();
        }
    }

    /// Check if the slot no longer accepts a value.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        let state = self.slot.state.lock();
        state.version != self.version || state.completed
    }
}

impl<T> std::fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSource")
            .field("version", &self.version)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Consumer half of a slot.
///
/// Resolves with the value delivered through the matching
/// [`CompletionSource`]. Dropping it returns the slot to its pool; any
/// value that arrives later is handed back to its producer.
pub struct CompletionFuture<T> {
    slot: Arc<Slot<T>>,
    version: u64,
    pool: Arc<PoolInner<T>>,
}

impl<T> CompletionFuture<T> {
    /// Check if a value has been delivered.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.slot.state.lock().completed
    }
}

impl<T> Future for CompletionFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.slot.state.lock();
        if let Some(value) = state.value.take() {
            return Poll::Ready(value);
        }
        match &mut state.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            waker => *waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<T> Drop for CompletionFuture<T> {
    fn drop(&mut self) {
        let (value, registration) = {
            let mut state = self.slot.state.lock();
            debug_assert_eq!(state.version, self.version);
            state.version = state.version.wrapping_add(1);
            state.completed = true;
            state.waker = None;
            (state.value.take(), state.registration.take())
        };
        if let Some(registration) = registration {
            registration.abort();
        }
        // release whatever the value holds outside the slot lock
        drop(value);

        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.max_cached {
            idle.push(Arc::clone(&self.slot));
        }
    }
}

impl<T> std::fmt::Debug for CompletionFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("version", &self.version)
            .field("completed", &self.is_completed())
            .finish()
    }
}
