//! Inter-task handoff channels and the shared cancellation signal.
//!
//! Uses a single-slot `embassy-sync` channel per actuator to hand duty
//! commands from the measurement thread to the actuator threads. The
//! producer blocks on a full slot (rendezvous, not latest-wins); the
//! consumer only ever polls.
//!
//! ```text
//! ┌──────────────────┐  DutyCycleCommand  ┌────────────────┐
//! │ Measurement task │───── [ slot ] ────▶│ Cool actuator  │
//! │ (blocking send)  │───── [ slot ] ────▶│ Heat actuator  │
//! └──────────────────┘                    └────────────────┘
//!            ▲                       ▲            ▲
//!            └─────── CancelToken ───┴────────────┘
//! ```
//!
//! A blocked send is raced against [`CancelToken::cancelled`] so shutdown
//! never waits on a consumer that has already stopped.

use core::future::poll_fn;
use core::task::{Poll, Waker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;

// ───────────────────────────────────────────────────────────────
// Cancellation
// ───────────────────────────────────────────────────────────────

struct CancelInner {
    flag: AtomicBool,
    /// Async waiters (blocked sends).
    wakers: Mutex<Vec<Waker>>,
    /// Blocking waiters (grace delays).
    cv: Condvar,
}

/// Cooperative cancellation shared by every task. Cloning shares the flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                wakers: Mutex::new(Vec::new()),
                cv: Condvar::new(),
            }),
        }
    }

    fn wakers(&self) -> MutexGuard<'_, Vec<Waker>> {
        self.inner
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the signal and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
        let wakers = core::mem::take(&mut *self.wakers());
        for w in wakers {
            w.wake();
        }
        self.inner.cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        poll_fn(|cx| {
            if self.is_cancelled() {
                return Poll::Ready(());
            }
            let mut wakers = self.wakers();
            if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
            // Re-check under the lock: cancel() may have drained already.
            if self.is_cancelled() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }

    /// Sleep for `duration` or until cancelled. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = self.wakers();
        let _unused = self
            .inner
            .cv
            .wait_timeout_while(guard, duration, |_| !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_cancelled()
    }
}

// ───────────────────────────────────────────────────────────────
// Single-slot handoff
// ───────────────────────────────────────────────────────────────

/// Result of a blocking send.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Delivered,
    /// Cancellation fired while the slot was still full; value dropped.
    Cancelled,
}

/// Single-slot, backpressured rendezvous between one producer and one
/// polling consumer.
pub struct Handoff<T> {
    slot: Channel<CriticalSectionRawMutex, T, 1>,
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Handoff<T> {
    pub const fn new() -> Self {
        Self {
            slot: Channel::new(),
        }
    }

    /// Block until the slot is free, or until `cancel` fires.
    pub fn send_blocking(&self, value: T, cancel: &CancelToken) -> SendStatus {
        future::block_on(future::or(
            async {
                self.slot.send(value).await;
                SendStatus::Delivered
            },
            async {
                cancel.cancelled().await;
                SendStatus::Cancelled
            },
        ))
    }

    /// Non-blocking send; hands the value back if the slot is full.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        self.slot.try_send(value).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(v) => v,
        })
    }

    /// Take the pending value, if any, without waiting.
    pub fn poll(&self) -> Option<T> {
        self.slot.try_receive().ok()
    }

    pub fn is_pending(&self) -> bool {
        !self.slot.is_empty()
    }
}
