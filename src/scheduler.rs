//! One-shot deferred actions with idempotent cancellation.
//!
//! [`schedule`] spawns a task on the current tokio runtime that sleeps until
//! the given delay has elapsed, counted from the call, and then runs the
//! action. The returned [`TimerHandle`] can be
//! cancelled any number of times; cancelling a timer that already completed
//! is a no-op.
//!
//! [`TimerSlot`] holds at most one outstanding timer of a kind. Installing a
//! new timer cancels the previous one, unless the previous one has already
//! fired: a renewal that reschedules itself from inside its own action must
//! not abort itself.
//!
//! Timers use `tokio::time`, so they follow the paused clock in tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a scheduled action.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Cancel the action. Idempotent; an action already running is aborted at
    /// its next await point.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the delay elapsed and the action started.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Whether the underlying task finished, by completion or cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait up to `timeout` for a fired action to finish, then abort it.
    ///
    /// Unfired timers are cancelled immediately. If the returned future is
    /// dropped mid-wait the task is still aborted.
    pub async fn shutdown(self, timeout: Duration) {
        if !self.has_fired() {
            self.cancel();
            return;
        }

        let mut guard = AbortOnDrop(self.task);
        if tokio::time::timeout(timeout, &mut guard.0).await.is_err() {
            tracing::warn!(?timeout, "scheduled action did not finish in time, aborting");
        }
    }
}

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortOnDrop(pub(crate) JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Cap for delays that overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Run `action` once after `delay`.
///
/// Must be called from within a tokio runtime.
pub fn schedule<F, Fut>(delay: Duration, action: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let now = tokio::time::Instant::now();
    let deadline = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let task = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        flag.store(true, Ordering::Release);
        action().await;
    });
    TimerHandle { task, fired }
}

// ---------------------------------------------------------------------------
// Single-flight slot
// ---------------------------------------------------------------------------

/// Holds at most one outstanding timer of a kind.
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    current: Option<TimerHandle>,
    closed: bool,
}

impl TimerSlot {
    /// Create an open, empty slot. `name` is used in log fields.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Install `handle`, cancelling the previously installed timer if it has
    /// not fired yet.
    ///
    /// Returns `false` (and cancels `handle`) when the slot is closed.
    pub fn replace(&self, handle: TimerHandle) -> bool {
        let mut state = self.lock();
        if state.closed {
            handle.cancel();
            tracing::debug!(slot = self.name, "slot closed, dropping new timer");
            return false;
        }
        if let Some(previous) = state.current.replace(handle) {
            if !previous.has_fired() {
                previous.cancel();
            }
        }
        true
    }

    /// Reopen the slot after [`close`](Self::close).
    pub fn open(&self) {
        self.lock().closed = false;
    }

    /// Whether the slot refuses new timers.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether a timer is installed and has not finished.
    pub fn is_pending(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Close the slot and shut down the installed timer, giving a fired
    /// action up to `timeout` to finish.
    pub async fn close(&self, timeout: Duration) {
        let current = {
            let mut state = self.lock();
            state.closed = true;
            state.current.take()
        };
        if let Some(handle) = current {
            tracing::debug!(slot = self.name, fired = handle.has_fired(), "shutting down timer");
            handle.shutdown(timeout).await;
        }
    }

    /// Close the slot and abort the installed timer without waiting.
    pub fn cancel_now(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(handle) = state.current.take() {
            handle.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = schedule(Duration::from_secs(10), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!handle.has_fired());

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handle.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_tolerates_completion() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = schedule(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        handle.cancel();
        handle.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_cancels_the_unfired_timer() {
        let slot = TimerSlot::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        assert!(slot.replace(schedule(Duration::from_secs(5), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        })));
        let h = Arc::clone(&hits);
        assert!(slot.replace(schedule(Duration::from_secs(10), move || async move {
            h.fetch_add(10, Ordering::SeqCst);
        })));

        tokio::time::advance(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_slot_refuses_new_timers() {
        let slot = TimerSlot::new("test");
        slot.close(Duration::from_secs(1)).await;

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        assert!(!slot.replace(schedule(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        })));

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        slot.open();
        assert!(!slot.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_counts_from_the_schedule_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = schedule(Duration::from_secs(10), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        // The clock moves before the timer task is ever polled.
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_until_the_installed_timer_finishes() {
        let slot = TimerSlot::new("test");
        assert!(!slot.is_pending());

        slot.replace(schedule(Duration::from_secs(3), || async {}));
        assert!(slot.is_pending());

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(!slot.is_pending());

        slot.replace(schedule(Duration::from_secs(3), || async {}));
        slot.close(Duration::from_secs(1)).await;
        assert!(!slot.is_pending());
    }
}
