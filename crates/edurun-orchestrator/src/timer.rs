//! Cancellable one-shot timer for debouncing.
//!
//! A [`DebounceTimer`] holds at most one armed timer. Scheduling a new one
//! cancels the previous one. Cancellation aborts the sleeping task, but an
//! action that already ran (for example, one that posted a message the owner
//! has not processed yet) cannot be recalled, so owners confirm a fired
//! handle with [`DebounceTimer::take_if_current`] before acting on it.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Raw token value.
    #[must_use]
    pub const fn token(self) -> u64 {
        self.0
    }
}

/// A slot holding at most one outstanding timer.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    next_token: u64,
    armed: Option<(TimerHandle, JoinHandle<()>)>,
}

impl DebounceTimer {
    /// Creates an empty timer slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay`, replacing any armed timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> TimerHandle
    where
        F: FnOnce(TimerHandle) + Send + 'static,
    {
        self.cancel_armed();

        self.next_token = self.next_token.wrapping_add(1);
        let handle = TimerHandle(self.next_token);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action(handle);
        });
        self.armed = Some((handle, task));
        handle
    }

    /// Cancels `handle` if it is the armed timer. Returns whether it was.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if self.is_current(handle) {
            self.cancel_armed()
        } else {
            false
        }
    }

    /// Cancels whatever timer is armed. Returns whether one was.
    pub fn cancel_armed(&mut self) -> bool {
        match self.armed.take() {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `handle` is the armed timer.
    #[must_use]
    pub fn is_current(&self, handle: TimerHandle) -> bool {
        self.armed.as_ref().is_some_and(|(armed, _)| *armed == handle)
    }

    /// Returns `true` if a timer is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Disarms the slot if `handle` is the armed timer.
    ///
    /// Called by the owner when a fired handle is delivered. Returns `false`
    /// for handles that were cancelled or replaced after firing.
    pub fn take_if_current(&mut self, handle: TimerHandle) -> bool {
        if self.is_current(handle) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel_armed();
    }
}
