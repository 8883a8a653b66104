// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream liveness watchdog
//!
//! A timer task that reports a [`Stall`] when [`StreamWatchdog::touch`] has
//! not been called for a whole window. It only signals; deciding what to do
//! about a stall is up to the caller. A [`WatchdogSession`] bundles a running
//! watchdog with its notices so any provider call can be awaited under it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::error::{RelayError, Result};

/// Stall notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    /// Retry budget remains; `attempt` counts from 1
    Recoverable { attempt: u32 },
    /// No retries left
    Exhausted,
}

#[derive(Debug)]
struct WatchdogState {
    last_touch: Mutex<Instant>,
    stopped: AtomicBool,
    stop_calls: AtomicU32,
    stalls: AtomicU32,
    wake: Notify,
}

impl WatchdogState {
    fn last_touch(&self) -> Instant {
        match self.last_touch.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn touch(&self) {
        match self.last_touch.lock() {
            Ok(mut guard) => *guard = Instant::now(),
            Err(poisoned) => *poisoned.into_inner() = Instant::now(),
        }
    }
}

/// Liveness detector for one request's provider streams
#[derive(Debug, Clone)]
pub struct StreamWatchdog {
    state: Arc<WatchdogState>,
    window: Duration,
    max_retries: u32,
}

/// Stops the watchdog when dropped
#[must_use = "dropping the guard stops the watchdog"]
pub struct WatchdogGuard {
    watchdog: StreamWatchdog,
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.watchdog.stop();
    }
}

/// A started watchdog and the receiving end of its stall notices. The timer
/// is stopped when the session is dropped.
pub struct WatchdogSession {
    watchdog: StreamWatchdog,
    notices: mpsc::UnboundedReceiver<Stall>,
    _guard: WatchdogGuard,
}

/// Outcome of a call awaited under a [`WatchdogSession`]
#[derive(Debug, PartialEq)]
pub enum Watched<T> {
    Ready(T),
    /// A stall was reported first; the call has been dropped
    Stalled(Stall),
}

impl WatchdogSession {
    pub fn watchdog(&self) -> &StreamWatchdog {
        &self.watchdog
    }

    pub fn touch(&self) {
        self.watchdog.touch();
    }

    /// Next stall notice. `None` once the timer task has ended.
    pub async fn next_stall(&mut self) -> Option<Stall> {
        self.notices.recv().await
    }

    /// The error for an exhausted retry budget
    pub fn exhausted(&self) -> RelayError {
        RelayError::Stalled {
            attempts: self.watchdog.stalls().saturating_sub(1),
        }
    }

    /// Await `call`, giving up early when `closed` resolves (the client went
    /// away) or a stall is reported. The window restarts when the call is
    /// issued.
    pub async fn watch<T, C, F>(&mut self, closed: C, call: F) -> Result<Watched<T>>
    where
        C: Future<Output = ()>,
        F: Future<Output = Result<T>>,
    {
        self.touch();
        tokio::select! {
            biased;

            _ = closed => Err(RelayError::Cancelled),
            Some(stall) = self.notices.recv() => Ok(Watched::Stalled(stall)),
            result = call => {
                self.touch();
                result.map(Watched::Ready)
            }
        }
    }
}

impl StreamWatchdog {
    pub fn new(window: Duration, max_retries: u32) -> Self {
        Self {
            state: Arc::new(WatchdogState {
                last_touch: Mutex::new(Instant::now()),
                stopped: AtomicBool::new(false),
                stop_calls: AtomicU32::new(0),
                stalls: AtomicU32::new(0),
                wake: Notify::new(),
            }),
            window,
            max_retries,
        }
    }

    /// Spawn the timer task. `on_stall` runs on the timer task.
    pub fn start<F>(&self, on_stall: F) -> WatchdogGuard
    where
        F: Fn(Stall) + Send + 'static,
    {
        self.state.touch();
        let state = Arc::clone(&self.state);
        let window = self.window;
        let max_retries = self.max_retries;

        tokio::spawn(async move {
            loop {
                let deadline = state.last_touch() + window;
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = state.wake.notified() => {}
                }
                if state.stopped.load(Ordering::SeqCst) {
                    break;
                }
                if Instant::now() < state.last_touch() + window {
                    continue;
                }

                let stalls = state.stalls.fetch_add(1, Ordering::SeqCst) + 1;
                if stalls <= max_retries {
                    tracing::warn!(
                        target: "chatrelay.watchdog",
                        attempt = stalls,
                        window_secs = window.as_secs(),
                        "stream stalled, requesting recovery"
                    );
                    state.touch();
                    on_stall(Stall::Recoverable { attempt: stalls });
                } else {
                    tracing::warn!(
                        target: "chatrelay.watchdog",
                        stalls,
                        "stream stalled with no retries left"
                    );
                    on_stall(Stall::Exhausted);
                    break;
                }
            }
            tracing::trace!(target: "chatrelay.watchdog", "timer task ended");
        });

        WatchdogGuard {
            watchdog: self.clone(),
        }
    }

    /// Start the timer task with notices delivered to the returned session
    pub fn session(&self) -> WatchdogSession {
        let (tx, notices) = mpsc::unbounded_channel();
        let guard = self.start(move |stall| {
            let _ = tx.send(stall);
        });
        WatchdogSession {
            watchdog: self.clone(),
            notices,
            _guard: guard,
        }
    }

    /// Record stream activity
    pub fn touch(&self) {
        self.state.touch();
    }

    /// Stop the timer task. Idempotent; every call is counted.
    pub fn stop(&self) {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.stopped.swap(true, Ordering::SeqCst) {
            self.state.wake.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Number of `stop()` calls so far
    pub fn stop_calls(&self) -> u32 {
        self.state.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of stalls reported so far
    pub fn stalls(&self) -> u32 {
        self.state.stalls.load(Ordering::SeqCst)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel_callback() -> (impl Fn(Stall) + Send + 'static, mpsc::UnboundedReceiver<Stall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |stall| {
                let _ = tx.send(stall);
            },
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_exhausts_within_one_window() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(45), 0);
        let (callback, mut rx) = channel_callback();
        let started = Instant::now();
        let _guard = watchdog.start(callback);

        assert_eq!(rx.recv().await, Some(Stall::Exhausted));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(45));
        assert!(elapsed < Duration::from_secs(46));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defers_stall() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(45), 0);
        let (callback, mut rx) = channel_callback();
        let started = Instant::now();
        let _guard = watchdog.start(callback);

        tokio::time::sleep(Duration::from_secs(30)).await;
        watchdog.touch();

        assert_eq!(rx.recv().await, Some(Stall::Exhausted));
        assert!(started.elapsed() >= Duration::from_secs(75));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_then_exhausted() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(10), 2);
        let (callback, mut rx) = channel_callback();
        let _guard = watchdog.start(callback);

        assert_eq!(rx.recv().await, Some(Stall::Recoverable { attempt: 1 }));
        assert_eq!(rx.recv().await, Some(Stall::Recoverable { attempt: 2 }));
        assert_eq!(rx.recv().await, Some(Stall::Exhausted));
        // Timer task has ended and dropped the callback
        assert_eq!(rx.recv().await, None);
        assert_eq!(watchdog.stalls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_stall() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(10), 0);
        let (callback, mut rx) = channel_callback();
        let guard = watchdog.start(callback);

        watchdog.stop();
        assert_eq!(rx.recv().await, None);
        assert!(watchdog.is_stopped());

        drop(guard);
        assert_eq!(watchdog.stop_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_drop_stops_once() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(10), 0);
        let (callback, mut rx) = channel_callback();
        {
            let _guard = watchdog.start(callback);
        }
        assert_eq!(watchdog.stop_calls(), 1);
        assert_eq!(rx.recv().await, None);
        assert_eq!(watchdog.stalls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_abandons_call_that_never_resolves() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(45), 1);
        let mut session = watchdog.session();
        let started = Instant::now();

        let first = session
            .watch(std::future::pending(), std::future::pending::<Result<()>>())
            .await
            .unwrap();
        assert_eq!(first, Watched::Stalled(Stall::Recoverable { attempt: 1 }));

        let second = session
            .watch(std::future::pending(), std::future::pending::<Result<()>>())
            .await
            .unwrap();
        assert_eq!(second, Watched::Stalled(Stall::Exhausted));
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(matches!(session.exhausted(), RelayError::Stalled { attempts: 1 }));

        drop(session);
        assert_eq!(watchdog.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_prefers_closed_client() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(45), 0);
        let mut session = watchdog.session();

        let err = session
            .watch(std::future::ready(()), std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Cancelled));
        assert_eq!(watchdog.stalls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_returns_ready_call() {
        let watchdog = StreamWatchdog::new(Duration::from_secs(45), 0);
        let mut session = watchdog.session();

        let value = session
            .watch(std::future::pending(), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, Watched::Ready(7));
    }
}
