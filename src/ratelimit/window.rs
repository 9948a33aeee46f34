//! Fixed window counting limiter.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::clock::{self, Instant};
use crate::config::WindowConfig;
use crate::error::{PacerError, Result};

/// Caps how many operations run per window, making callers wait out the
/// remainder of an exhausted window.
///
/// Every call holds one lock across the whole check, wait, execute and count
/// sequence, so operations through a single limiter never overlap and are
/// served in arrival order. A caller that finds the quota used up sleeps
/// while holding that lock; everyone behind it queues on the lock.
pub struct WindowedLimiter {
    /// Maximum successful operations per window
    limit: u32,
    /// Length of a window
    window: Duration,
    /// Current window, guarded for the whole invocation
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    /// Successful operations in the current window
    count: u32,
    /// When the current window started
    window_start: Instant,
}

impl WindowState {
    /// Record a successful operation in the window starting at `window_start`,
    /// whose count before this operation was `count`.
    fn record(&mut self, window_start: Instant, count: u32) {
        if window_start != self.window_start {
            trace!(previous_count = self.count, "Rolling over window");
            self.window_start = window_start;
        }
        self.count = count + 1;
    }
}

impl WindowedLimiter {
    /// Create a limiter allowing `limit` operations per `window`.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(PacerError::InvalidConfig(
                "window limit must be greater than 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(PacerError::InvalidConfig(
                "window duration must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                window_start: clock::now(),
            }),
        })
    }

    /// Create a limiter from validated configuration.
    pub fn from_config(config: &WindowConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.limit, config.window())
    }

    /// Run `operation(input)` once the current window has room for it.
    ///
    /// If the quota is exhausted, waits for the rest of the window, starts a
    /// new one, then runs the operation. Only a successful operation counts
    /// against the quota; an `Err` is returned unchanged and leaves the
    /// window as it was.
    ///
    /// Dropping the returned future while it waits releases the limiter
    /// without touching the count or the window.
    pub async fn invoke<I, T, E, F, Fut>(
        &self,
        input: I,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(I) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut state = self.state.lock().await;

        // The rollover is only committed once the operation succeeds.
        let now = clock::now();
        let elapsed = now.saturating_duration_since(state.window_start);
        let (window_start, count) = if elapsed >= self.window {
            (now, 0)
        } else if state.count >= self.limit {
            let remaining = self.window - elapsed;
            debug!(
                limit = self.limit,
                wait = ?remaining,
                "Window quota exhausted, waiting for reset"
            );
            clock::after(remaining).await;
            (clock::now(), 0)
        } else {
            (state.window_start, state.count)
        };

        let output = operation(input).await?;
        state.record(window_start, count);
        trace!(count = state.count, limit = self.limit, "Operation counted");
        Ok(output)
    }

    /// [`invoke`](Self::invoke) for operations that cannot fail.
    pub async fn invoke_infallible<I, T, F, Fut>(&self, input: I, operation: F) -> T
    where
        F: FnOnce(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let result: std::result::Result<T, std::convert::Infallible> = self
            .invoke(input, |input| async move { Ok(operation(input).await) })
            .await;
        match result {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Maximum successful operations per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Operations counted in the current window.
    ///
    /// Waits behind any invocation in progress. A window that has elapsed
    /// but not yet been rolled over reports 0.
    pub async fn current_count(&self) -> u32 {
        let state = self.state.lock().await;
        if state.window_start.elapsed() >= self.window {
            0
        } else {
            state.count
        }
    }
}

impl std::fmt::Debug for WindowedLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish()
    }
}
