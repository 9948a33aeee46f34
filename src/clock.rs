//! Monotonic clock and timer primitives shared by the limiters.
//!
//! Everything here is backed by `tokio::time`, so a paused test runtime
//! controls both limiters deterministically.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::error::{PacerError, Result};

pub use tokio::time::Instant;

/// Longest timer period honoured by [`every`], roughly thirty years.
pub const MAX_PERIOD: Duration = Duration::from_secs(86400 * 365 * 30);

/// Current monotonic time.
pub fn now() -> Instant {
    Instant::now()
}

/// Suspend the calling task until `duration` has elapsed.
pub async fn after(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Run `tick` once per `period` on a spawned task.
///
/// The first call happens one full period from now. The task ends when
/// `tick` returns [`ControlFlow::Break`] or when the returned handle is
/// aborted. Must be called from within a tokio runtime with timers enabled.
///
/// Periods longer than [`MAX_PERIOD`] are clamped to it. Fails with
/// [`PacerError::InvalidConfig`] if `period` is zero.
pub fn every<F>(period: Duration, mut tick: F) -> Result<JoinHandle<()>>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    if period.is_zero() {
        return Err(PacerError::InvalidConfig(
            "timer period must be greater than 0".to_string(),
        ));
    }
    let period = period.min(MAX_PERIOD);

    let mut ticker = interval_at(now() + period, period);
    // A stalled runtime should not release a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    Ok(tokio::spawn(async move {
        loop {
            ticker.tick().await;
            if tick().is_break() {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_after_waits_for_duration() {
        let start = now();
        after(Duration::from_millis(250)).await;
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_first_tick_after_one_period() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = every(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();

        after(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        after(Duration::from_millis(300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_stops_on_break() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = every(Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        handle.await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_clamps_huge_period() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = every(Duration::MAX, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();

        after(Duration::from_secs(86400)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());

        handle.abort();
    }

    #[tokio::test]
    async fn test_every_rejects_zero_period() {
        let err = every(Duration::ZERO, || ControlFlow::Continue(())).unwrap_err();
        assert!(matches!(err, PacerError::InvalidConfig(_)));
    }
}
