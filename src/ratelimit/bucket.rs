//! Leaky bucket token limiter.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::clock::{self, Instant};
use crate::config::BucketConfig;
use crate::error::{PacerError, Result};

/// A fixed-capacity token pool with an owned background replenisher.
///
/// Acquiring is synchronous and never blocks: a caller either takes a token
/// or is told immediately that none is left. Tokens come back one per tick
/// while replenishment is running, never beyond `capacity`.
///
/// The replenishment task belongs to this bucket. It is cancelled by
/// [`stop_replenishment`](Self::stop_replenishment) or when the bucket is
/// dropped.
pub struct LeakyBucket {
    /// Token accounting shared with the replenishment task
    state: Arc<BucketState>,
    /// Let the replenisher end itself after sitting full and unused this long
    idle_timeout: Option<Duration>,
    /// Handle to the running replenishment task, if any
    replenisher: Mutex<Option<JoinHandle<()>>>,
}

struct BucketState {
    capacity: u32,
    tokens: AtomicU32,
    /// Reference point for `last_acquire_nanos`
    created: Instant,
    /// Nanoseconds after `created` of the latest acquire attempt
    last_acquire_nanos: AtomicU64,
}

impl BucketState {
    fn nanos_since_created(&self) -> u64 {
        u64::try_from(self.created.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_acquire_nanos.load(Ordering::Relaxed);
        Duration::from_nanos(self.nanos_since_created().saturating_sub(last))
    }

    fn take_token(&self) -> bool {
        self.last_acquire_nanos
            .fetch_max(self.nanos_since_created(), Ordering::Relaxed);
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            })
            .is_ok()
    }

    fn add_token(&self) -> Option<u32> {
        let capacity = self.capacity;
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                (tokens < capacity).then(|| tokens + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    fn replenish_tick(&self, idle_timeout: Option<Duration>) -> ControlFlow<()> {
        if let Some(available) = self.add_token() {
            trace!(available, capacity = self.capacity, "Added token to bucket");
        }

        if let Some(idle_timeout) = idle_timeout {
            let full = self.tokens.load(Ordering::Acquire) == self.capacity;
            if full && self.idle_for() >= idle_timeout {
                debug!(
                    idle_timeout = ?idle_timeout,
                    "Bucket idle and full, stopping replenishment"
                );
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}

impl LeakyBucket {
    /// Create a full bucket holding `capacity` tokens.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(PacerError::InvalidConfig(
                "bucket capacity must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            state: Arc::new(BucketState {
                capacity,
                tokens: AtomicU32::new(capacity),
                created: clock::now(),
                last_acquire_nanos: AtomicU64::new(0),
            }),
            idle_timeout: None,
            replenisher: Mutex::new(None),
        })
    }

    /// Create a bucket from validated configuration.
    ///
    /// Replenishment is not started; pass
    /// [`BucketConfig::replenish_interval`] to
    /// [`start_replenishment`](Self::start_replenishment) when ready.
    pub fn from_config(config: &BucketConfig) -> Result<Self> {
        config.validate()?;
        let bucket = Self::new(config.capacity)?;
        Ok(match config.idle_timeout() {
            Some(idle_timeout) => bucket.with_idle_timeout(idle_timeout),
            None => bucket,
        })
    }

    /// Let the replenishment task stop itself once the bucket has been full
    /// with no acquire attempts for `idle_timeout`.
    ///
    /// Applies to replenishment started after this call.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// Take one token if any is available.
    ///
    /// Returns `false` without waiting when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let granted = self.state.take_token();
        trace!(granted, available = self.available(), "Token acquire attempt");
        granted
    }

    /// Start adding one token per `interval`, up to capacity.
    ///
    /// Does nothing if replenishment is already running. Must be called from
    /// within a tokio runtime that has timers enabled; a runtime built without
    /// `enable_time` panics here. Intervals longer than
    /// [`clock::MAX_PERIOD`] are clamped to it.
    pub fn start_replenishment(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(PacerError::InvalidConfig(
                "replenish interval must be greater than 0".to_string(),
            ));
        }

        let mut replenisher = self.replenisher.lock();
        if replenisher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            trace!("Replenishment already running");
            return Ok(());
        }

        tokio::runtime::Handle::try_current()
            .map_err(|e| PacerError::Runtime(e.to_string()))?;

        let state = self.state.clone();
        let idle_timeout = self.idle_timeout;
        *replenisher = Some(clock::every(interval, move || {
            state.replenish_tick(idle_timeout)
        })?);

        debug!(
            capacity = self.state.capacity,
            interval = ?interval,
            "Started bucket replenishment"
        );
        Ok(())
    }

    /// Cancel the replenishment task if it is running.
    ///
    /// The bucket keeps its current tokens and can be restarted later.
    pub fn stop_replenishment(&self) {
        if let Some(handle) = self.replenisher.lock().take() {
            handle.abort();
            debug!(available = self.available(), "Stopped bucket replenishment");
        }
    }

    /// Whether a replenishment task is currently running.
    pub fn is_replenishing(&self) -> bool {
        self.replenisher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Maximum number of tokens the bucket holds.
    pub fn capacity(&self) -> u32 {
        self.state.capacity
    }

    /// Tokens currently available.
    pub fn available(&self) -> u32 {
        self.state.tokens.load(Ordering::Acquire)
    }
}

impl Drop for LeakyBucket {
    fn drop(&mut self) {
        if let Some(handle) = self.replenisher.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LeakyBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakyBucket")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("idle_timeout", &self.idle_timeout)
            .field("replenishing", &self.is_replenishing())
            .finish()
    }
}
